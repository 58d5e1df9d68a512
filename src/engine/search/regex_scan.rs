//! Regex matching over the catalog: the table has no regex predicate, so rows are fetched in
//! fixed-size batches (keyset on `id`) and tested here.

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use rusqlite::{Connection, params_from_iter, types::Value};
use std::collections::VecDeque;

use crate::Record;
use crate::engine::db_ops::row_to_record;

/// Lazy, finite sequence of rows whose name or path matches `re`, in `id` order.
/// Pulls one batch at a time; not restartable.
pub struct RegexMatches<'c> {
    conn: &'c Connection,
    re: Regex,
    /// Extra SQL condition (advanced filters) and its parameters.
    filter: Option<(String, Vec<Value>)>,
    batch_size: usize,
    last_id: i64,
    buf: VecDeque<Record>,
    exhausted: bool,
    /// Rows examined so far.
    scanned: u64,
}

impl<'c> RegexMatches<'c> {
    pub fn new(conn: &'c Connection, re: Regex, batch_size: usize) -> Self {
        Self {
            conn,
            re,
            filter: None,
            batch_size: batch_size.max(1),
            last_id: i64::MIN,
            buf: VecDeque::new(),
            exhausted: false,
            scanned: 0,
        }
    }

    /// Restrict the scan with `condition` (SQL, `?` placeholders bound from `args`).
    pub fn with_filter(mut self, condition: String, args: Vec<Value>) -> Self {
        self.filter = Some((condition, args));
        self
    }

    /// Matches `offset..offset + limit`. An error while skipping fails the page just like one
    /// inside it.
    pub fn page(mut self, offset: usize, limit: usize) -> Result<Vec<Record>> {
        for skipped in self.by_ref().take(offset) {
            skipped?;
        }
        let out = self.by_ref().take(limit).collect::<Result<Vec<_>>>()?;
        debug!(
            "regex page: {} rows examined, {} returned",
            self.scanned,
            out.len()
        );
        Ok(out)
    }

    fn fill(&mut self) -> Result<()> {
        let mut args = vec![Value::Integer(self.last_id)];
        let extra = match &self.filter {
            Some((cond, a)) => {
                args.extend(a.iter().cloned());
                format!(" AND ({cond})")
            }
            None => String::new(),
        };
        args.push(Value::Integer(self.batch_size as i64));
        let sql = format!(
            "{} WHERE id > ?{} ORDER BY id LIMIT ?",
            crate::engine::db_ops::SELECT_RECORD,
            extra
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare regex scan")?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_record)
            .context("regex scan")?;
        let mut fetched = 0_usize;
        for row in rows {
            let rec = row.context("read row")?;
            fetched += 1;
            self.last_id = rec.id;
            if self.re.is_match(&rec.name) || self.re.is_match(&rec.path) {
                self.buf.push_back(rec);
            }
        }
        self.scanned += fetched as u64;
        if fetched < self.batch_size {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for RegexMatches<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rec) = self.buf.pop_front() {
                return Some(Ok(rec));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
