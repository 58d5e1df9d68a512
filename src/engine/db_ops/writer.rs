//! Single writer: drain the record channel into the catalog, one large transaction per batch.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info};
use rusqlite::{Connection, Statement, params, params_from_iter, types::Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{INSERT_FILE_SQL, RESTORE_PRAGMAS};
use crate::engine::progress::BuildProgress;
use crate::utils::config::{FILES_COLUMNS_PER_ROW, ProgressConsts};
use crate::{EventCallback, FileRecord, IndexEvent};

/// Parameters for [`run_writer`].
pub struct WriterParams {
    /// Root the rows are attributed to (`files.indexed_path`).
    pub root: String,
    /// Rows per transaction.
    pub batch_size: usize,
    pub progress: Arc<BuildProgress>,
    /// Checked on every receive timeout and every record; once set, the open batch is committed
    /// and the rest of the channel is drained without writing.
    pub stop: Arc<AtomicBool>,
    pub on_event: Option<EventCallback>,
}

/// Rows actually inserted (duplicates ignored by `INSERT OR IGNORE` are not counted).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterTotals {
    pub files: u64,
    pub dirs: u64,
    pub disk_usage: u64,
    pub batches: u64,
    pub stopped: bool,
}

struct BatchWriter<'c> {
    conn: &'c Connection,
    stmt: Statement<'c>,
    open: bool,
    pending: usize,
    /// Inserted in the open transaction; handed to progress on commit.
    staged: (u64, u64, u64),
}

impl<'c> BatchWriter<'c> {
    fn new(conn: &'c Connection) -> Result<Self> {
        Ok(Self {
            conn,
            stmt: conn.prepare(INSERT_FILE_SQL).context("prepare insert")?,
            open: false,
            pending: 0,
            staged: (0, 0, 0),
        })
    }

    /// Insert one record into the open batch. Returns true if a row was added.
    fn push(&mut self, rec: &FileRecord, root: &str) -> Result<bool> {
        if !self.open {
            self.conn
                .execute_batch("BEGIN")
                .context("begin transaction")?;
            self.open = true;
        }
        let n = self
            .stmt
            .execute(params![
                rec.path,
                rec.name,
                rec.size,
                rec.mod_time,
                rec.is_dir,
                rec.ext(),
                root
            ])
            .context("insert record")?;
        self.pending += 1;
        if n > 0 {
            let (f, d) = if rec.is_dir { (0, 1) } else { (1, 0) };
            self.staged.0 += f;
            self.staged.1 += d;
            self.staged.2 += rec.disk_usage.max(0) as u64;
        }
        Ok(n > 0)
    }

    fn commit(&mut self, progress: &BuildProgress) -> Result<bool> {
        if !self.open {
            return Ok(false);
        }
        self.conn
            .execute_batch("COMMIT")
            .context("commit transaction")?;
        self.open = false;
        self.pending = 0;
        let (f, d, disk) = std::mem::take(&mut self.staged);
        progress.add_committed(f, d, disk);
        Ok(true)
    }

    fn rollback(&mut self) {
        if self.open {
            let _ = self.conn.execute_batch("ROLLBACK");
            self.open = false;
            self.pending = 0;
            self.staged = (0, 0, 0);
        }
    }
}

/// Write records from `rx` until every sender is gone (or stop is requested).
/// On a commit error the open batch is rolled back and the error returned; earlier batches stay.
pub fn run_writer(
    conn: &Connection,
    rx: &Receiver<FileRecord>,
    params: &WriterParams,
) -> Result<WriterTotals> {
    let mut writer = BatchWriter::new(conn)?;
    let result = write_loop(&mut writer, rx, params);
    if result.is_err() {
        writer.rollback();
    }
    drop(writer);
    conn.execute_batch(RESTORE_PRAGMAS)
        .context("restore pragmas")?;
    let totals = result?;
    if totals.stopped {
        // Unblock any worker still sending; their rows are discarded.
        let discarded = rx.iter().count();
        debug!("writer: discarded {} records after stop", discarded);
    }
    info!(
        "writer: {} files, {} dirs in {} batches{}",
        totals.files,
        totals.dirs,
        totals.batches,
        if totals.stopped { " (stopped)" } else { "" }
    );
    Ok(totals)
}

fn write_loop(
    writer: &mut BatchWriter<'_>,
    rx: &Receiver<FileRecord>,
    params: &WriterParams,
) -> Result<WriterTotals> {
    let mut totals = WriterTotals::default();
    let mut inserted = 0_u64;
    let timeout = Duration::from_millis(200);

    loop {
        if params.stop.load(Ordering::Relaxed) {
            totals.stopped = true;
            break;
        }
        let rec = match rx.recv_timeout(timeout) {
            Ok(rec) => rec,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if writer.push(&rec, &params.root)? {
            let (f, d) = if rec.is_dir { (0, 1) } else { (1, 0) };
            let disk = rec.disk_usage.max(0) as u64;
            totals.files += f;
            totals.dirs += d;
            totals.disk_usage += disk;
            inserted += 1;
            if inserted.is_multiple_of(ProgressConsts::FILE_EVENT_EVERY)
                && let Some(cb) = &params.on_event
            {
                cb(&IndexEvent::FileScanned { path: rec.path });
            }
        }
        if writer.pending >= params.batch_size && writer.commit(&params.progress)? {
            totals.batches += 1;
            debug!("writer: committed batch {}", totals.batches);
        }
    }
    if writer.commit(&params.progress)? {
        totals.batches += 1;
    }
    Ok(totals)
}

/// Insert `rows` as one multi-row `INSERT OR IGNORE` (caller keeps `rows.len()` × 7 under the
/// SQLite parameter ceiling). Returns rows actually inserted.
pub fn insert_rows_multi(conn: &Connection, rows: &[FileRecord], root: &str) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let one = format!("({})", vec!["?"; FILES_COLUMNS_PER_ROW].join(","));
    let sql = format!(
        "INSERT OR IGNORE INTO files (path, name, size, mod_time, is_dir, ext, indexed_path) VALUES {}",
        vec![one.as_str(); rows.len()].join(",")
    );
    let mut values: Vec<Value> = Vec::with_capacity(rows.len() * FILES_COLUMNS_PER_ROW);
    for r in rows {
        values.push(Value::Text(r.path.clone()));
        values.push(Value::Text(r.name.clone()));
        values.push(Value::Integer(r.size));
        values.push(Value::Integer(r.mod_time));
        values.push(Value::Integer(r.is_dir as i64));
        values.push(Value::Text(r.ext()));
        values.push(Value::Text(root.to_string()));
    }
    conn.execute(&sql, params_from_iter(values))
        .context("multi-row insert")
}
