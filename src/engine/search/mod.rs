//! Keyword, wildcard, regex and advanced queries against the catalog.
//!
//! Every form has a total order (ties end on `path` or `id`), so increasing offsets over an
//! unchanged catalog give disjoint, consistent pages.

mod pattern;
mod regex_scan;

pub use pattern::{QueryForm, compile_regex, contains_like, starts_with_like, wildcard_to_like};
pub use regex_scan::RegexMatches;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{Connection, params_from_iter, types::Value};

use crate::engine::db_ops::{SELECT_RECORD, row_to_record};
use crate::utils::config::{BatchSizes, SearchLimits};
use crate::{Record, SearchOptions};

fn query_records(conn: &Connection, sql: &str, args: Vec<Value>) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql).context("prepare search")?;
    let rows = stmt
        .query_map(params_from_iter(args), row_to_record)
        .context("run search")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read search rows")
}

/// Run `keyword` with the matching query form. Blank keyword → empty result; `limit` 0 → default page.
pub fn search(
    conn: &Connection,
    keyword: &str,
    use_regex: bool,
    offset: usize,
    limit: usize,
) -> Result<Vec<Record>> {
    let limit = if limit == 0 {
        SearchLimits::DEFAULT_PAGE
    } else {
        limit
    };
    let Some(form) = QueryForm::classify(keyword, use_regex) else {
        return Ok(Vec::new());
    };
    debug!("search {:?} offset={} limit={}", form, offset, limit);
    match form {
        QueryForm::MultiTerm(terms) => multi_term(conn, &terms, offset, limit),
        QueryForm::Regex(pattern) => {
            let re = compile_regex(&pattern)?;
            RegexMatches::new(conn, re, BatchSizes::REGEX_SCAN).page(offset, limit)
        }
        QueryForm::Wildcard(kw) => wildcard(conn, &kw, offset, limit),
    }
}

fn multi_term(
    conn: &Connection,
    terms: &[String],
    offset: usize,
    limit: usize,
) -> Result<Vec<Record>> {
    let mut conds = Vec::with_capacity(terms.len());
    let mut args = Vec::with_capacity(terms.len() + 2);
    for t in terms {
        let col = if t.contains('/') { "path" } else { "name" };
        conds.push(format!("{col} LIKE ? ESCAPE '\\'"));
        args.push(Value::Text(contains_like(t)));
    }
    args.push(Value::Integer(limit as i64));
    args.push(Value::Integer(offset as i64));
    let sql = format!(
        "{SELECT_RECORD} WHERE {} ORDER BY length(path), path LIMIT ? OFFSET ?",
        conds.join(" AND ")
    );
    query_records(conn, &sql, args)
}

fn wildcard(conn: &Connection, kw: &str, offset: usize, limit: usize) -> Result<Vec<Record>> {
    let sql = format!(
        "{SELECT_RECORD} WHERE name LIKE ?1 ESCAPE '\\'
         ORDER BY
           CASE
             WHEN name = ?2 COLLATE NOCASE THEN 0
             WHEN name LIKE ?3 ESCAPE '\\' THEN 1
             ELSE 2
           END,
           is_dir DESC,
           length(name),
           name,
           path
         LIMIT ?4 OFFSET ?5"
    );
    let args = vec![
        Value::Text(wildcard_to_like(kw)),
        Value::Text(kw.to_string()),
        Value::Text(starts_with_like(kw)),
        Value::Integer(limit as i64),
        Value::Integer(offset as i64),
    ];
    query_records(conn, &sql, args)
}

/// `.TXT`, `txt` → `.txt`.
fn normalize_ext(ext: &str) -> String {
    let e = ext.trim().to_lowercase();
    if e.is_empty() || e.starts_with('.') {
        e
    } else {
        format!(".{e}")
    }
}

/// Filters other than the keyword, as one SQL condition.
fn advanced_filters(opts: &SearchOptions) -> (Vec<String>, Vec<Value>) {
    let mut conds = Vec::new();
    let mut args = Vec::new();
    let exts: Vec<String> = opts
        .extensions
        .iter()
        .map(|e| normalize_ext(e))
        .filter(|e| !e.is_empty())
        .collect();
    if !exts.is_empty() {
        conds.push(format!("ext IN ({})", vec!["?"; exts.len()].join(",")));
        args.extend(exts.into_iter().map(Value::Text));
    }
    if let Some(p) = opts.path_filter.as_deref().filter(|p| !p.is_empty()) {
        conds.push("path LIKE ? ESCAPE '\\'".to_string());
        args.push(Value::Text(contains_like(p)));
    }
    if let Some(min) = opts.min_size {
        conds.push("size >= ?".to_string());
        args.push(Value::Integer(min));
    }
    if let Some(max) = opts.max_size {
        conds.push("size <= ?".to_string());
        args.push(Value::Integer(max));
    }
    (conds, args)
}

/// Keyword (wildcard or regex) ANDed with extension, path and size filters. At most
/// [`SearchLimits::ADVANCED_MAX`] rows. A blank keyword with no filters returns nothing.
pub fn search_advanced(conn: &Connection, opts: &SearchOptions) -> Result<Vec<Record>> {
    let keyword = opts.keyword.trim();
    let (mut conds, mut args) = advanced_filters(opts);
    if keyword.is_empty() && conds.is_empty() {
        return Ok(Vec::new());
    }
    let cap = SearchLimits::ADVANCED_MAX;

    if opts.use_regex && !keyword.is_empty() {
        let re = compile_regex(keyword)?;
        let mut scan = RegexMatches::new(conn, re, BatchSizes::REGEX_SCAN);
        if !conds.is_empty() {
            scan = scan.with_filter(conds.join(" AND "), args);
        }
        return scan.page(0, cap);
    }

    let rank = if keyword.is_empty() {
        String::new()
    } else {
        let pat = wildcard_to_like(keyword);
        conds.insert(0, "(name LIKE ? ESCAPE '\\' OR path LIKE ? ESCAPE '\\')".to_string());
        args.insert(0, Value::Text(pat.clone()));
        args.insert(0, Value::Text(pat));
        args.push(Value::Text(starts_with_like(keyword)));
        "CASE WHEN name LIKE ? ESCAPE '\\' THEN 0 ELSE 1 END, ".to_string()
    };
    args.push(Value::Integer(cap as i64));
    let sql = format!(
        "{SELECT_RECORD} WHERE {} ORDER BY {rank}is_dir DESC, length(name), name, path LIMIT ?",
        conds.join(" AND ")
    );
    query_records(conn, &sql, args)
}
