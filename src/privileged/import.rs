//! Bulk import of the helper's NDJSON output: multi-row inserts grouped into large transactions.

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::FileRecord;
use crate::engine::db_ops::{RESTORE_PRAGMAS, count_root_rows, insert_rows_multi};
use crate::engine::progress::BuildProgress;
use crate::utils::config::BatchSizes;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportTotals {
    /// Rows attributed to `root` after the import (recounted, so duplicates never count twice).
    pub files: u64,
    pub dirs: u64,
    /// Allocated bytes over parsed records.
    pub disk_usage: u64,
    /// Lines that were neither comments nor valid records.
    pub malformed: u64,
    pub stopped: bool,
}

/// Import `ndjson` into `conn`, attributing rows to `root`. Progress moves through the import
/// phase by bytes consumed. `#` lines are comments; malformed lines are skipped and counted.
pub fn import_ndjson(
    conn: &Connection,
    ndjson: &Path,
    root: &str,
    progress: &BuildProgress,
    stop: &AtomicBool,
) -> Result<ImportTotals> {
    let start = Instant::now();
    let file = File::open(ndjson).with_context(|| format!("open {}", ndjson.display()))?;
    let total_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut reader = BufReader::with_capacity(1 << 20, file);

    let mut totals = ImportTotals::default();
    let mut rows: Vec<FileRecord> = Vec::with_capacity(BatchSizes::IMPORT_ROWS_PER_STATEMENT);
    let mut in_tx = 0_usize;
    let mut read_bytes = 0_u64;
    let mut line = String::new();
    progress.set_import_phase(0, total_bytes);

    let result = (|| -> Result<()> {
        loop {
            line.clear();
            let n = reader.read_line(&mut line).context("read helper output")?;
            if n == 0 {
                break;
            }
            read_bytes += n as u64;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<FileRecord>(trimmed) {
                Ok(rec) => {
                    totals.disk_usage += rec.disk_usage.max(0) as u64;
                    rows.push(rec);
                }
                Err(e) => {
                    totals.malformed += 1;
                    log::trace!("skip malformed line: {}", e);
                    continue;
                }
            }
            if rows.len() < BatchSizes::IMPORT_ROWS_PER_STATEMENT {
                continue;
            }
            if stop.load(Ordering::Relaxed) {
                totals.stopped = true;
                break;
            }
            flush(conn, &mut rows, root, &mut in_tx)?;
            progress.set_import_phase(read_bytes, total_bytes);
        }
        if !totals.stopped {
            flush(conn, &mut rows, root, &mut in_tx)?;
        }
        if in_tx > 0 {
            conn.execute_batch("COMMIT").context("commit import")?;
            in_tx = 0;
        }
        Ok(())
    })();
    if in_tx > 0 {
        let _ = conn.execute_batch("ROLLBACK");
    }
    conn.execute_batch(RESTORE_PRAGMAS)
        .context("restore pragmas")?;
    result?;

    let (files, dirs) = count_root_rows(conn, root)?;
    totals.files = files;
    totals.dirs = dirs;
    progress.set_counts(files, dirs, totals.disk_usage);
    progress.set_import_phase(total_bytes, total_bytes);
    info!(
        "Imported {} files, {} dirs in {:.2}s ({} malformed lines)",
        files,
        dirs,
        start.elapsed().as_secs_f64(),
        totals.malformed
    );
    Ok(totals)
}

/// Insert the buffered rows, opening a transaction if needed and committing once enough rows
/// have gone into it.
fn flush(
    conn: &Connection,
    rows: &mut Vec<FileRecord>,
    root: &str,
    in_tx: &mut usize,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    if *in_tx == 0 {
        conn.execute_batch("BEGIN").context("begin import")?;
    }
    let inserted = insert_rows_multi(conn, rows, root)?;
    *in_tx += rows.len();
    debug!("import: {} of {} rows new", inserted, rows.len());
    rows.clear();
    if *in_tx >= BatchSizes::IMPORT_COMMIT {
        conn.execute_batch("COMMIT").context("commit import")?;
        *in_tx = 0;
    }
    Ok(())
}
