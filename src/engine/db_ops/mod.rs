//! Catalog store: schema, open/migrate, the shared catalog handle, batched writer.

mod catalog;
mod connection;
mod writer;

pub use catalog::{Catalog, ConfigKey};
pub use connection::{open_catalog, open_catalog_in_memory, open_writer_connection};
pub use writer::{WriterParams, WriterTotals, insert_rows_multi, run_writer};

use anyhow::{Context, Result};
use rusqlite::{Connection, Row};

use crate::Record;

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        PRAGMA busy_timeout = 5000;
        "#;

/// Writer connection during a build: durability traded for throughput; the build re-runs on crash.
pub(crate) const BUILD_PRAGMAS: &str = r#"
        PRAGMA synchronous = OFF;
        PRAGMA cache_size = -262144;
        PRAGMA temp_store = MEMORY;
        PRAGMA mmap_size = 268435456;
        "#;

pub(crate) const RESTORE_PRAGMAS: &str = "PRAGMA synchronous = NORMAL;";

/// Idempotent on `path`: re-importing overlapping data never duplicates rows.
pub(crate) const INSERT_FILE_SQL: &str = "INSERT OR IGNORE INTO files \
     (path, name, size, mod_time, is_dir, ext, indexed_path) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub(crate) const SELECT_RECORD: &str =
    "SELECT id, path, name, size, mod_time, is_dir, ext, indexed_path FROM files";

/// Schema for files, config and indexed_paths tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    size INTEGER NOT NULL,
    mod_time INTEGER NOT NULL,
    is_dir INTEGER NOT NULL,
    ext TEXT NOT NULL,
    indexed_path TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_name ON files(name);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS indexed_paths (
    path TEXT PRIMARY KEY,
    file_count INTEGER NOT NULL DEFAULT 0,
    dir_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Indexes on `indexed_path`; created after the column migration so old catalogs open cleanly.
pub(crate) const ROOT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_indexed_path ON files(indexed_path);
CREATE INDEX IF NOT EXISTS idx_indexed_path_isdir ON files(indexed_path, is_dir);
"#;

/// (files, dirs) currently attributed to `root`.
pub fn count_root_rows(conn: &Connection, root: &str) -> Result<(u64, u64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(is_dir = 0), 0), COALESCE(SUM(is_dir = 1), 0)
         FROM files WHERE indexed_path = ?1",
        [root],
        |r| Ok((r.get::<_, i64>(0)? as u64, r.get::<_, i64>(1)? as u64)),
    )
    .context("count root rows")
}

/// Map a row selected with [`SELECT_RECORD`] columns.
pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        size: row.get(3)?,
        mod_time: row.get(4)?,
        is_dir: row.get::<_, i64>(5)? != 0,
        ext: row.get(6)?,
        indexed_path: row.get(7)?,
    })
}
