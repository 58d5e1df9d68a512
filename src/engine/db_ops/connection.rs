//! Open the catalog, apply WAL + schema, migrate older layouts.

use anyhow::{Context, Result};
use log::info;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use super::{BUILD_PRAGMAS, ROOT_INDEXES, SCHEMA, WAL_PRAGMAS};
use crate::error::IndexError;

/// Enable WAL and apply schema to an open connection (idempotent).
fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    migrate(conn)?;
    Ok(())
}

/// Bring catalogs from older versions up to date: add `indexed_path` (backfilled from the
/// last `config.index_path`), and drop indexes that only slowed down bulk deletes.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("DROP INDEX IF EXISTS idx_ext; DROP INDEX IF EXISTS idx_path;")
        .context("drop obsolete indexes")?;

    let has_col: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('files') WHERE name = 'indexed_path'",
            [],
            |r| r.get(0),
        )
        .context("inspect files columns")?;
    if has_col == 0 {
        conn.execute(
            "ALTER TABLE files ADD COLUMN indexed_path TEXT NOT NULL DEFAULT ''",
            [],
        )
        .context("add indexed_path column")?;
        let old_root: Option<String> = conn
            .query_row("SELECT value FROM config WHERE key = 'index_path'", [], |r| {
                r.get(0)
            })
            .optional()
            .context("read legacy index_path")?;
        if let Some(root) = old_root.filter(|r| !r.is_empty()) {
            let n = conn
                .execute(
                    "UPDATE files SET indexed_path = ?1 WHERE indexed_path = ''",
                    [&root],
                )
                .context("backfill indexed_path")?;
            info!("Migrated {} rows to indexed root {}", n, root);
        }
    }
    conn.execute_batch(ROOT_INDEXES)
        .context("create indexed_path indexes")?;
    Ok(())
}

/// Open or create the catalog and ensure schema + WAL.
pub fn open_catalog(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create catalog directory {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("open catalog {}", path.display()))?;
    apply_wal_and_schema(&conn)?;
    Ok(conn)
}

/// In-memory catalog with the same schema. Searches and unit tests only; builds need a file.
pub fn open_catalog_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory catalog")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    migrate(&conn)?;
    Ok(conn)
}

/// Second connection to the same file for the build's writer thread, with build pragmas applied.
pub fn open_writer_connection(path: Option<&Path>) -> Result<Connection> {
    let path = path.ok_or_else(|| {
        IndexError::NotInitialized("builds need a file-backed catalog".to_string())
    })?;
    let conn = Connection::open(path)
        .with_context(|| format!("open writer connection {}", path.display()))?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(BUILD_PRAGMAS)
        .context("set build pragmas")?;
    Ok(conn)
}
