//! Shared catalog handle: one query connection plus the reader/writer access guard.
//!
//! Searches hold the guard shared; anything that removes or replaces rows outside the build's
//! writer (root clears, discrete updates, background deletes) holds it exclusively. The build
//! writer uses its own connection and relies on transaction atomicity: readers see whole batches.

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use super::{INSERT_FILE_SQL, connection, count_root_rows};
use crate::engine::tools::{like_prefix_pattern, now_unix, path_to_db_string};
use crate::{IndexStats, IndexedRoot, extension_of};

/// Keys in the `config` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    IndexPath,
    IndexStats,
    ExcludePaths,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::IndexPath => "index_path",
            ConfigKey::IndexStats => "index_stats",
            ConfigKey::ExcludePaths => "exclude_paths",
        }
    }
}

pub struct Catalog {
    conn: Mutex<Connection>,
    access: RwLock<()>,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open (or create) the catalog file.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(connection::open_catalog(path)?),
            access: RwLock::new(()),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory catalog (no builds; rows come from [`Catalog::with_conn`] or discrete updates).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(connection::open_catalog_in_memory()?),
            access: RwLock::new(()),
            path: None,
        })
    }

    /// Catalog file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the shared access guard.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _guard = self.access.read().unwrap_or_else(PoisonError::into_inner);
        f(&self.lock_conn())
    }

    /// Run `f` under the exclusive access guard.
    pub fn write<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let _guard = self.access.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut self.lock_conn())
    }

    /// Run `f` on the connection without the access guard (config and aggregate rows).
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        f(&mut self.lock_conn())
    }

    // --- config ---

    pub fn config_get(&self, key: ConfigKey) -> Result<Option<String>> {
        self.with_conn(|c| {
            c.query_row(
                "SELECT value FROM config WHERE key = ?1",
                [key.as_str()],
                |r| r.get(0),
            )
            .optional()
            .with_context(|| format!("read config {}", key.as_str()))
        })
    }

    pub fn config_set(&self, key: ConfigKey, value: &str) -> Result<()> {
        self.with_conn(|c| {
            c.execute(
                "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                params![key.as_str(), value],
            )
            .with_context(|| format!("write config {}", key.as_str()))?;
            Ok(())
        })
    }

    pub fn save_index_path(&self, root: &str) -> Result<()> {
        self.config_set(ConfigKey::IndexPath, root)
    }

    /// Last built root, empty when nothing was built yet.
    pub fn index_path(&self) -> Result<String> {
        Ok(self.config_get(ConfigKey::IndexPath)?.unwrap_or_default())
    }

    pub fn save_stats(&self, stats: &IndexStats) -> Result<()> {
        let json = serde_json::to_string(stats).context("serialize index stats")?;
        self.config_set(ConfigKey::IndexStats, &json)
    }

    /// Cached stats; recounts the table when the cache is missing, unreadable or all zero.
    pub fn stats(&self) -> Result<IndexStats> {
        if let Some(json) = self.config_get(ConfigKey::IndexStats)?
            && let Ok(s) = serde_json::from_str::<IndexStats>(&json)
            && (s.file_count > 0 || s.dir_count > 0)
        {
            return Ok(s);
        }
        self.read(|c| {
            let (files, dirs): (i64, i64) = c
                .query_row(
                    "SELECT COALESCE(SUM(is_dir = 0), 0), COALESCE(SUM(is_dir = 1), 0) FROM files",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .context("count files")?;
            Ok(IndexStats {
                file_count: files,
                dir_count: dirs,
                total: files + dirs,
                scan_time: 0,
            })
        })
    }

    // --- roots ---

    /// Delete every row whose path is `root` or lies under it. Returns rows removed.
    pub fn clear_root(&self, root: &str) -> Result<usize> {
        let start = Instant::now();
        let n = self.write(|c| {
            c.execute(
                "DELETE FROM files WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
                params![root, like_prefix_pattern(root)],
            )
            .context("clear root rows")
        })?;
        info!(
            "Cleared {} rows under {} in {:.2}s",
            n,
            root,
            start.elapsed().as_secs_f64()
        );
        Ok(n)
    }

    /// Delete rows attributed to `root` (background half of forgetting a root).
    pub fn delete_root_rows(&self, root: &str) -> Result<usize> {
        self.write(|c| {
            c.execute("DELETE FROM files WHERE indexed_path = ?1", [root])
                .context("delete root rows")
        })
    }

    pub fn upsert_indexed_root(&self, root: &str, file_count: u64, dir_count: u64) -> Result<()> {
        let now = now_unix();
        self.with_conn(|c| {
            c.execute(
                "INSERT INTO indexed_paths (path, file_count, dir_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(path) DO UPDATE SET
                   file_count = excluded.file_count,
                   dir_count = excluded.dir_count,
                   updated_at = excluded.updated_at",
                params![root, file_count as i64, dir_count as i64, now],
            )
            .context("upsert indexed root")?;
            Ok(())
        })
    }

    /// List `root` with the counts of the rows it actually has, e.g. after a stopped build.
    pub fn upsert_root_from_rows(&self, root: &str) -> Result<(u64, u64)> {
        let (files, dirs) = self.with_conn(|c| count_root_rows(c, root))?;
        self.upsert_indexed_root(root, files, dirs)?;
        Ok((files, dirs))
    }

    pub fn remove_indexed_root(&self, root: &str) -> Result<bool> {
        self.with_conn(|c| {
            let n = c
                .execute("DELETE FROM indexed_paths WHERE path = ?1", [root])
                .context("delete indexed root")?;
            Ok(n > 0)
        })
    }

    pub fn list_indexed_roots(&self) -> Result<Vec<IndexedRoot>> {
        self.with_conn(|c| {
            let mut stmt = c
                .prepare(
                    "SELECT path, file_count, dir_count, created_at, updated_at
                     FROM indexed_paths ORDER BY path",
                )
                .context("prepare list roots")?;
            let rows = stmt.query_map([], |r| {
                Ok(IndexedRoot {
                    path: r.get(0)?,
                    file_count: r.get(1)?,
                    dir_count: r.get(2)?,
                    created_at: r.get(3)?,
                    updated_at: r.get(4)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("read indexed roots")
        })
    }

    /// Longest indexed root containing `path`, if any.
    fn root_for(c: &Connection, path: &str) -> Result<String> {
        let root: Option<String> = c
            .query_row(
                "SELECT path FROM indexed_paths
                 WHERE ?1 = path OR substr(?1, 1, length(path) + 1) = path || '/'
                 ORDER BY length(path) DESC LIMIT 1",
                [path],
                |r| r.get(0),
            )
            .optional()
            .context("find root for path")?;
        Ok(root.unwrap_or_default())
    }

    // --- discrete updates ---

    /// Re-stat `path` and replace its row; removes the row when the path is gone or a symlink.
    pub fn update_file(&self, path: &Path) -> Result<()> {
        let key = path_to_db_string(path);
        let meta = match std::fs::symlink_metadata(path) {
            Ok(m) if !m.file_type().is_symlink() => m,
            _ => return self.delete_file(path),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        let is_dir = meta.is_dir();
        let size = if is_dir { 0 } else { meta.len() as i64 };
        let mod_time = crate::pipeline::metadata::mtime_secs(&meta);
        self.write(|c| {
            let root = Self::root_for(c, &key)?;
            c.execute("DELETE FROM files WHERE path = ?1", [&key])
                .context("replace file row")?;
            c.execute(
                INSERT_FILE_SQL,
                params![key, name, size, mod_time, is_dir, extension_of(&name), root],
            )
            .context("insert file row")?;
            Ok(())
        })
    }

    pub fn delete_file(&self, path: &Path) -> Result<()> {
        let key = path_to_db_string(path);
        self.write(|c| {
            c.execute("DELETE FROM files WHERE path = ?1", [&key])
                .context("delete file row")?;
            Ok(())
        })
    }

    // --- maintenance ---

    /// Fold the WAL back into the main file and truncate it.
    pub fn checkpoint(&self) -> Result<()> {
        let start = Instant::now();
        self.with_conn(|c| {
            c.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .context("WAL checkpoint")
        })?;
        debug!("Checkpoint in {:.2}s", start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        let start = Instant::now();
        self.write(|c| c.execute_batch("VACUUM").context("VACUUM"))?;
        info!("VACUUM in {:.2}s", start.elapsed().as_secs_f64());
        Ok(())
    }
}
