//! Public types for the filecat API and the walk pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One catalog row as returned by searches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub path: String,
    pub name: String,
    /// Logical size in bytes (0 for directories).
    pub size: i64,
    /// Modification time, seconds since the Unix epoch.
    pub mod_time: i64,
    pub is_dir: bool,
    /// Lowercased extension including the dot (`.txt`), or empty.
    pub ext: String,
    /// Root of the build that discovered this row.
    pub indexed_path: String,
}

/// What the walker (and the bulk helper's NDJSON) emits for every discovered entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub size: i64,
    /// Allocated bytes (`st_blocks * 512`); 0 for directories and repeated hardlinks.
    #[serde(default)]
    pub disk_usage: i64,
    pub mod_time: i64,
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_sparse: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_hardlink: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FileRecord {
    /// Lowercased extension with the leading dot, `""` when there is none.
    pub fn ext(&self) -> String {
        extension_of(&self.name)
    }
}

/// `.tar.gz` → `.gz`, `Makefile` → ``, `.bashrc` → ``.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(i) => name[i..].to_lowercase(),
    }
}

/// Aggregate row per indexed root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRoot {
    pub path: String,
    pub file_count: i64,
    pub dir_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Options for [`Indexer::search_advanced`](crate::Indexer::search_advanced).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub keyword: String,
    pub use_regex: bool,
    /// Allowed extensions, e.g. `[".txt", "log"]`. Matched case-insensitively; the dot is optional.
    pub extensions: Vec<String>,
    /// Substring the full path must contain.
    pub path_filter: Option<String>,
    /// Inclusive lower bound in bytes.
    pub min_size: Option<i64>,
    /// Inclusive upper bound in bytes.
    pub max_size: Option<i64>,
}

/// Cached global stats, stored as JSON under `config.index_stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub file_count: i64,
    pub dir_count: i64,
    #[serde(default)]
    pub total: i64,
    /// Seconds the last build took.
    #[serde(default)]
    pub scan_time: i64,
}

/// Periodic build progress.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub file_count: u64,
    pub dir_count: u64,
    /// Allocated bytes committed so far (hardlinks counted once).
    pub disk_usage: u64,
    pub elapsed: Duration,
    /// 0..=100; stays below 100 until the build completes.
    pub percentage: f64,
}

/// Build lifecycle events delivered to the registered callback.
#[derive(Clone, Debug)]
pub enum IndexEvent {
    Started {
        root: String,
    },
    Progress(ProgressSnapshot),
    FileScanned {
        path: String,
    },
    /// The preferred strategy could not run; the build continues with the next one.
    Fallback {
        from: &'static str,
        to: &'static str,
        reason: String,
    },
    Completed {
        file_count: u64,
        dir_count: u64,
        elapsed: Duration,
    },
    Stopped,
}

/// Shared event sink; called from the build thread and the progress ticker.
pub type EventCallback = Arc<dyn Fn(&IndexEvent) + Send + Sync>;

/// Totals for a finished build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildSummary {
    pub file_count: u64,
    pub dir_count: u64,
    pub disk_usage: u64,
    pub elapsed: Duration,
    /// Directories skipped as unreadable (after any elevated retry).
    pub skipped: u64,
    pub strategy: &'static str,
}

/// How a build ended when it did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildOutcome {
    Completed(BuildSummary),
    /// Stop was requested; whatever was committed stays in the catalog.
    Stopped,
}

impl BuildOutcome {
    pub fn is_stopped(&self) -> bool {
        matches!(self, BuildOutcome::Stopped)
    }
}

/// Indexer tuning (library and CLI).
#[derive(Clone, Debug, Default)]
pub struct Opts {
    /// Directory worker count. When None, derived from drive type and FD limit.
    pub num_workers: Option<usize>,
    /// Explicit location of the `filecat-scan` helper; searched for when None.
    pub helper_path: Option<PathBuf>,
    /// Never use the bulk helper even when a credential is set.
    pub no_helper: bool,
    /// Verbose logging / progress bar (CLI).
    pub verbose: bool,
}
