//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::path::PathBuf;
use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    data_dir_name: String,
    db_filename: String,
    settings_filename: String,
    helper_name: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                data_dir_name: format!(".{pkg}"),
                db_filename: "index.db".to_string(),
                settings_filename: format!(".{pkg}.toml"),
                helper_name: format!("{pkg}-scan"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    /// File name of the out-of-process bulk scan helper binary.
    pub fn helper_name(&self) -> &str {
        &self.helper_name
    }

    /// `$HOME/.filecat`, or `./.filecat` when no home directory is known.
    pub fn data_dir(&self) -> PathBuf {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(&self.data_dir_name)
    }

    /// Default catalog location inside [`Self::data_dir`].
    pub fn default_db_path(&self) -> PathBuf {
        self.data_dir().join(&self.db_filename)
    }

    /// Environment variable names derived from the package name (e.g. `FILECAT_DB`).
    pub fn env_var(&self, suffix: &str) -> String {
        format!("{}_{}", self.pkg_name.to_uppercase().replace('-', "_"), suffix)
    }
}

// ---- Worker threads ----

/// Thread limits for drive-type-based tuning of the directory worker pool.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Directory enumeration is I/O bound: workers per available thread.
    pub io_factor: usize,
    /// Max workers for HDD (spinning disk; seeks dominate).
    pub hdd_max: usize,
    /// Floor / minimum.
    pub floor: usize,
    /// Max workers when the volume is a network mount.
    pub network_max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            io_factor: Self::IO_FACTOR,
            hdd_max: Self::HDD_THREADS,
            floor: Self::FLOOR_THREADS,
            network_max: Self::NETWORK_MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const IO_FACTOR: usize = 8;
    pub const HDD_THREADS: usize = 8;
    pub const FLOOR_THREADS: usize = 2;
    pub const NETWORK_MAX_THREADS: usize = 16;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Channels ----

/// Channel capacities for the walk pipeline.
pub struct ChannelCaps;

impl ChannelCaps {
    /// Pending-directory queue: workers × this factor.
    pub const DIR_QUEUE_PER_WORKER: usize = 20;
    /// Record channel between walker workers and the single writer. Full channel = backpressure.
    pub const RECORDS: usize = 200_000;
}

// ---- Database ----

/// Batch sizes for catalog writes and scans.
pub struct BatchSizes;

impl BatchSizes {
    /// Rows per transaction for the walker's writer (commit cost amortised over a huge batch).
    pub const WALK_COMMIT: usize = 1_000_000;
    /// Rows per multi-row INSERT in the bulk import (7 params per row, under SQLite's 32766 ceiling).
    pub const IMPORT_ROWS_PER_STATEMENT: usize = 4_500;
    /// Rows per transaction in the bulk import (50 statements).
    pub const IMPORT_COMMIT: usize = 225_000;
    /// Rows fetched per round trip when scanning the table for regex matches.
    pub const REGEX_SCAN: usize = 5_000;
}

/// Columns bound per row in `INSERT INTO files`.
pub const FILES_COLUMNS_PER_ROW: usize = 7;

// ---- Search ----

/// Search paging defaults.
pub struct SearchLimits;

impl SearchLimits {
    /// Page size used by callers that do not specify one.
    pub const DEFAULT_PAGE: usize = 500;
    /// Hard cap on advanced search results, regardless of offset.
    pub const ADVANCED_MAX: usize = 500;
}

// ---- Progress ----

/// Progress reporting tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Interval between progress snapshots (and helper progress-file lines).
    pub const TICK_MS: u64 = 500;
    /// Percentage ceiling while a build is still running.
    pub const RUNNING_CAP: f64 = 99.9;
    /// Bulk helper: scan phase occupies [0, SCAN_PHASE_END), import phase [SCAN_PHASE_END, 100].
    pub const SCAN_PHASE_END: f64 = 70.0;
    /// Emit a `FileScanned` event every N inserted records.
    pub const FILE_EVENT_EVERY: u64 = 10_000;
}

// ---- Entries ----

/// Allocated bytes below this fraction of the logical size mark a file as sparse.
pub const SPARSE_RATIO: f64 = 0.95;

/// Size of one `st_blocks` unit.
pub const STAT_BLOCK_SIZE: u64 = 512;

/// Pseudo-filesystem and virtual-memory locations never walked (prefix match on components).
pub const DENY_LIST: &[&str] = &[
    "/dev",
    "/proc",
    "/sys",
    "/private/var/vm",
    "/System/Volumes/VM",
    "/System/Volumes/Preboot",
    "/System/Volumes/Update",
    "/.Spotlight-V100",
    "/.fseventsd",
    "/.Trashes",
];

// ---- Elevation ----

/// Elevated-execution tuning.
pub struct ElevationConsts;

impl ElevationConsts {
    /// Max concurrent elevated `ls` subprocesses.
    pub const LISTING_CONCURRENCY: usize = 4;
    /// Poll interval while waiting on the helper process.
    pub const HELPER_POLL_MS: u64 = 500;
    /// Elevation command.
    pub const SUDO: &'static str = "sudo";
    /// Fallback helper install location.
    pub const SYSTEM_HELPER_DIR: &'static str = "/usr/local/bin";
}
