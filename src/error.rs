//! Typed failure kinds. They travel inside `anyhow::Error`; match with `err.downcast_ref::<IndexError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Catalog not open, or opened in memory for an operation that needs a file.
    #[error("index not initialized: {0}")]
    NotInitialized(String),

    #[error("a build is already running")]
    BuildInProgress,

    #[error("invalid query `{pattern}`: {reason}")]
    InvalidQuery { pattern: String, reason: String },

    /// Wrong or missing elevated credential. The cached credential has been cleared.
    #[error("elevation failed: {0}")]
    ElevationFailed(String),

    #[error("bulk scan helper unavailable: {0}")]
    HelperUnavailable(String),

    #[error("too many open files while reading {}", .0.display())]
    ResourceExhausted(PathBuf),
}

impl IndexError {
    /// True when `err` (anywhere in its chain) is this kind.
    pub fn is(err: &anyhow::Error, pred: impl Fn(&IndexError) -> bool) -> bool {
        err.chain()
            .filter_map(|e| e.downcast_ref::<IndexError>())
            .any(pred)
    }
}
