//! Classify enumeration errors: escalate, warn, or skip quietly.

use log::warn;
use std::io;
use std::path::Path;
use std::sync::atomic::Ordering;

use super::context::WalkContext;
use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Retry through the elevated listing.
    PermissionDenied,
    /// Worker pool outrunning the descriptor limit; always surfaced.
    ResourceExhausted,
    /// Concurrent deletion, virtual filesystem artifacts, etc.
    Transient,
}

pub fn classify_io_error(err: &io::Error) -> ScanErrorKind {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return ScanErrorKind::PermissionDenied;
    }
    #[cfg(unix)]
    if matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE)) {
        return ScanErrorKind::ResourceExhausted;
    }
    #[cfg(windows)]
    if err.raw_os_error() == Some(4) {
        // ERROR_TOO_MANY_OPEN_FILES
        return ScanErrorKind::ResourceExhausted;
    }
    ScanErrorKind::Transient
}

/// Record a non-escalated error against `path` in the walk counters.
pub fn note_error(ctx: &WalkContext, path: &Path, kind: ScanErrorKind, err: &io::Error) {
    match kind {
        ScanErrorKind::ResourceExhausted => {
            ctx.counters.exhausted.fetch_add(1, Ordering::Relaxed);
            warn!("{}: {}", IndexError::ResourceExhausted(path.to_path_buf()), err);
        }
        ScanErrorKind::PermissionDenied | ScanErrorKind::Transient => {
            ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
            log::trace!("skip {}: {}", path.display(), err);
        }
    }
}
