//! Turn one directory entry into a record: lstat, disk usage, sparse flag, identity for dedup.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::FileRecord;
use crate::utils::config::{SPARSE_RATIO, STAT_BLOCK_SIZE};

/// Device + inode. Only meaningful within one build.
pub type FileId = (u64, u64);

/// Concurrent set of identities seen during one build.
#[derive(Default)]
pub struct IdentitySet(Mutex<HashSet<FileId>>);

impl IdentitySet {
    /// True on first sight.
    pub fn insert(&self, id: FileId) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }
}

/// What a stat'ed entry turned out to be.
pub enum Classified {
    Dir { record: FileRecord, id: Option<FileId> },
    File(FileRecord),
}

/// Modification time in whole seconds (0 when the platform cannot say).
pub fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn identity(meta: &Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn identity(_meta: &Metadata) -> Option<FileId> {
    None
}

/// Allocated bytes and link count.
#[cfg(unix)]
fn allocation(meta: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.blocks() * STAT_BLOCK_SIZE, meta.nlink())
}

#[cfg(not(unix))]
fn allocation(meta: &Metadata) -> (u64, u64) {
    (meta.len(), 1)
}

/// Allocation materially below the logical size.
pub fn is_sparse(size: u64, allocated: u64) -> bool {
    size > 0 && (allocated as f64) < SPARSE_RATIO * size as f64
}

/// Classify `path` from its lstat `meta`. Symlinks and other specials must be filtered by the
/// caller. `hardlinks` dedups disk usage for files with more than one link.
pub fn classify(path: &Path, name: String, meta: &Metadata, hardlinks: &IdentitySet) -> Classified {
    let path_str = path.to_string_lossy().into_owned();
    let mod_time = mtime_secs(meta);
    if meta.is_dir() {
        return Classified::Dir {
            record: FileRecord {
                path: path_str,
                name,
                size: 0,
                disk_usage: 0,
                mod_time,
                is_dir: true,
                is_sparse: false,
                is_hardlink: false,
            },
            id: identity(meta),
        };
    }
    let size = meta.len();
    let (allocated, nlink) = allocation(meta);
    let is_hardlink = nlink > 1 && identity(meta).is_some_and(|id| !hardlinks.insert(id));
    Classified::File(FileRecord {
        path: path_str,
        name,
        size: size as i64,
        disk_usage: if is_hardlink { 0 } else { allocated as i64 },
        mod_time,
        is_dir: false,
        is_sparse: is_sparse(size, allocated),
        is_hardlink,
    })
}
