//! Walk context: everything a directory task needs, owned by one walk and shared by `Arc`.

use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::exclude::ExcludeRules;
use super::filter::FileFilter;
use super::metadata::{FileId, IdentitySet};
use super::pending::PendingWork;
use crate::FileRecord;
use crate::privileged::DirLister;

/// "Enumerate this directory". `id` is the directory's device+inode when it was stat'ed.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub path: PathBuf,
    pub id: Option<FileId>,
}

/// Per-walk error and fallback counters.
#[derive(Debug, Default)]
pub struct WalkCounters {
    /// Directories or entries skipped as unreadable.
    pub skipped: AtomicU64,
    /// "Too many open files" hits.
    pub exhausted: AtomicU64,
    /// Directories read through the elevated listing.
    pub elevated: AtomicU64,
    /// Directories skipped because their identity was already walked.
    pub duplicate_dirs: AtomicU64,
    pub symlinks: AtomicU64,
    /// Entries dropped by the exclusion rules.
    pub excluded: AtomicU64,
    pub sparse: AtomicU64,
    /// Repeat sightings of a multiply-linked file.
    pub hardlinks: AtomicU64,
}

/// Snapshot of [`WalkCounters`] after the walk ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub skipped: u64,
    pub exhausted: u64,
    pub elevated: u64,
    pub duplicate_dirs: u64,
    pub symlinks: u64,
    pub excluded: u64,
    pub sparse: u64,
    pub hardlinks: u64,
    pub stopped: bool,
}

/// Walk tuning and collaborators supplied by the caller.
pub struct WalkConfig {
    pub workers: usize,
    pub dir_queue_cap: usize,
    pub record_cap: usize,
    pub rules: ExcludeRules,
    /// Applied to files only.
    pub filter: FileFilter,
    /// Cooperative stop requested by the user.
    pub stop: Arc<AtomicBool>,
    /// Elevated listing for permission-denied directories, when a credential is available.
    pub lister: Option<Arc<dyn DirLister>>,
}

pub struct WalkContext {
    pub root: PathBuf,
    pub rules: ExcludeRules,
    pub filter: FileFilter,
    pub stop: Arc<AtomicBool>,
    /// Set when the record consumer went away; ends the walk without counting as a user stop.
    pub abort: AtomicBool,
    pub pending: PendingWork,
    pub dir_tx: Sender<ScanTask>,
    pub rec_tx: Sender<FileRecord>,
    pub seen_dirs: IdentitySet,
    pub hardlinks: IdentitySet,
    pub lister: Option<Arc<dyn DirLister>>,
    pub counters: WalkCounters,
}

impl WalkContext {
    /// Polled before every directory, entry and send.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.abort.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> WalkReport {
        WalkReport {
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
            elevated: self.counters.elevated.load(Ordering::Relaxed),
            duplicate_dirs: self.counters.duplicate_dirs.load(Ordering::Relaxed),
            symlinks: self.counters.symlinks.load(Ordering::Relaxed),
            excluded: self.counters.excluded.load(Ordering::Relaxed),
            sparse: self.counters.sparse.load(Ordering::Relaxed),
            hardlinks: self.counters.hardlinks.load(Ordering::Relaxed),
            stopped: self.stop.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
impl WalkContext {
    /// Context with unbounded channels and no workers, for driving single directories by hand.
    pub(crate) fn detached(
        root: &std::path::Path,
    ) -> (
        Self,
        crossbeam_channel::Receiver<ScanTask>,
        crossbeam_channel::Receiver<FileRecord>,
    ) {
        let (dir_tx, dir_rx) = crossbeam_channel::unbounded();
        let (rec_tx, rec_rx) = crossbeam_channel::unbounded();
        let ctx = WalkContext {
            root: root.to_path_buf(),
            rules: ExcludeRules::default(),
            filter: FileFilter::default(),
            stop: Arc::new(AtomicBool::new(false)),
            abort: AtomicBool::new(false),
            pending: PendingWork::new(),
            dir_tx,
            rec_tx,
            seen_dirs: IdentitySet::default(),
            hardlinks: IdentitySet::default(),
            lister: None,
            counters: WalkCounters::default(),
        };
        (ctx, dir_rx, rec_rx)
    }
}
