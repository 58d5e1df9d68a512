//! Concurrent tree walk: a fixed pool of directory workers fed by a bounded queue, emitting
//! records on a bounded channel. Best effort: one directory's error never ends the walk.

use crossbeam_channel::{
    Receiver, SendTimeoutError, TrySendError, bounded, select,
};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::context::{ScanTask, WalkConfig, WalkContext, WalkReport};
use super::error_handler::{ScanErrorKind, classify_io_error, note_error};
use super::metadata::{Classified, IdentitySet, classify};
use super::pending::PendingWork;
use crate::FileRecord;
use crate::engine::tools::now_unix;
use crate::privileged::ListedEntry;

/// How long a blocked send waits before re-checking the stop flag.
const SEND_POLL: Duration = Duration::from_millis(100);

/// Running walk: drain `records` until it disconnects, then [`WalkHandle::join`].
pub struct WalkHandle {
    pub records: Receiver<FileRecord>,
    coordinator: JoinHandle<WalkReport>,
}

impl WalkHandle {
    pub fn join(self) -> WalkReport {
        drop(self.records);
        self.coordinator.join().unwrap_or_default()
    }
}

/// Start walking `root` (must be a directory path as it should appear in records).
/// The root itself is not emitted; everything under it is.
pub fn start_walk(root: &Path, cfg: WalkConfig) -> WalkHandle {
    let workers = cfg.workers.max(1);
    let (dir_tx, dir_rx) = bounded::<ScanTask>(cfg.dir_queue_cap.max(workers));
    let (rec_tx, rec_rx) = bounded::<FileRecord>(cfg.record_cap.max(1));
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

    let ctx = Arc::new(WalkContext {
        root: root.to_path_buf(),
        rules: cfg.rules,
        filter: cfg.filter,
        stop: cfg.stop,
        abort: AtomicBool::new(false),
        pending: PendingWork::new(),
        dir_tx,
        rec_tx,
        seen_dirs: IdentitySet::default(),
        hardlinks: IdentitySet::default(),
        lister: cfg.lister,
        counters: Default::default(),
    });

    let root_id = root_identity(root);
    if let Some(id) = root_id {
        ctx.seen_dirs.insert(id);
    }
    ctx.pending.add();
    if ctx
        .dir_tx
        .send(ScanTask {
            path: root.to_path_buf(),
            id: root_id,
        })
        .is_err()
    {
        ctx.pending.finish();
    }

    debug!(
        "walk: {} workers, dir queue {}, record channel {}",
        workers,
        ctx.dir_tx.capacity().unwrap_or(0),
        ctx.rec_tx.capacity().unwrap_or(0)
    );

    let worker_handles: Vec<JoinHandle<()>> = (0..workers)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let dir_rx = dir_rx.clone();
            let shutdown_rx = shutdown_rx.clone();
            thread::spawn(move || worker_loop(&ctx, &dir_rx, &shutdown_rx))
        })
        .collect();
    drop(dir_rx);
    drop(shutdown_rx);

    let coordinator = thread::spawn(move || {
        let _ = ctx.pending.done().recv();
        // Dropping the only sender wakes every worker's select.
        drop(shutdown_tx);
        for h in worker_handles {
            let _ = h.join();
        }
        let report = ctx.report();
        debug!("walk finished: {:?}", report);
        report
    });

    WalkHandle {
        records: rec_rx,
        coordinator,
    }
}

#[cfg(unix)]
fn root_identity(root: &Path) -> Option<super::metadata::FileId> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(root).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn root_identity(_root: &Path) -> Option<super::metadata::FileId> {
    None
}

fn worker_loop(
    ctx: &Arc<WalkContext>,
    dir_rx: &Receiver<ScanTask>,
    shutdown_rx: &Receiver<()>,
) {
    loop {
        select! {
            recv(dir_rx) -> msg => match msg {
                Ok(task) => {
                    if !ctx.stopped() {
                        scan_directory(ctx, task);
                    }
                    ctx.pending.finish();
                }
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
}

fn scan_directory(ctx: &Arc<WalkContext>, task: ScanTask) {
    if task.path != ctx.root
        && let Some(id) = task.id
        && !ctx.seen_dirs.insert(id)
    {
        ctx.counters.duplicate_dirs.fetch_add(1, Ordering::Relaxed);
        debug!("duplicate directory identity, skipping {}", task.path.display());
        return;
    }

    let entries = match fs::read_dir(&task.path) {
        Ok(rd) => rd,
        Err(e) => {
            handle_read_dir_error(ctx, &task.path, &e);
            return;
        }
    };

    for entry in entries {
        if ctx.stopped() {
            return;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                note_error(ctx, &task.path, classify_io_error(&e), &e);
                continue;
            }
        };
        let path = entry.path();
        if ctx.rules.is_excluded(&path.to_string_lossy()) {
            ctx.counters.excluded.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_symlink() => {
                ctx.counters.symlinks.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                note_error(ctx, &path, classify_io_error(&e), &e);
                continue;
            }
        }
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                note_error(ctx, &path, classify_io_error(&e), &e);
                continue;
            }
        };
        if !meta.is_dir() && !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Filtered files never reach the hardlink set.
        if meta.is_file() && !ctx.filter.accepts(&name, meta.len()) {
            continue;
        }
        match classify(&path, name, &meta, &ctx.hardlinks) {
            Classified::Dir { record, id } => {
                if !send_record(ctx, record) {
                    return;
                }
                enqueue(ctx, ScanTask { path, id });
            }
            Classified::File(record) => {
                if record.is_sparse {
                    ctx.counters.sparse.fetch_add(1, Ordering::Relaxed);
                }
                if record.is_hardlink {
                    ctx.counters.hardlinks.fetch_add(1, Ordering::Relaxed);
                }
                if !send_record(ctx, record) {
                    return;
                }
            }
        }
    }
}

fn handle_read_dir_error(ctx: &Arc<WalkContext>, dir: &Path, err: &io::Error) {
    let kind = classify_io_error(err);
    if kind == ScanErrorKind::PermissionDenied
        && let Some(lister) = &ctx.lister
    {
        match lister.list_dir(dir) {
            Ok(listed) => {
                ctx.counters.elevated.fetch_add(1, Ordering::Relaxed);
                emit_listed(ctx, dir, listed);
                return;
            }
            Err(e) => debug!("elevated listing of {} failed: {:#}", dir.display(), e),
        }
    }
    note_error(ctx, dir, kind, err);
}

/// Records from an elevated listing: no stat is possible, so mtime is "now", disk usage is the
/// logical size and directories carry no identity.
fn emit_listed(ctx: &Arc<WalkContext>, dir: &Path, listed: Vec<ListedEntry>) {
    let now = now_unix();
    for e in listed {
        if ctx.stopped() {
            return;
        }
        if e.is_symlink {
            ctx.counters.symlinks.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let path: PathBuf = dir.join(&e.name);
        let path_str = path.to_string_lossy().into_owned();
        if ctx.rules.is_excluded(&path_str) {
            ctx.counters.excluded.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let size = if e.is_dir { 0 } else { e.size.max(0) };
        if !e.is_dir && !ctx.filter.accepts(&e.name, size as u64) {
            continue;
        }
        let record = FileRecord {
            path: path_str,
            name: e.name,
            size,
            disk_usage: size,
            mod_time: now,
            is_dir: e.is_dir,
            is_sparse: false,
            is_hardlink: false,
        };
        if !send_record(ctx, record) {
            return;
        }
        if e.is_dir {
            enqueue(ctx, ScanTask { path, id: None });
        }
    }
}

/// Blocking send with backpressure, abandoned once the walk is stopped.
fn send_record(ctx: &WalkContext, rec: FileRecord) -> bool {
    let mut rec = rec;
    loop {
        if ctx.stopped() {
            return false;
        }
        match ctx.rec_tx.send_timeout(rec, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(r)) => rec = r,
            Err(SendTimeoutError::Disconnected(_)) => {
                ctx.abort.store(true, Ordering::Relaxed);
                return false;
            }
        }
    }
}

/// Queue a child directory without ever blocking the enumerating worker: when the queue is
/// full the send is handed to a rayon task that waits for room (or for stop).
fn enqueue(ctx: &Arc<WalkContext>, task: ScanTask) {
    ctx.pending.add();
    match ctx.dir_tx.try_send(task) {
        Ok(()) => {}
        Err(TrySendError::Full(task)) => {
            let ctx = Arc::clone(ctx);
            rayon::spawn(move || deferred_send(&ctx, task));
        }
        Err(TrySendError::Disconnected(_)) => ctx.pending.finish(),
    }
}

fn deferred_send(ctx: &WalkContext, task: ScanTask) {
    let mut task = task;
    loop {
        if ctx.stopped() {
            ctx.pending.finish();
            return;
        }
        match ctx.dir_tx.send_timeout(task, SEND_POLL) {
            Ok(()) => return,
            Err(SendTimeoutError::Timeout(t)) => task = t,
            Err(SendTimeoutError::Disconnected(_)) => {
                ctx.pending.finish();
                return;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("f.txt"), b"x").unwrap();
        (dir, root, sub)
    }

    #[test]
    fn directory_with_known_identity_is_not_rescanned() {
        let (_dir, root, sub) = scratch();
        let (ctx, _dirs, records) = WalkContext::detached(&root);
        let ctx = Arc::new(ctx);
        let id = root_identity(&sub);
        assert!(ctx.seen_dirs.insert(id.unwrap()));

        scan_directory(&ctx, ScanTask { path: sub, id });
        assert_eq!(ctx.report().duplicate_dirs, 1);
        assert!(records.try_recv().is_err());
    }

    #[test]
    fn second_path_to_the_same_directory_is_skipped() {
        let (_dir, root, sub) = scratch();
        let (ctx, _dirs, records) = WalkContext::detached(&root);
        let ctx = Arc::new(ctx);
        let id = root_identity(&sub);

        scan_directory(&ctx, ScanTask { path: sub.clone(), id });
        scan_directory(&ctx, ScanTask { path: root.join("elsewhere"), id });
        let got: Vec<FileRecord> = records.try_iter().collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "f.txt");
        assert_eq!(ctx.report().duplicate_dirs, 1);
    }

    #[test]
    fn root_is_scanned_although_registered() {
        let (_dir, root, sub) = scratch();
        let (ctx, dirs, records) = WalkContext::detached(&root);
        let ctx = Arc::new(ctx);
        let root_id = root_identity(&root);
        ctx.seen_dirs.insert(root_id.unwrap());

        scan_directory(&ctx, ScanTask { path: root.clone(), id: root_id });
        let got: Vec<FileRecord> = records.try_iter().collect();
        assert_eq!(got.len(), 1);
        assert!(got[0].is_dir);
        let queued = dirs.try_recv().unwrap();
        assert_eq!(queued.path, sub);
        assert_eq!(queued.id, root_identity(&sub));
        assert_eq!(ctx.report().duplicate_dirs, 0);
    }
}
