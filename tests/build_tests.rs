//! End-to-end builds over temporary trees: counts, dedup, exclusions, roots, stop, events.

use filecat::engine::progress::BuildProgress;
use filecat::pipeline::{ExcludeRules, FileFilter, WalkConfig, WalkReport, start_walk};
use filecat::{BuildOutcome, FileRecord, IndexError, IndexEvent, Indexer, Opts};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn opts() -> Opts {
    Opts {
        num_workers: Some(2),
        ..Default::default()
    }
}

fn indexer(dir: &Path) -> Indexer {
    Indexer::open(&dir.join("catalog.db"), opts()).unwrap()
}

/// Canonical scratch tree root (the catalog lives next to it, not inside).
fn tree(base: &Path, name: &str) -> PathBuf {
    let root = base.canonicalize().unwrap().join(name);
    fs::create_dir_all(&root).unwrap();
    root
}

/// Incompressible bytes so allocation tracks the logical size on compressing filesystems.
fn noise(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

fn write_file(path: &Path, len: usize) {
    let mut f = File::create(path).unwrap();
    f.write_all(&noise(len)).unwrap();
    f.sync_all().unwrap();
}

fn sample_tree(root: &Path) {
    write_file(&root.join("small.txt"), 10);
    write_file(&root.join("big.bin"), 2 << 20);
    let sparse = File::create(root.join("sparse.img")).unwrap();
    (&sparse).write_all(&noise(4096)).unwrap();
    sparse.set_len(1 << 20).unwrap();
    sparse.sync_all().unwrap();
    fs::create_dir(root.join("sub")).unwrap();
}

fn rows_for(ix: &Indexer, root: &Path) -> BTreeSet<String> {
    let key = root.to_string_lossy().into_owned();
    ix.catalog()
        .read(|c| {
            let mut stmt = c.prepare("SELECT path FROM files WHERE indexed_path = ?1")?;
            let rows = stmt.query_map([&key], |r| r.get::<_, String>(0))?;
            Ok(rows.collect::<rusqlite::Result<BTreeSet<_>>>()?)
        })
        .unwrap()
}

fn walk_with(root: &Path, rules: ExcludeRules, filter: FileFilter) -> (Vec<FileRecord>, WalkReport) {
    let walk = start_walk(
        root,
        WalkConfig {
            workers: 2,
            dir_queue_cap: 16,
            record_cap: 16,
            rules,
            filter,
            stop: Arc::new(AtomicBool::new(false)),
            lister: None,
        },
    );
    let recs: Vec<FileRecord> = walk.records.iter().collect();
    let report = walk.join();
    assert!(!report.stopped);
    (recs, report)
}

fn walk_records(root: &Path) -> Vec<FileRecord> {
    walk_with(root, ExcludeRules::default(), FileFilter::default()).0
}

fn names(recs: &[FileRecord]) -> BTreeSet<&str> {
    recs.iter().map(|r| r.name.as_str()).collect()
}

fn completed(outcome: BuildOutcome) -> filecat::BuildSummary {
    match outcome {
        BuildOutcome::Completed(s) => s,
        BuildOutcome::Stopped => panic!("build stopped unexpectedly"),
    }
}

// --- sample tree ---

#[test]
fn test_build_sample_tree_counts() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = indexer(dir.path());

    let summary = completed(ix.build_index(&root).unwrap());
    assert_eq!((summary.file_count, summary.dir_count), (3, 1));
    assert_eq!(summary.strategy, "walk");
    assert_eq!(summary.skipped, 0);
    // big.bin allocated in full, the sparse file only partly.
    assert!(summary.disk_usage >= 2 << 20);
    assert!(summary.disk_usage < (2 << 20) + (512 << 10));

    let stats = ix.stats().unwrap();
    assert_eq!((stats.file_count, stats.dir_count, stats.total), (3, 1, 4));
    assert_eq!(ix.index_path().unwrap(), root.to_string_lossy());
    let roots = ix.list_indexed_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!((roots[0].file_count, roots[0].dir_count), (3, 1));
    assert!(!ix.is_building());
}

#[test]
fn test_walk_flags_sparse_files_only() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);

    let recs = walk_records(&root);
    assert_eq!(recs.len(), 4);
    assert!(recs.iter().all(|r| r.path != root.to_string_lossy()));
    let sparse: Vec<&str> = recs
        .iter()
        .filter(|r| r.is_sparse)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(sparse, vec!["sparse.img"]);
    let sub = recs.iter().find(|r| r.name == "sub").unwrap();
    assert!(sub.is_dir);
    assert_eq!((sub.size, sub.disk_usage), (0, 0));
}

// --- filters ---

#[test]
fn test_walk_filter_applies_to_files_only() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    write_file(&root.join("sub/notes.BIN"), 4096);
    write_file(&root.join("sub/tiny.bin"), 100);

    let filter = FileFilter::new("1K", "0", &["bin".to_string()], &[], None).unwrap();
    let (recs, _) = walk_with(&root, ExcludeRules::default(), filter);
    assert_eq!(names(&recs), BTreeSet::from(["big.bin", "notes.BIN", "sub"]));

    let filter = FileFilter::new("0", "1M", &[], &[".img".to_string()], None).unwrap();
    let (recs, _) = walk_with(&root, ExcludeRules::default(), filter);
    assert_eq!(
        names(&recs),
        BTreeSet::from(["small.txt", "notes.BIN", "tiny.bin", "sub"])
    );

    let filter = FileFilter::new("", "", &[], &[], Some(r"^(small|tiny)\.")).unwrap();
    let (recs, _) = walk_with(&root, ExcludeRules::default(), filter);
    assert_eq!(names(&recs), BTreeSet::from(["small.txt", "tiny.bin", "sub"]));
}

#[test]
fn test_file_filter_rejects_bad_input() {
    assert!(FileFilter::new("lots", "0", &[], &[], None).is_err());
    assert!(FileFilter::new("0", "0", &[], &[], Some("(unclosed")).is_err());
    let f = FileFilter::new("0", "0", &[], &[], Some("   ")).unwrap();
    assert!(f.name.is_none());
    assert!(f.accepts("anything", 0));
}

// --- dedup ---

#[cfg(unix)]
#[test]
fn test_hardlinks_are_recorded_but_counted_once() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    write_file(&root.join("a.bin"), 64 << 10);
    fs::hard_link(root.join("a.bin"), root.join("b.bin")).unwrap();
    let allocated = fs::metadata(root.join("a.bin")).unwrap().blocks() as i64 * 512;

    let recs = walk_records(&root);
    assert_eq!(recs.len(), 2);
    assert_eq!(recs.iter().filter(|r| r.is_hardlink).count(), 1);
    let repeated = recs.iter().find(|r| r.is_hardlink).unwrap();
    assert_eq!(repeated.disk_usage, 0);
    assert_eq!(repeated.size, 64 << 10);

    let ix = indexer(dir.path());
    let summary = completed(ix.build_index(&root).unwrap());
    assert_eq!(summary.file_count, 2);
    assert_eq!(summary.disk_usage as i64, allocated);
}

#[cfg(unix)]
#[test]
fn test_tree_matches_walkdir_without_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    for d in ["a", "a/b", "a/b/c", "d", "d/e f"] {
        fs::create_dir_all(root.join(d)).unwrap();
    }
    for f in ["x.txt", "a/y.rs", "a/b/z.md", "a/b/c/deep.bin", "d/e f/space name.txt"] {
        write_file(&root.join(f), 100);
    }
    std::os::unix::fs::symlink(root.join("x.txt"), root.join("link.txt")).unwrap();
    std::os::unix::fs::symlink(root.join("a"), root.join("d/loop")).unwrap();

    let expected: BTreeSet<String> = walkdir::WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_symlink())
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect();

    let ix = indexer(dir.path());
    let summary = completed(ix.build_index(&root).unwrap());
    let got = rows_for(&ix, &root);
    assert_eq!(got, expected);
    assert_eq!(summary.file_count + summary.dir_count, expected.len() as u64);
    assert!(got.iter().all(|p| !p.ends_with("link.txt") && !p.ends_with("loop")));
}

#[cfg(unix)]
#[test]
fn test_walk_report_counts_skipped_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    fs::hard_link(root.join("small.txt"), root.join("sub/again.txt")).unwrap();
    std::os::unix::fs::symlink(root.join("big.bin"), root.join("alias.bin")).unwrap();
    fs::create_dir(root.join("cache")).unwrap();
    write_file(&root.join("cache/blob"), 10);

    let rules = ExcludeRules::new(&[root.join("cache").to_string_lossy()]);
    let (recs, report) = walk_with(&root, rules, FileFilter::default());
    assert_eq!(recs.len(), 5);
    assert_eq!(report.symlinks, 1);
    assert_eq!(report.excluded, 1);
    assert_eq!(report.sparse, 1);
    assert_eq!(report.hardlinks, 1);
    assert_eq!(report.duplicate_dirs, 0);
}

// --- rebuild / roots ---

#[test]
fn test_rebuild_is_idempotent_and_drops_removed_entries() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = indexer(dir.path());

    let first = completed(ix.build_index(&root).unwrap());
    let rows1 = rows_for(&ix, &root);
    let second = completed(ix.build_index(&root).unwrap());
    assert_eq!(rows_for(&ix, &root), rows1);
    assert_eq!(
        (first.file_count, first.dir_count),
        (second.file_count, second.dir_count)
    );

    fs::remove_file(root.join("small.txt")).unwrap();
    let third = completed(ix.build_index(&root).unwrap());
    assert_eq!(third.file_count, 2);
    assert!(ix.search("small.txt", false, 0, 10).unwrap().is_empty());
    assert_eq!(ix.list_indexed_roots().unwrap().len(), 1);
}

#[test]
fn test_forgetting_one_root_keeps_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let a = tree(dir.path(), "alpha");
    let b = tree(dir.path(), "beta");
    write_file(&a.join("only_a.txt"), 10);
    write_file(&b.join("only_b.txt"), 10);
    fs::create_dir(b.join("nested")).unwrap();
    let ix = indexer(dir.path());

    completed(ix.build_index(&a).unwrap());
    completed(ix.build_index(&b).unwrap());
    assert_eq!(ix.stats().unwrap().total, 3);

    assert!(ix.delete_indexed_root(&format!("{}/", a.to_string_lossy())).unwrap());
    // Aggregates change immediately; rows go with the background delete.
    let stats = ix.stats().unwrap();
    assert_eq!((stats.file_count, stats.dir_count), (1, 1));
    ix.flush_maintenance();

    assert!(rows_for(&ix, &a).is_empty());
    assert_eq!(rows_for(&ix, &b).len(), 2);
    let roots = ix.list_indexed_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].path, b.to_string_lossy());
    assert_eq!(ix.search("only_b", false, 0, 10).unwrap().len(), 1);
}

#[test]
fn test_excluded_subtree_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    fs::create_dir_all(root.join("skip/inner")).unwrap();
    write_file(&root.join("skip/inner/hidden.txt"), 10);
    write_file(&root.join("keep.txt"), 10);
    let ix = indexer(dir.path());
    ix.set_excluded_paths(&[root.join("skip").to_string_lossy()])
        .unwrap();

    let summary = completed(ix.build_index(&root).unwrap());
    assert_eq!((summary.file_count, summary.dir_count), (1, 0));
    let rows = rows_for(&ix, &root);
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(|p| p.ends_with("keep.txt")));
}

#[test]
fn test_update_file_after_build_attributes_to_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = indexer(dir.path());
    completed(ix.build_index(&root).unwrap());

    let fresh = root.join("sub").join("fresh.log");
    write_file(&fresh, 42);
    ix.update_file(&fresh).unwrap();
    let hits = ix.search("fresh.log", false, 0, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].size, 42);
    assert_eq!(hits[0].ext, ".log");
    assert_eq!(hits[0].indexed_path, root.to_string_lossy());

    ix.delete_file(&fresh).unwrap();
    assert!(ix.search("fresh.log", false, 0, 10).unwrap().is_empty());
}

// --- control / events ---

#[test]
fn test_stop_then_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = indexer(dir.path());

    let flag = ix.stop_flag();
    ix.set_event_callback(Some(Arc::new(move |ev: &IndexEvent| {
        if matches!(ev, IndexEvent::Started { .. }) {
            flag.store(true, Ordering::Release);
        }
    })));
    let outcome = ix.build_index(&root).unwrap();
    assert!(outcome.is_stopped());
    assert!(!ix.is_building());
    let roots = ix.list_indexed_roots().unwrap();
    assert_eq!(roots.len(), 1);
    // Listed counts match the rows actually stored, whatever progress had seen.
    let stored = rows_for(&ix, &root);
    assert_eq!((roots[0].file_count + roots[0].dir_count) as usize, stored.len());

    ix.set_event_callback(None);
    let summary = completed(ix.build_index(&root).unwrap());
    assert_eq!((summary.file_count, summary.dir_count), (3, 1));
}

#[test]
fn test_concurrent_build_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = Arc::new(indexer(dir.path()));

    let weak = Arc::downgrade(&ix);
    let nested = root.clone();
    let observed: Arc<Mutex<Option<(bool, bool)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&observed);
    ix.set_event_callback(Some(Arc::new(move |ev: &IndexEvent| {
        if !matches!(ev, IndexEvent::Started { .. }) {
            return;
        }
        if let Some(ix) = weak.upgrade() {
            let err = ix.build_index(&nested).unwrap_err();
            let rejected = IndexError::is(&err, |k| matches!(k, IndexError::BuildInProgress));
            *sink.lock().unwrap() = Some((rejected, ix.is_building()));
        }
    })));

    completed(ix.build_index(&root).unwrap());
    assert_eq!(*observed.lock().unwrap(), Some((true, true)));
}

#[test]
fn test_events_start_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let root = tree(dir.path(), "data");
    sample_tree(&root);
    let ix = indexer(dir.path());

    let events: Arc<Mutex<Vec<IndexEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    ix.set_event_callback(Some(Arc::new(move |ev: &IndexEvent| {
        sink.lock().unwrap().push(ev.clone());
    })));
    completed(ix.build_index(&root).unwrap());

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(IndexEvent::Started { root: r }) if *r == root.to_string_lossy()));
    match events.last() {
        Some(IndexEvent::Completed {
            file_count,
            dir_count,
            ..
        }) => assert_eq!((*file_count, *dir_count), (3, 1)),
        other => panic!("last event was {other:?}"),
    }
    let last_progress = events
        .iter()
        .rev()
        .find_map(|e| match e {
            IndexEvent::Progress(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress.percentage, 100.0);
    assert_eq!(last_progress.file_count, 3);
}

#[test]
fn test_progress_stays_below_complete_until_marked() {
    let progress = BuildProgress::new(1_000);
    progress.set_counts(5, 1, 5_000);
    assert!(progress.percentage() < 100.0);
    progress.mark_complete();
    assert_eq!(progress.percentage(), 100.0);
}
