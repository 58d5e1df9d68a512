//! Indexer API tests that need no real build: credential, exclusions, config, error kinds.

use filecat::engine::tools::{escape_like, format_bytes, is_same_or_under, like_prefix_pattern};
use filecat::pipeline::{ExcludeRules, is_denied};
use filecat::{IndexError, Indexer, Opts, extension_of};
use std::path::Path;

// --- credential ---

#[test]
fn test_credential_set_has_clear() {
    let ix = Indexer::in_memory(Opts::default()).unwrap();
    assert!(!ix.has_privileged_credential());
    ix.set_privileged_credential("s3cret");
    assert!(ix.has_privileged_credential());
    ix.clear_privileged_credential();
    assert!(!ix.has_privileged_credential());
    ix.set_privileged_credential("again");
    ix.set_privileged_credential("");
    assert!(!ix.has_privileged_credential());
}

// --- exclusions ---

#[test]
fn test_excluded_paths_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cat.db");
    {
        let ix = Indexer::open(&db, Opts::default()).unwrap();
        assert!(ix.get_excluded_paths().is_empty());
        ix.set_excluded_paths(&["/Volumes/Backup", "  ", "/tmp/cache/"]).unwrap();
        assert_eq!(
            ix.get_excluded_paths(),
            vec!["/Volumes/Backup".to_string(), "/tmp/cache/".to_string()]
        );
    }
    let ix = Indexer::open(&db, Opts::default()).unwrap();
    assert_eq!(ix.get_excluded_paths().len(), 2);
    ix.set_excluded_paths::<&str>(&[]).unwrap();
    assert!(ix.get_excluded_paths().is_empty());
}

#[test]
fn test_exclude_rules_exact_prefix_and_deny_list() {
    let rules = ExcludeRules::new(&["/data/skip/"]);
    assert!(rules.is_excluded("/data/skip"));
    assert!(rules.is_excluded("/data/skip/deeper/file"));
    assert!(!rules.is_excluded("/data/skipped"));
    assert!(!rules.is_excluded("/data/keep"));
    assert!(rules.is_excluded("/proc/1/status"));
    assert!(is_denied("/dev"));
    assert!(is_denied("/System/Volumes/VM/swapfile0"));
    assert!(!is_denied("/device"));
}

#[test]
fn test_exclude_rules_include_canonical_form() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().canonicalize().unwrap().join("real");
    std::fs::create_dir(&real).unwrap();
    #[cfg(unix)]
    {
        let link = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let rules = ExcludeRules::new(&[link.to_string_lossy()]);
        assert!(rules.is_excluded(&real.join("x").to_string_lossy()));
        assert!(rules.is_excluded(&link.join("x").to_string_lossy()));
    }
}

// --- catalog state ---

#[test]
fn test_in_memory_build_is_not_initialized() {
    let ix = Indexer::in_memory(Opts::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let err = ix.build_index(dir.path()).unwrap_err();
    assert!(IndexError::is(&err, |k| matches!(k, IndexError::NotInitialized(_))));
    assert!(!ix.is_building());
}

#[test]
fn test_build_of_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ix = Indexer::open(&dir.path().join("cat.db"), Opts::default()).unwrap();
    assert!(ix.build_index(&dir.path().join("nope")).is_err());
    assert!(ix.list_indexed_roots().unwrap().is_empty());
}

#[test]
fn test_fresh_catalog_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ix = Indexer::open(&dir.path().join("cat.db"), Opts::default()).unwrap();
    assert_eq!(ix.index_path().unwrap(), "");
    let stats = ix.stats().unwrap();
    assert_eq!((stats.file_count, stats.dir_count), (0, 0));
    assert!(ix.list_indexed_roots().unwrap().is_empty());
    assert!(!ix.delete_indexed_root("/not/indexed").unwrap());
    ix.flush_maintenance();
}

// --- tools ---

#[test]
fn test_extension_of() {
    assert_eq!(extension_of("a.TXT"), ".txt");
    assert_eq!(extension_of("archive.tar.gz"), ".gz");
    assert_eq!(extension_of(".bashrc"), "");
    assert_eq!(extension_of("Makefile"), "");
}

#[test]
fn test_like_helpers() {
    assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    assert_eq!(like_prefix_pattern("/a/b_c/"), "/a/b\\_c/%");
    assert!(is_same_or_under("/a/b", "/a/b"));
    assert!(is_same_or_under("/a/b/c", "/a/b/"));
    assert!(!is_same_or_under("/a/bc", "/a/b"));
    assert!(is_same_or_under("/anything", "/"));
}

#[test]
fn test_format_bytes() {
    assert_eq!(format_bytes(512), "512 B");
    assert_eq!(format_bytes(1536), "1.5 KiB");
}

#[test]
fn test_open_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("a").join("b").join("cat.db");
    let ix = Indexer::open(&db, Opts::default()).unwrap();
    assert_eq!(ix.catalog().path(), Some(Path::new(&db)));
}
