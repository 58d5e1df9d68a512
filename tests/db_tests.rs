//! Catalog tests: schema, migration, root clearing, stats cache, writer, discrete updates.

use crossbeam_channel::bounded;
use filecat::engine::db_ops::{
    Catalog, ConfigKey, WriterParams, insert_rows_multi, open_writer_connection, run_writer,
};
use filecat::engine::progress::BuildProgress;
use filecat::{EventCallback, FileRecord, IndexEvent, IndexStats};
use rusqlite::Connection;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

fn rec(path: &str, is_dir: bool, size: i64) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap().to_string(),
        size,
        disk_usage: size,
        mod_time: 1_700_000_000,
        is_dir,
        is_sparse: false,
        is_hardlink: false,
    }
}

fn seed(cat: &Catalog, root: &str, rows: &[FileRecord]) {
    cat.with_conn(|c| insert_rows_multi(c, rows, root).map(|_| ()))
        .unwrap();
}

fn paths(cat: &Catalog) -> Vec<String> {
    cat.with_conn(|c| {
        let mut stmt = c.prepare("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .unwrap()
}

// --- schema / migration ---

#[test]
fn test_schema_has_tables_and_indexes() {
    let cat = Catalog::in_memory().unwrap();
    let names: Vec<String> = cat
        .with_conn(|c| {
            let mut stmt = c.prepare("SELECT name FROM sqlite_master ORDER BY name")?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .unwrap();
    for want in [
        "files",
        "config",
        "indexed_paths",
        "idx_name",
        "idx_indexed_path",
        "idx_indexed_path_isdir",
    ] {
        assert!(names.iter().any(|n| n == want), "missing {want}");
    }
}

#[test]
fn test_migration_adds_and_backfills_indexed_path() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("old.db");
    {
        let c = Connection::open(&db).unwrap();
        c.execute_batch(
            "CREATE TABLE files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mod_time INTEGER NOT NULL,
                is_dir INTEGER NOT NULL,
                ext TEXT NOT NULL
             );
             CREATE INDEX idx_ext ON files(ext);
             CREATE INDEX idx_path ON files(path);
             CREATE TABLE config (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             INSERT INTO config VALUES ('index_path', '/data');
             INSERT INTO files (path, name, size, mod_time, is_dir, ext)
               VALUES ('/data/a.txt', 'a.txt', 1, 0, 0, '.txt');",
        )
        .unwrap();
    }
    let cat = Catalog::open(&db).unwrap();
    let root: String = cat
        .with_conn(|c| {
            Ok(c.query_row(
                "SELECT indexed_path FROM files WHERE path = '/data/a.txt'",
                [],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(root, "/data");
    let obsolete: i64 = cat
        .with_conn(|c| {
            Ok(c.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('idx_ext', 'idx_path')",
                [],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(obsolete, 0);
    assert_eq!(cat.index_path().unwrap(), "/data");
}

#[test]
fn test_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("cat.db");
    {
        let cat = Catalog::open(&db).unwrap();
        seed(&cat, "/r", &[rec("/r/x", false, 3)]);
    }
    let cat = Catalog::open(&db).unwrap();
    assert_eq!(paths(&cat), vec!["/r/x"]);
}

// --- roots ---

#[test]
fn test_clear_root_removes_only_nested_rows() {
    let cat = Catalog::in_memory().unwrap();
    seed(
        &cat,
        "/a",
        &[
            rec("/a/b", true, 0),
            rec("/a/b/c.txt", false, 5),
            rec("/a/bc", true, 0),
            rec("/a/bc/d.txt", false, 5),
        ],
    );
    let removed = cat.clear_root("/a/b").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(paths(&cat), vec!["/a/bc", "/a/bc/d.txt"]);
}

#[test]
fn test_clear_root_treats_like_metacharacters_literally() {
    let cat = Catalog::in_memory().unwrap();
    seed(
        &cat,
        "/x",
        &[rec("/x/a_b/f", false, 1), rec("/x/aXb/f", false, 1)],
    );
    cat.clear_root("/x/a_b").unwrap();
    assert_eq!(paths(&cat), vec!["/x/aXb/f"]);
}

#[test]
fn test_indexed_roots_upsert_list_remove() {
    let cat = Catalog::in_memory().unwrap();
    cat.upsert_indexed_root("/one", 3, 1).unwrap();
    cat.upsert_indexed_root("/two", 5, 2).unwrap();
    cat.upsert_indexed_root("/one", 4, 1).unwrap();
    let roots = cat.list_indexed_roots().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0].path, "/one");
    assert_eq!(roots[0].file_count, 4);
    assert!(roots[0].updated_at >= roots[0].created_at);

    assert!(cat.remove_indexed_root("/one").unwrap());
    assert!(!cat.remove_indexed_root("/one").unwrap());
    assert_eq!(cat.list_indexed_roots().unwrap().len(), 1);
}

#[test]
fn test_root_counts_from_rows_replace_reported_counts() {
    let cat = Catalog::in_memory().unwrap();
    cat.upsert_indexed_root("/r", 1000, 50).unwrap();
    seed(
        &cat,
        "/r",
        &[rec("/r/d", true, 0), rec("/r/d/f1", false, 1), rec("/r/f2", false, 1)],
    );
    seed(&cat, "/other", &[rec("/other/x", false, 1)]);
    assert_eq!(cat.upsert_root_from_rows("/r").unwrap(), (2, 1));
    let roots = cat.list_indexed_roots().unwrap();
    let r = roots.iter().find(|r| r.path == "/r").unwrap();
    assert_eq!((r.file_count, r.dir_count), (2, 1));

    assert_eq!(cat.upsert_root_from_rows("/empty").unwrap(), (0, 0));
    assert_eq!(cat.list_indexed_roots().unwrap().len(), 2);
}

#[test]
fn test_delete_root_rows_leaves_other_roots() {
    let cat = Catalog::in_memory().unwrap();
    seed(&cat, "/one", &[rec("/one/a", false, 1), rec("/one/b", false, 1)]);
    seed(&cat, "/two", &[rec("/two/a", false, 1)]);
    assert_eq!(cat.delete_root_rows("/one").unwrap(), 2);
    assert_eq!(paths(&cat), vec!["/two/a"]);
}

// --- config / stats ---

#[test]
fn test_config_round_trip() {
    let cat = Catalog::in_memory().unwrap();
    assert_eq!(cat.config_get(ConfigKey::ExcludePaths).unwrap(), None);
    cat.config_set(ConfigKey::ExcludePaths, "[\"/tmp\"]").unwrap();
    cat.config_set(ConfigKey::ExcludePaths, "[]").unwrap();
    assert_eq!(
        cat.config_get(ConfigKey::ExcludePaths).unwrap().as_deref(),
        Some("[]")
    );
}

#[test]
fn test_stats_falls_back_to_count_then_uses_cache() {
    let cat = Catalog::in_memory().unwrap();
    seed(
        &cat,
        "/r",
        &[rec("/r/d", true, 0), rec("/r/d/f1", false, 1), rec("/r/f2", false, 1)],
    );
    let counted = cat.stats().unwrap();
    assert_eq!((counted.file_count, counted.dir_count, counted.total), (2, 1, 3));

    let cached = IndexStats {
        file_count: 100,
        dir_count: 10,
        total: 110,
        scan_time: 7,
    };
    cat.save_stats(&cached).unwrap();
    assert_eq!(cat.stats().unwrap(), cached);
}

#[test]
fn test_insert_rows_multi_ignores_existing_paths() {
    let cat = Catalog::in_memory().unwrap();
    let first = cat
        .with_conn(|c| insert_rows_multi(c, &[rec("/r/a", false, 1), rec("/r/b", false, 1)], "/r"))
        .unwrap();
    let second = cat
        .with_conn(|c| insert_rows_multi(c, &[rec("/r/b", false, 1), rec("/r/c", false, 1)], "/r"))
        .unwrap();
    assert_eq!((first, second), (2, 1));
    assert_eq!(paths(&cat).len(), 3);
}

// --- writer ---

#[test]
fn test_writer_counts_inserted_rows_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cat.db");
    let cat = Catalog::open(&db).unwrap();
    let conn = open_writer_connection(cat.path()).unwrap();

    let (tx, rx) = bounded(16);
    for r in [
        rec("/r/d", true, 0),
        rec("/r/d/a", false, 100),
        rec("/r/d/a", false, 100),
        rec("/r/b", false, 50),
    ] {
        tx.send(r).unwrap();
    }
    drop(tx);

    let progress = Arc::new(BuildProgress::new(0));
    let params = WriterParams {
        root: "/r".to_string(),
        batch_size: 2,
        progress: Arc::clone(&progress),
        stop: Arc::new(AtomicBool::new(false)),
        on_event: None,
    };
    let totals = run_writer(&conn, &rx, &params).unwrap();
    assert_eq!((totals.files, totals.dirs, totals.disk_usage), (2, 1, 150));
    assert!(!totals.stopped);
    assert!(totals.batches >= 2);
    assert_eq!((progress.files(), progress.dirs()), (2, 1));
    assert_eq!(paths(&cat).len(), 3);
}

#[test]
fn test_writer_progress_counts_committed_batches_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cat.db");
    let cat = Catalog::open(&db).unwrap();
    let conn = open_writer_connection(cat.path()).unwrap();

    let (tx, rx) = bounded(16);
    let sender = std::thread::spawn(move || {
        for i in 0..10_000 {
            tx.send(rec(&format!("/r/f{i:05}"), false, 1)).unwrap();
        }
    });

    let progress = Arc::new(BuildProgress::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let on_event: EventCallback = {
        let progress = Arc::clone(&progress);
        let seen = Arc::clone(&seen);
        Arc::new(move |ev: &IndexEvent| {
            if matches!(ev, IndexEvent::FileScanned { .. }) {
                seen.lock().unwrap().push(progress.files());
            }
        })
    };
    let params = WriterParams {
        root: "/r".to_string(),
        batch_size: 3_000,
        progress: Arc::clone(&progress),
        stop: Arc::new(AtomicBool::new(false)),
        on_event: Some(on_event),
    };
    let totals = run_writer(&conn, &rx, &params).unwrap();
    sender.join().unwrap();
    // The 10,000th row sits in an open batch; three committed batches precede it.
    assert_eq!(*seen.lock().unwrap(), vec![9_000]);
    assert_eq!(totals.files, 10_000);
    assert_eq!(progress.files(), 10_000);
}

#[test]
fn test_writer_stops_and_discards_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cat.db");
    let cat = Catalog::open(&db).unwrap();
    let conn = open_writer_connection(cat.path()).unwrap();

    let (tx, rx) = bounded(16);
    tx.send(rec("/r/a", false, 1)).unwrap();
    drop(tx);
    let params = WriterParams {
        root: "/r".to_string(),
        batch_size: 100,
        progress: Arc::new(BuildProgress::new(0)),
        stop: Arc::new(AtomicBool::new(true)),
        on_event: None,
    };
    let totals = run_writer(&conn, &rx, &params).unwrap();
    assert!(totals.stopped);
    assert_eq!(totals.files, 0);
    assert!(paths(&cat).is_empty());
}

#[test]
fn test_writer_connection_needs_a_file() {
    let err = open_writer_connection(None).unwrap_err();
    assert!(filecat::IndexError::is(&err, |k| matches!(
        k,
        filecat::IndexError::NotInitialized(_)
    )));
}

// --- discrete updates ---

#[test]
fn test_update_file_inserts_replaces_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let root_str = root.to_string_lossy().into_owned();
    let cat = Catalog::in_memory().unwrap();
    cat.upsert_indexed_root(&root_str, 0, 0).unwrap();

    let f = root.join("Notes.MD");
    std::fs::write(&f, b"hello").unwrap();
    cat.update_file(&f).unwrap();
    let (size, ext, indexed): (i64, String, String) = cat
        .with_conn(|c| {
            Ok(c.query_row(
                "SELECT size, ext, indexed_path FROM files WHERE name = 'Notes.MD'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?)
        })
        .unwrap();
    assert_eq!((size, ext.as_str(), indexed.as_str()), (5, ".md", root_str.as_str()));

    std::fs::write(&f, b"hello world").unwrap();
    cat.update_file(&f).unwrap();
    assert_eq!(paths(&cat).len(), 1);

    std::fs::remove_file(&f).unwrap();
    cat.update_file(&f).unwrap();
    assert!(paths(&cat).is_empty());
}

#[test]
fn test_delete_file_removes_row() {
    let cat = Catalog::in_memory().unwrap();
    seed(&cat, "/r", &[rec("/r/a", false, 1), rec("/r/b", false, 1)]);
    cat.delete_file(std::path::Path::new("/r/a")).unwrap();
    assert_eq!(paths(&cat), vec!["/r/b"]);
}
