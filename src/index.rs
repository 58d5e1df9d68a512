//! The indexer context: owns the catalog, the build lock, the stop flag, the elevated credential
//! and the exclusion list, and hosts every public operation.

use anyhow::{Context, Result};
use crossbeam_channel::bounded;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use crate::disk_detect::volume_used_bytes;
use crate::engine::db_ops::{Catalog, ConfigKey};
use crate::engine::maintenance::Maintenance;
use crate::engine::progress::{BuildProgress, spawn_ticker};
use crate::engine::search;
use crate::engine::tools::{canonicalize_root, format_bytes, path_to_db_string};
use crate::error::IndexError;
use crate::pipeline::{BuildJob, ExcludeRules, run_strategies, select_strategies};
use crate::privileged::CredentialCache;
use crate::{
    BuildOutcome, BuildSummary, EventCallback, IndexEvent, IndexStats, IndexedRoot, Opts, Record,
    SearchOptions,
};

/// User exclusions as entered plus the expanded rule set built from them.
#[derive(Default)]
struct Exclusions {
    raw: Vec<String>,
    rules: ExcludeRules,
}

pub struct Indexer {
    catalog: Arc<Catalog>,
    build_lock: Mutex<()>,
    building: AtomicBool,
    stop: Arc<AtomicBool>,
    credential: Arc<CredentialCache>,
    exclusions: RwLock<Exclusions>,
    on_event: RwLock<Option<EventCallback>>,
    opts: Opts,
    maintenance: Maintenance,
}

/// Clears the building flag however the build ends.
struct Building<'a>(&'a AtomicBool);

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Indexer {
    /// Open (or create) the catalog at `db_path`.
    pub fn open(db_path: &Path, opts: Opts) -> Result<Self> {
        let catalog = Catalog::open(db_path)
            .with_context(|| format!("open catalog {}", db_path.display()))?;
        Self::with_catalog(catalog, opts)
    }

    /// In-memory catalog: searches, updates and settings work; builds report `NotInitialized`.
    pub fn in_memory(opts: Opts) -> Result<Self> {
        Self::with_catalog(Catalog::in_memory()?, opts)
    }

    fn with_catalog(catalog: Catalog, opts: Opts) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let raw: Vec<String> = match catalog.config_get(ConfigKey::ExcludePaths)? {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("ignoring unreadable exclusion list: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        let rules = ExcludeRules::new(&raw);
        debug!("{} CONFIG:{:#?}", env!("CARGO_PKG_NAME").to_uppercase(), opts);
        Ok(Self {
            maintenance: Maintenance::start(Arc::clone(&catalog)),
            catalog,
            build_lock: Mutex::new(()),
            building: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            credential: Arc::new(CredentialCache::default()),
            exclusions: RwLock::new(Exclusions { raw, rules }),
            on_event: RwLock::new(None),
            opts,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    fn emit(&self, ev: &IndexEvent) {
        let cb = self
            .on_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(cb) = cb {
            cb(ev);
        }
    }

    /// Replace (or with `None`, remove) the lifecycle event callback. Takes effect at the next build.
    pub fn set_event_callback(&self, cb: Option<EventCallback>) {
        *self
            .on_event
            .write()
            .unwrap_or_else(PoisonError::into_inner) = cb;
    }

    // --- build ---

    /// Build (or rebuild) the catalog for `root`. Rows previously under `root` are replaced;
    /// other roots are untouched. Returns `BuildInProgress` if another build is running and
    /// `Ok(BuildOutcome::Stopped)` when [`Indexer::stop`] ends it early.
    pub fn build_index(&self, root: &Path) -> Result<BuildOutcome> {
        let _lock = match self.build_lock.try_lock() {
            Ok(g) => g,
            Err(TryLockError::WouldBlock) => return Err(IndexError::BuildInProgress.into()),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        if self.catalog.path().is_none() {
            return Err(IndexError::NotInitialized("catalog is in memory".to_string()).into());
        }
        let root = canonicalize_root(root)?;
        let root_key = path_to_db_string(&root);

        self.building.store(true, Ordering::Release);
        let _building = Building(&self.building);
        self.stop.store(false, Ordering::Release);
        let on_event = self
            .on_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.emit(&IndexEvent::Started {
            root: root_key.clone(),
        });

        // A pending background delete of this root would remove the new rows.
        self.maintenance.flush();
        self.catalog.clear_root(&root_key)?;
        self.catalog.save_index_path(&root_key)?;

        let volume_used = volume_used_bytes(&root).unwrap_or(0);
        debug!("volume used: {}", format_bytes(volume_used));
        let progress = Arc::new(BuildProgress::new(volume_used));
        let (done_tx, done_rx) = bounded::<()>(0);
        let ticker = spawn_ticker(Arc::clone(&progress), on_event.clone(), done_rx);

        let (raw, rules) = {
            let ex = self
                .exclusions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            (ex.raw.clone(), ex.rules.clone())
        };
        let strategies = select_strategies(&self.credential, &self.opts);
        let job = BuildJob {
            root: &root,
            root_key: &root_key,
            catalog: &self.catalog,
            rules: &rules,
            excludes: &raw,
            credential: &self.credential,
            progress: &progress,
            stop: &self.stop,
            opts: &self.opts,
            on_event,
        };
        let result = run_strategies(&strategies, &job);
        drop(done_tx);
        let _ = ticker.join();
        let (res, strategy) = result?;

        if res.stopped || self.stop.load(Ordering::Acquire) {
            // Keep the root listed so its partial rows can be rebuilt or forgotten. Counted from
            // the rows: a stopped helper scan reports entries that were never imported.
            let (files, dirs) = self.catalog.upsert_root_from_rows(&root_key)?;
            info!(
                "Build of {} stopped with {} files, {} dirs stored",
                root_key, files, dirs
            );
            self.emit(&IndexEvent::Stopped);
            return Ok(BuildOutcome::Stopped);
        }

        progress.set_counts(res.files, res.dirs, res.disk_usage);
        progress.mark_complete();
        let elapsed = progress.elapsed();
        self.catalog
            .upsert_indexed_root(&root_key, res.files, res.dirs)?;
        self.refresh_stats(Some(elapsed.as_secs() as i64))?;
        if strategy == "helper" {
            self.maintenance.vacuum_checkpoint();
        } else {
            self.maintenance.checkpoint();
        }

        info!(
            "Indexed {}: {} files, {} dirs, {} on disk in {:.2}s ({}, {} skipped)",
            root_key,
            res.files,
            res.dirs,
            format_bytes(res.disk_usage),
            elapsed.as_secs_f64(),
            strategy,
            res.skipped
        );
        self.emit(&IndexEvent::Progress(progress.snapshot()));
        self.emit(&IndexEvent::Completed {
            file_count: res.files,
            dir_count: res.dirs,
            elapsed,
        });
        Ok(BuildOutcome::Completed(BuildSummary {
            file_count: res.files,
            dir_count: res.dirs,
            disk_usage: res.disk_usage,
            elapsed,
            skipped: res.skipped,
            strategy,
        }))
    }

    /// Ask the running build to stop. Workers drain; the open batch commits.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Handle for stopping from another thread (e.g. a Ctrl+C handler).
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    // --- search ---

    /// Keyword search; see [`search::search`] for the query forms. `limit` 0 means the default page.
    pub fn search(
        &self,
        keyword: &str,
        use_regex: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.catalog
            .read(|c| search::search(c, keyword, use_regex, offset, limit))
    }

    pub fn search_advanced(&self, opts: &SearchOptions) -> Result<Vec<Record>> {
        self.catalog.read(|c| search::search_advanced(c, opts))
    }

    // --- roots ---

    pub fn list_indexed_roots(&self) -> Result<Vec<IndexedRoot>> {
        self.catalog.list_indexed_roots()
    }

    /// Forget `root`: its aggregate row goes now; its file rows are deleted in the background
    /// (see [`Indexer::flush_maintenance`]). Returns whether the root was listed.
    pub fn delete_indexed_root(&self, root: &str) -> Result<bool> {
        let key = if root.len() > 1 {
            root.trim_end_matches('/')
        } else {
            root
        };
        let removed = self.catalog.remove_indexed_root(key)?;
        self.refresh_stats(None)?;
        self.maintenance.delete_root(key);
        info!(
            "Forgot {}{}",
            key,
            if removed { "" } else { " (was not listed)" }
        );
        Ok(removed)
    }

    /// Wait for queued background work (root deletions, checkpoints) to finish.
    pub fn flush_maintenance(&self) {
        self.maintenance.flush();
    }

    // --- credential ---

    /// Cache the elevated credential in memory; an empty string clears it.
    pub fn set_privileged_credential(&self, secret: &str) {
        self.credential.set(secret);
    }

    pub fn has_privileged_credential(&self) -> bool {
        self.credential.is_set()
    }

    pub fn clear_privileged_credential(&self) {
        self.credential.clear();
    }

    // --- exclusions ---

    /// Replace the exclusion list (persisted as JSON in the catalog). Applies from the next build.
    pub fn set_excluded_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        let raw: Vec<String> = paths
            .iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let json = serde_json::to_string(&raw).context("serialize exclusions")?;
        self.catalog.config_set(ConfigKey::ExcludePaths, &json)?;
        let rules = ExcludeRules::new(&raw);
        *self
            .exclusions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Exclusions { raw, rules };
        Ok(())
    }

    pub fn get_excluded_paths(&self) -> Vec<String> {
        self.exclusions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .raw
            .clone()
    }

    // --- stats and discrete updates ---

    pub fn stats(&self) -> Result<IndexStats> {
        self.catalog.stats()
    }

    /// Last built root, empty when nothing was built.
    pub fn index_path(&self) -> Result<String> {
        self.catalog.index_path()
    }

    /// Re-stat one path and replace its row (removes it if gone).
    pub fn update_file(&self, path: &Path) -> Result<()> {
        self.catalog.update_file(path)
    }

    pub fn delete_file(&self, path: &Path) -> Result<()> {
        self.catalog.delete_file(path)
    }

    /// Global stats = sum over indexed roots. `None` keeps the last recorded scan time.
    fn refresh_stats(&self, scan_time: Option<i64>) -> Result<()> {
        let scan_time = match scan_time {
            Some(t) => t,
            None => self
                .catalog
                .config_get(ConfigKey::IndexStats)?
                .and_then(|json| serde_json::from_str::<IndexStats>(&json).ok())
                .map(|s| s.scan_time)
                .unwrap_or(0),
        };
        let (files, dirs) = self
            .list_indexed_roots()?
            .iter()
            .fold((0, 0), |(f, d), r| (f + r.file_count, d + r.dir_count));
        self.catalog.save_stats(&IndexStats {
            file_count: files,
            dir_count: dirs,
            total: files + dirs,
            scan_time,
        })
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.maintenance.shutdown();
    }
}
