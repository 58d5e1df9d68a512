//! Build strategies and the fallback loop that runs them.
//!
//! [`HelperScan`] pays the elevation cost once for the whole tree; [`TreeWalk`] is the in-process
//! walker, optionally retrying unreadable directories through an elevated listing. Strategies are
//! picked by availability up front and tried in order.

use anyhow::Result;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::context::WalkConfig;
use super::exclude::ExcludeRules;
use super::filter::FileFilter;
use super::walk::start_walk;
use crate::disk_detect::workers_for_path;
use crate::engine::db_ops::{Catalog, WriterParams, open_writer_connection, run_writer};
use crate::engine::progress::BuildProgress;
use crate::engine::tools::running_as_root;
use crate::error::IndexError;
use crate::privileged::{
    CredentialCache, DirLister, ElevatedLister, Elevation, HelperJob, import_ndjson,
    locate_helper, run_helper,
};
use crate::utils::HelperScratch;
use crate::utils::config::{BatchSizes, ChannelCaps, ElevationConsts};
use crate::{EventCallback, IndexEvent, Opts};

/// Everything a strategy needs for one build of one root.
pub struct BuildJob<'a> {
    /// Canonical root directory.
    pub root: &'a Path,
    /// `root` as stored in `files.indexed_path`.
    pub root_key: &'a str,
    pub catalog: &'a Catalog,
    pub rules: &'a ExcludeRules,
    /// Exclusions as the user entered them (forwarded to the helper).
    pub excludes: &'a [String],
    pub credential: &'a Arc<CredentialCache>,
    pub progress: &'a Arc<BuildProgress>,
    pub stop: &'a Arc<AtomicBool>,
    pub opts: &'a Opts,
    pub on_event: Option<EventCallback>,
}

/// What a strategy produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StrategyResult {
    pub files: u64,
    pub dirs: u64,
    pub disk_usage: u64,
    pub skipped: u64,
    pub stopped: bool,
}

pub trait BuildStrategy {
    fn name(&self) -> &'static str;
    fn run(&self, job: &BuildJob<'_>) -> Result<StrategyResult>;
}

// --- in-process walk ---

pub struct TreeWalk;

impl TreeWalk {
    /// Elevated lister for permission-denied directories, when a credential is set and we are
    /// not already root. A rejected credential fails the build; a missing `sudo` only disables
    /// the lister.
    fn lister(job: &BuildJob<'_>) -> Result<Option<Arc<dyn DirLister>>> {
        if !job.credential.is_set() || running_as_root() {
            return Ok(None);
        }
        if let Err(e) = Elevation::new(job.credential).warm_up() {
            if IndexError::is(&e, |k| matches!(k, IndexError::ElevationFailed(_))) {
                return Err(e);
            }
            warn!("elevated listing unavailable: {:#}", e);
            return Ok(None);
        }
        Ok(Some(Arc::new(ElevatedLister::new(
            Arc::clone(job.credential),
            ElevationConsts::LISTING_CONCURRENCY,
        ))))
    }
}

impl BuildStrategy for TreeWalk {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn run(&self, job: &BuildJob<'_>) -> Result<StrategyResult> {
        let (workers, drive_type) = workers_for_path(job.root, job.opts.num_workers);
        let lister = Self::lister(job)?;
        debug!(
            "walk {}: {} workers on {:?}, elevated listing {}",
            job.root.display(),
            workers,
            drive_type,
            if lister.is_some() { "on" } else { "off" }
        );
        let conn = open_writer_connection(job.catalog.path())?;
        let walk = start_walk(
            job.root,
            WalkConfig {
                workers,
                dir_queue_cap: workers * ChannelCaps::DIR_QUEUE_PER_WORKER,
                record_cap: ChannelCaps::RECORDS,
                rules: job.rules.clone(),
                filter: FileFilter::default(),
                stop: Arc::clone(job.stop),
                lister,
            },
        );
        let params = WriterParams {
            root: job.root_key.to_string(),
            batch_size: BatchSizes::WALK_COMMIT,
            progress: Arc::clone(job.progress),
            stop: Arc::clone(job.stop),
            on_event: job.on_event.clone(),
        };
        let written = run_writer(&conn, &walk.records, &params);
        // Joining drops the receiver, so workers blocked on a send unwind even after a writer error.
        let report = walk.join();
        let totals = written?;
        if report.exhausted > 0 {
            warn!(
                "{} directories hit the open-file limit; the catalog is incomplete (try fewer workers)",
                report.exhausted
            );
        }
        if report.elevated > 0 {
            info!("{} unreadable directories listed with elevation", report.elevated);
        }
        debug!(
            "walk skipped {} duplicate directories, {} symlinks, {} excluded entries",
            report.duplicate_dirs, report.symlinks, report.excluded
        );
        Ok(StrategyResult {
            files: totals.files,
            dirs: totals.dirs,
            disk_usage: totals.disk_usage,
            skipped: report.skipped + report.exhausted,
            stopped: totals.stopped || report.stopped,
        })
    }
}

// --- elevated bulk helper ---

pub struct HelperScan {
    pub helper: PathBuf,
}

impl BuildStrategy for HelperScan {
    fn name(&self) -> &'static str {
        "helper"
    }

    fn run(&self, job: &BuildJob<'_>) -> Result<StrategyResult> {
        let scratch = HelperScratch::new();
        let elevation = Elevation::new(job.credential);
        let run = run_helper(
            &elevation,
            &HelperJob {
                helper: &self.helper,
                root: job.root,
                scratch: &scratch,
                excludes: job.excludes,
                workers: job.opts.num_workers,
                progress: job.progress,
                stop: job.stop,
            },
        )?;
        if run.stopped {
            // Nothing was imported; drop the helper's mirrored counts.
            job.progress.reset();
            return Ok(StrategyResult {
                stopped: true,
                ..Default::default()
            });
        }
        if !scratch.output.is_file() {
            return Err(IndexError::HelperUnavailable(format!(
                "no output at {}",
                scratch.output.display()
            ))
            .into());
        }
        let conn = open_writer_connection(job.catalog.path())?;
        let imported = import_ndjson(&conn, &scratch.output, job.root_key, job.progress, job.stop)?;
        Ok(StrategyResult {
            files: imported.files,
            dirs: imported.dirs,
            disk_usage: imported.disk_usage,
            skipped: run.last.map(|p| p.error_count).unwrap_or(0),
            stopped: imported.stopped,
        })
    }
}

/// Strategies to try for this build, preferred first.
pub fn select_strategies(credential: &CredentialCache, opts: &Opts) -> Vec<Box<dyn BuildStrategy>> {
    let mut out: Vec<Box<dyn BuildStrategy>> = Vec::with_capacity(2);
    if credential.is_set() && !opts.no_helper && !running_as_root() {
        match locate_helper(opts) {
            Some(helper) => out.push(Box::new(HelperScan { helper })),
            None => debug!("scan helper not found; using the in-process walk"),
        }
    }
    out.push(Box::new(TreeWalk));
    out
}

/// Run `strategies` in order until one succeeds. A failed strategy's partial rows are cleared and
/// progress reset before the next one starts. A rejected credential or the last strategy's
/// failure ends the build.
pub fn run_strategies(
    strategies: &[Box<dyn BuildStrategy>],
    job: &BuildJob<'_>,
) -> Result<(StrategyResult, &'static str)> {
    let mut last_err = None;
    for (i, strategy) in strategies.iter().enumerate() {
        info!("Build strategy: {}", strategy.name());
        let err = match strategy.run(job) {
            Ok(res) => return Ok((res, strategy.name())),
            Err(e) => e,
        };
        if IndexError::is(&err, |k| matches!(k, IndexError::ElevationFailed(_))) {
            return Err(err);
        }
        let Some(next) = strategies.get(i + 1) else {
            return Err(err);
        };
        warn!(
            "{} failed, falling back to {}: {:#}",
            strategy.name(),
            next.name(),
            err
        );
        if let Some(cb) = &job.on_event {
            cb(&IndexEvent::Fallback {
                from: strategy.name(),
                to: next.name(),
                reason: format!("{:#}", err),
            });
        }
        job.catalog.clear_root(job.root_key)?;
        job.progress.reset();
        last_err = Some(err);
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no build strategy available")))
}
