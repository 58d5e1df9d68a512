//! Bulk full-tree scan: run `filecat-scan` once, elevated, and tail its progress file.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::credential::Elevation;
use crate::Opts;
use crate::engine::progress::BuildProgress;
use crate::error::IndexError;
use crate::utils::HelperScratch;
use crate::utils::config::{ElevationConsts, PackagePaths};

/// One line of the helper's progress file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperProgress {
    /// Seconds since the helper started.
    pub elapsed: f64,
    pub dir_count: u64,
    pub file_count: u64,
    /// Used bytes on the volume (the percentage denominator).
    pub total_disk: u64,
    /// Allocated bytes found so far.
    pub disk_used_size: u64,
    pub percentage: f64,
    #[serde(default)]
    pub error_count: u64,
}

/// Find the helper binary: configured path, then next to the current executable, `bin/`,
/// the parent directory, and finally the system install dir.
pub fn locate_helper(opts: &Opts) -> Option<PathBuf> {
    if let Some(p) = &opts.helper_path {
        return p.is_file().then(|| p.clone());
    }
    let name = PackagePaths::get().helper_name();
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        candidates.push(dir.join(name));
        candidates.push(dir.join("bin").join(name));
        if let Some(parent) = dir.parent() {
            candidates.push(parent.join(name));
        }
    }
    candidates.push(Path::new(ElevationConsts::SYSTEM_HELPER_DIR).join(name));
    candidates.into_iter().find(|p| p.is_file())
}

/// Result of one helper run.
#[derive(Debug, Clone, Default)]
pub struct HelperRun {
    pub last: Option<HelperProgress>,
    pub stopped: bool,
}

fn helper_args(
    root: &Path,
    scratch: &HelperScratch,
    excludes: &[String],
    workers: Option<usize>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--path".into(),
        root.as_os_str().to_owned(),
        "--output".into(),
        scratch.output.as_os_str().to_owned(),
        "--progress-file".into(),
        scratch.progress.as_os_str().to_owned(),
    ];
    for e in excludes {
        args.push("--exclude".into());
        args.push(e.into());
    }
    if let Some(n) = workers {
        args.push("--workers".into());
        args.push(n.to_string().into());
    }
    args
}

/// Read the latest snapshot; `None` while the file is missing or mid-write.
pub fn read_progress_file(path: &Path) -> Option<HelperProgress> {
    let text = std::fs::read_to_string(path).ok()?;
    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line).ok()
}

/// Everything one helper run needs.
pub struct HelperJob<'a> {
    pub helper: &'a Path,
    pub root: &'a Path,
    pub scratch: &'a HelperScratch,
    /// Raw user exclusions, passed through as `--exclude`.
    pub excludes: &'a [String],
    pub workers: Option<usize>,
    pub progress: &'a BuildProgress,
    pub stop: &'a Arc<AtomicBool>,
}

/// Run the helper elevated and wait for it, mirroring its progress into the scan phase.
/// On stop the helper is terminated and its output is left for the caller to discard.
pub fn run_helper(elevation: &Elevation<'_>, job: &HelperJob<'_>) -> Result<HelperRun> {
    let args = helper_args(job.root, job.scratch, job.excludes, job.workers);
    let arg_refs: Vec<&OsStr> = args.iter().map(OsString::as_os_str).collect();
    info!("Bulk scan: {} over {}", job.helper.display(), job.root.display());
    let mut child = elevation.spawn(job.helper.as_os_str(), &arg_refs)?;

    let transcript_rx = read_transcript(child.stderr.take());
    // Nothing is read from stdout; close it so the helper never blocks on a full pipe.
    drop(child.stdout.take());

    let poll = Duration::from_millis(ElevationConsts::HELPER_POLL_MS);
    let mut run = HelperRun::default();
    let status = loop {
        if let Some(status) = child.try_wait().context("wait for scan helper")? {
            break Some(status);
        }
        if job.stop.load(Ordering::Relaxed) {
            terminate(&mut child);
            run.stopped = true;
            break None;
        }
        if let Some(p) = read_progress_file(&job.scratch.progress) {
            mirror(job.progress, &p);
            run.last = Some(p);
        }
        thread::sleep(poll);
    };

    // A terminated sudo can leave the pipe open in a grandchild; only wait briefly then.
    let grace = run.stopped.then_some(poll * 2);
    let transcript = await_transcript(&transcript_rx, grace);
    for line in transcript.lines().filter(|l| !l.trim().is_empty()) {
        debug!("helper: {}", line);
    }
    if run.stopped {
        info!("Bulk scan stopped");
        return Ok(run);
    }
    if let Some(p) = read_progress_file(&job.scratch.progress) {
        mirror(job.progress, &p);
        run.last = Some(p);
    }
    match status {
        Some(s) if s.success() => Ok(run),
        Some(s) => {
            elevation.check_auth(&transcript)?;
            Err(IndexError::HelperUnavailable(format!(
                "exited with {}: {}",
                s,
                transcript.lines().last().unwrap_or("").trim()
            ))
            .into())
        }
        None => Ok(run),
    }
}

/// Drain `src` on its own thread; the text arrives on the returned channel at EOF.
fn read_transcript<R: Read + Send + 'static>(src: Option<R>) -> Receiver<String> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut s) = src {
            let _ = s.read_to_string(&mut text);
        }
        let _ = tx.send(text);
    });
    rx
}

/// Wait for the transcript, at most `grace` when given. Whatever is not in by then is dropped.
fn await_transcript(rx: &Receiver<String>, grace: Option<Duration>) -> String {
    match grace {
        Some(limit) => rx.recv_timeout(limit).unwrap_or_else(|_| {
            debug!("helper stderr still open after {:?}; not waiting", limit);
            String::new()
        }),
        None => rx.recv().unwrap_or_default(),
    }
}

fn mirror(progress: &BuildProgress, p: &HelperProgress) {
    progress.set_counts(p.file_count, p.dir_count, p.disk_used_size);
    progress.set_scan_phase(p.percentage);
}

/// SIGTERM (sudo relays it to the helper), then kill if it does not exit within two polls.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
    let deadline = Instant::now() + Duration::from_millis(2 * ElevationConsts::HELPER_POLL_MS);
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    if let Err(e) = child.kill() {
        warn!("could not kill scan helper: {}", e);
    }
    let _ = child.wait();
}
