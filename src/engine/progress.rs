//! Build progress: committed counters, disk-usage percentage, periodic snapshots, CLI bar.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::utils::config::ProgressConsts;
use crate::{EventCallback, IndexEvent, ProgressSnapshot};

/// Counters for one build. The writer adds a batch's rows only once its transaction commits, so
/// they reflect durable rows.
pub struct BuildProgress {
    files: AtomicU64,
    dirs: AtomicU64,
    disk_usage: AtomicU64,
    /// Used bytes on the volume at build start; 0 when unknown.
    volume_used: u64,
    start: Instant,
    complete: AtomicBool,
    /// Set while the bulk helper runs: percentage comes from its phases, not from disk usage.
    phase_percent: Mutex<Option<f64>>,
}

impl BuildProgress {
    pub fn new(volume_used: u64) -> Self {
        Self {
            files: AtomicU64::new(0),
            dirs: AtomicU64::new(0),
            disk_usage: AtomicU64::new(0),
            volume_used,
            start: Instant::now(),
            complete: AtomicBool::new(false),
            phase_percent: Mutex::new(None),
        }
    }

    /// Record a committed batch.
    pub fn add_committed(&self, files: u64, dirs: u64, disk_usage: u64) {
        self.files.fetch_add(files, Ordering::Relaxed);
        self.dirs.fetch_add(dirs, Ordering::Relaxed);
        self.disk_usage.fetch_add(disk_usage, Ordering::Relaxed);
    }

    /// Overwrite the counters (bulk helper reports absolute totals).
    pub fn set_counts(&self, files: u64, dirs: u64, disk_usage: u64) {
        self.files.store(files, Ordering::Relaxed);
        self.dirs.store(dirs, Ordering::Relaxed);
        self.disk_usage.store(disk_usage, Ordering::Relaxed);
    }

    /// Forget everything counted so far (a strategy fell back and the root was cleared).
    pub fn reset(&self) {
        self.set_counts(0, 0, 0);
        self.set_phase_percent(None);
    }

    /// Bulk helper scan phase: `scan_pct` (0..=100 as reported by the helper) maps onto [0, 70).
    pub fn set_scan_phase(&self, scan_pct: f64) {
        self.set_phase_percent(Some(scan_phase_percent(scan_pct)));
    }

    /// Bulk helper import phase: `done` of `total` lines maps onto [70, 100].
    pub fn set_import_phase(&self, done: u64, total: u64) {
        self.set_phase_percent(Some(import_phase_percent(done, total)));
    }

    fn set_phase_percent(&self, p: Option<f64>) {
        *self
            .phase_percent
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = p;
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn dirs(&self) -> u64 {
        self.dirs.load(Ordering::Relaxed)
    }

    pub fn disk_usage(&self) -> u64 {
        self.disk_usage.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// 100 only after [`Self::mark_complete`]; otherwise capped at 99.9.
    pub fn percentage(&self) -> f64 {
        if self.is_complete() {
            return 100.0;
        }
        let phase = *self
            .phase_percent
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let raw = match phase {
            Some(p) => p,
            None => disk_percent(self.disk_usage(), self.volume_used),
        };
        raw.clamp(0.0, ProgressConsts::RUNNING_CAP)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            file_count: self.files(),
            dir_count: self.dirs(),
            disk_usage: self.disk_usage(),
            elapsed: self.elapsed(),
            percentage: self.percentage(),
        }
    }
}

/// Accumulated usage as a share of the volume's used space (0 when the denominator is unknown).
pub fn disk_percent(disk_usage: u64, volume_used: u64) -> f64 {
    if volume_used == 0 {
        return 0.0;
    }
    disk_usage as f64 / volume_used as f64 * 100.0
}

pub fn scan_phase_percent(scan_pct: f64) -> f64 {
    scan_pct.clamp(0.0, 100.0) / 100.0 * ProgressConsts::SCAN_PHASE_END
}

pub fn import_phase_percent(done: u64, total: u64) -> f64 {
    let frac = if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    };
    ProgressConsts::SCAN_PHASE_END + frac * (100.0 - ProgressConsts::SCAN_PHASE_END)
}

/// Emit a `Progress` event every tick until `done` fires or disconnects.
pub fn spawn_ticker(
    progress: Arc<BuildProgress>,
    on_event: Option<EventCallback>,
    done: Receiver<()>,
) -> JoinHandle<()> {
    let tick = Duration::from_millis(ProgressConsts::TICK_MS);
    thread::spawn(move || {
        loop {
            match done.recv_timeout(tick) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(cb) = &on_event {
                        cb(&IndexEvent::Progress(progress.snapshot()));
                    }
                }
                _ => break,
            }
        }
    })
}

// --- CLI bar ---

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Percentage bar (total 1000 = tenths of a percent) for `filecat index --verbose`.
pub fn create_progress_bar(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 1000,
        desc = desc,
        animation = Animation::FillUp,
        position = 0
    )))
}

/// Move the bar to `snapshot`. Uses try_lock so the event callback never blocks a build thread.
pub fn update_progress_bar(pb: &ProgressBar, snapshot: &ProgressSnapshot) {
    if let Ok(mut bar) = pb.try_lock() {
        bar.set_description(format!(
            "{} files, {} dirs",
            snapshot.file_count, snapshot.dir_count
        ));
        let _ = bar.update_to((snapshot.percentage * 10.0) as usize);
    }
}

/// Fill the bar on completion (blocking lock: called once, off the hot path).
pub fn finish_progress_bar(pb: &ProgressBar) {
    let mut bar = pb.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = bar.update_to(1000);
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_capped_until_complete() {
        let p = BuildProgress::new(1000);
        p.add_committed(1, 0, 5000);
        assert_eq!(p.percentage(), ProgressConsts::RUNNING_CAP);
        p.mark_complete();
        assert_eq!(p.percentage(), 100.0);
    }

    #[test]
    fn helper_phases_do_not_overlap() {
        assert_eq!(scan_phase_percent(100.0), 70.0);
        assert_eq!(scan_phase_percent(50.0), 35.0);
        assert_eq!(import_phase_percent(0, 10), 70.0);
        assert_eq!(import_phase_percent(10, 10), 100.0);
        assert_eq!(import_phase_percent(0, 0), 100.0);
    }

    #[test]
    fn unknown_volume_reports_zero() {
        let p = BuildProgress::new(0);
        p.add_committed(3, 1, 4096);
        assert_eq!(p.percentage(), 0.0);
        assert_eq!(p.snapshot().file_count, 3);
    }
}
