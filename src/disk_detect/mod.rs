//! Drive-type detection for sizing the directory worker pool, plus volume usage for progress.
//!
//! [`workers_for_path`] is the main entry: CPU threads × IO factor, capped for spinning disks and
//! network mounts, then capped again by the process FD limit.

use log::debug;
use std::path::Path;
use sysinfo::{Disk, DiskKind, Disks};

use crate::utils::config::WorkerThreadLimits;
use crate::utils::fd_limit::cap_workers_by_fd_limit;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

mod network;
pub mod volume;

pub use volume::volume_used_bytes;

/// Drive type for performance tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    SSD,
    HDD,
    Network,
    Unknown,
}

impl DriveType {
    /// Directory workers for this drive type. Enumeration is I/O bound, so SSDs get
    /// several workers per CPU thread; seeks on HDDs and round trips on network mounts do not scale.
    pub fn worker_count(&self, limits: &WorkerThreadLimits) -> usize {
        let io_bound = limits.all_threads.max(1) * limits.io_factor;
        let n = match self {
            DriveType::SSD | DriveType::Unknown => io_bound,
            DriveType::HDD => io_bound.min(limits.hdd_max),
            DriveType::Network => io_bound.min(limits.network_max),
        };
        n.max(limits.floor)
    }
}

/// Run `f` on the sysinfo disk whose mount point is the longest prefix of `path`.
pub(crate) fn with_disk_for_path<T>(path: &Path, f: impl FnOnce(&Disk) -> T) -> Option<T> {
    let disks = Disks::new_with_refreshed_list();
    let norm = |s: &str| s.replace('\\', "/");
    let path_str = norm(&path.to_string_lossy());
    disks
        .iter()
        .filter(|d| path_str.starts_with(&norm(&d.mount_point().to_string_lossy())))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(f)
}

fn classify_disk(path: &Path, disk: &Disk) -> DriveType {
    let fs_type = disk.file_system().to_string_lossy();
    let mount = disk.mount_point().to_string_lossy();
    debug!(
        "Disk detection: path={}, mount={}, fs_type={}, kind={:?}",
        path.display(),
        mount,
        fs_type,
        disk.kind()
    );
    if network::is_network_fs(&fs_type) || network::is_network_mount(&mount) {
        return DriveType::Network;
    }
    match disk.kind() {
        DiskKind::HDD => DriveType::HDD,
        DiskKind::SSD => DriveType::SSD,
        DiskKind::Unknown(_) => {
            #[cfg(target_os = "linux")]
            if let Some(t) = linux::rotational(disk) {
                return t;
            }
            DriveType::Unknown
        }
    }
}

/// Detect drive type for the given path.
pub fn drive_type_for_path(path: &Path) -> DriveType {
    #[cfg(target_os = "macos")]
    if macos::statfs_is_network(path) {
        return DriveType::Network;
    }
    with_disk_for_path(path, |d| classify_disk(path, d)).unwrap_or_else(|| {
        debug!("No disk found for path: {}", path.display());
        DriveType::Unknown
    })
}

/// Returns `(workers, drive_type)` for walking `path`. `override_workers` replaces the
/// drive-derived count; the FD cap applies either way.
pub fn workers_for_path(path: &Path, override_workers: Option<usize>) -> (usize, DriveType) {
    let limits = WorkerThreadLimits::current();
    let drive_type = drive_type_for_path(path);
    let wanted = override_workers
        .filter(|&n| n > 0)
        .unwrap_or_else(|| drive_type.worker_count(&limits));
    let workers = cap_workers_by_fd_limit(wanted);
    debug!(
        "Drive type: {:?}, {} threads → {} walk workers",
        drive_type, limits.all_threads, workers
    );
    (workers, drive_type)
}
