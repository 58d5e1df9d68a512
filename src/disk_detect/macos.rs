//! macOS: SMB/NFS/AFP mounts often do not show up in sysinfo, so ask statfs directly.

use super::network::is_network_fs;
use log::debug;
use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::path::Path;

pub(super) fn statfs_is_network(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.to_string_lossy().as_bytes()) else {
        return false;
    };
    let mut stat = MaybeUninit::<libc::statfs>::uninit();
    if unsafe { libc::statfs(c_path.as_ptr(), stat.as_mut_ptr()) } != 0 {
        return false;
    }
    let stat = unsafe { stat.assume_init() };
    let fs_type = unsafe { CStr::from_ptr(stat.f_fstypename.as_ptr()) }.to_string_lossy();
    debug!("statfs: path={}, fs_type={}", path.display(), fs_type);
    is_network_fs(&fs_type)
}
