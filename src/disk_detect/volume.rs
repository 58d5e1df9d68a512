//! Used bytes on the volume holding a path: the progress denominator for a build.

use std::path::Path;

/// Bytes in use on the volume containing `path`, or `None` if the platform cannot say.
/// Unix uses `statvfs` (`(f_blocks - f_bfree) * f_frsize`); elsewhere sysinfo's total - available.
pub fn volume_used_bytes(path: &Path) -> Option<u64> {
    statvfs_used(path).or_else(|| {
        super::with_disk_for_path(path, |d| d.total_space().saturating_sub(d.available_space()))
    })
}

#[cfg(unix)]
fn statvfs_used(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut st = MaybeUninit::<libc::statvfs>::uninit();
    if unsafe { libc::statvfs(c_path.as_ptr(), st.as_mut_ptr()) } != 0 {
        return None;
    }
    let st = unsafe { st.assume_init() };
    #[allow(clippy::unnecessary_cast)]
    let used = (st.f_blocks as u64).saturating_sub(st.f_bfree as u64) * st.f_frsize as u64;
    (used > 0).then_some(used)
}

#[cfg(not(unix))]
fn statvfs_used(_path: &Path) -> Option<u64> {
    None
}
