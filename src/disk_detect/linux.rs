//! Linux fallback when sysinfo cannot tell SSD from HDD.

use super::DriveType;
use sysinfo::Disk;

/// Read /sys/block/{device}/queue/rotational: 1 = spinning disk, 0 = solid state.
pub(super) fn rotational(disk: &Disk) -> Option<DriveType> {
    let name = disk.name().to_str()?;
    let dev = name.strip_prefix("/dev/")?;
    // sda1 -> sda, nvme0n1p1 -> nvme0n1, mmcblk0p2 -> mmcblk0
    let base = if dev.starts_with("nvme") || dev.starts_with("mmcblk") {
        dev.rfind('p').map_or(dev, |i| &dev[..i])
    } else {
        dev.trim_end_matches(|c: char| c.is_ascii_digit())
    };
    let flag = std::fs::read_to_string(format!("/sys/block/{base}/queue/rotational")).ok()?;
    Some(match flag.trim() {
        "1" => DriveType::HDD,
        _ => DriveType::SSD,
    })
}
