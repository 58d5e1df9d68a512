const NETWORK_FS: &[&str] = &["nfs", "smb", "cifs", "afp", "webdav", "fuse.sshfs"];

/// Filesystem type names that mean network storage.
pub(crate) fn is_network_fs(fs_type: &str) -> bool {
    let fs = fs_type.to_lowercase();
    NETWORK_FS.iter().any(|n| fs.contains(n))
}

/// UNC-style mount points (`\\server\share`, `//server/share`).
pub(crate) fn is_network_mount(mount: &str) -> bool {
    mount.starts_with("\\\\") || mount.starts_with("//")
}
