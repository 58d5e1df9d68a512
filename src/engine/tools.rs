//! Path, time and SQL LIKE helpers

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Catalog key for a path (lossy UTF-8; the catalog stores text).
pub fn path_to_db_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Escape LIKE metacharacters so `s` matches literally (use with `ESCAPE '\'`).
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `LIKE` pattern for everything strictly under `root`: `<root>/%`, with root escaped.
pub fn like_prefix_pattern(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    format!("{}/%", escape_like(trimmed))
}

/// True when `path` equals `prefix` or lies under it (component-aware: `/a/bc` is not under `/a/b`).
pub fn is_same_or_under(path: &str, prefix: &str) -> bool {
    let prefix = if prefix.len() > 1 {
        prefix.trim_end_matches('/')
    } else {
        prefix
    };
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Resolve a build root: absolute, symlinks resolved, must be a directory.
pub fn canonicalize_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("canonicalize {}", path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }
    Ok(root)
}

/// True if the process is running with effective uid 0 (e.g. via sudo).
#[cfg(unix)]
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

/// Human-readable byte count for logs and the CLI (`1.5 GiB`).
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.1} {}", UNITS[unit])
    }
}
