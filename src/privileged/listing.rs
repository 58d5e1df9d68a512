//! Per-directory elevated listing (`sudo ls -la`), gated by a small concurrency semaphore.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::warn;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::credential::{CredentialCache, Elevation};
use crate::error::IndexError;

/// One entry parsed from a listing. Modification time is not recoverable from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: i64,
}

/// Lists a directory the walker could not read.
pub trait DirLister: Send + Sync {
    fn list_dir(&self, dir: &Path) -> Result<Vec<ListedEntry>>;
}

/// Parse `ls -la` output. Skips the `total` line, `.`/`..`, and entries that are neither
/// regular files, directories nor symlinks. Names with spaces are kept (fields 9.. joined).
pub fn parse_ls_output(text: &str) -> Vec<ListedEntry> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("total ") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        let (is_dir, is_symlink) = match fields[0].chars().next() {
            Some('d') => (true, false),
            Some('l') => (false, true),
            Some('-') => (false, false),
            _ => continue,
        };
        let mut name = fields[8..].join(" ");
        if is_symlink && let Some(i) = name.find(" -> ") {
            name.truncate(i);
        }
        if name == "." || name == ".." {
            continue;
        }
        out.push(ListedEntry {
            name,
            is_dir,
            is_symlink,
            size: fields[4].parse().unwrap_or(0),
        });
    }
    out
}

/// `sudo ls -la` lister. At most `concurrency` elevated subprocesses run at once.
pub struct ElevatedLister {
    cache: Arc<CredentialCache>,
    slots_tx: Sender<()>,
    slots_rx: Receiver<()>,
    warned: AtomicBool,
}

/// Frees a semaphore slot on drop.
struct Slot<'a>(&'a Receiver<()>);

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let _ = self.0.try_recv();
    }
}

impl ElevatedLister {
    pub fn new(cache: Arc<CredentialCache>, concurrency: usize) -> Self {
        let (slots_tx, slots_rx) = bounded(concurrency.max(1));
        Self {
            cache,
            slots_tx,
            slots_rx,
            warned: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> Slot<'_> {
        let _ = self.slots_tx.send(());
        Slot(&self.slots_rx)
    }
}

impl DirLister for ElevatedLister {
    fn list_dir(&self, dir: &Path) -> Result<Vec<ListedEntry>> {
        if !self.cache.is_set() {
            return Err(IndexError::ElevationFailed("no credential set".to_string()).into());
        }
        let _slot = self.acquire();
        let elevation = Elevation::new(&self.cache);
        let args: [&OsStr; 3] = ["-la".as_ref(), "--".as_ref(), dir.as_os_str()];
        let out = match elevation.run(OsStr::new("ls"), &args) {
            Ok(o) => o,
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!("elevated listing disabled for this build: {:#}", e);
                }
                return Err(e);
            }
        };
        if !out.status.success() {
            anyhow::bail!(
                "ls {} failed: {}",
                dir.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(parse_ls_output(&String::from_utf8_lossy(&out.stdout)))
    }
}
