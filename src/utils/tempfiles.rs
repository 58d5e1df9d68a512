use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

/// Scratch files written by the bulk scan helper for one build.
#[derive(Debug)]
pub struct HelperScratch {
    pub output: PathBuf,
    pub progress: PathBuf,
}

impl HelperScratch {
    /// Unique paths under the system temp dir (pid + nanos so concurrent processes never collide).
    pub fn new() -> Self {
        Self::in_dir(&std::env::temp_dir())
    }

    pub fn in_dir(dir: &Path) -> Self {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let base = format!(
            "{}-{}-{}",
            PackagePaths::get().pkg_name(),
            std::process::id(),
            stamp
        );
        Self {
            output: dir.join(format!("{base}.ndjson")),
            progress: dir.join(format!("{base}.progress")),
        }
    }

    /// Remove both files, ignoring missing ones. The helper runs elevated, so removal may fail;
    /// that only leaves litter in the temp dir.
    pub fn remove(&self) {
        for p in [&self.output, &self.progress] {
            if let Err(e) = std::fs::remove_file(p)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log::debug!("could not remove {}: {}", p.display(), e);
            }
        }
    }
}

impl Default for HelperScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HelperScratch {
    fn drop(&mut self) {
        self.remove();
    }
}
