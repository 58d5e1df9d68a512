//! Load `.filecat.toml` from the data directory (CLI only). The library takes everything through
//! [`Opts`](crate::Opts) and the catalog's `config` table.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    db_path: Option<String>,
    exclude: Option<Vec<String>>,
    verbose: Option<bool>,
    workers: Option<usize>,
    helper_path: Option<String>,
}

impl SettingsFile {
    /// Parse settings from TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Catalog path override, if any.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.settings.db_path.as_ref().map(PathBuf::from)
    }

    /// Extra exclusion paths from the file (merged with the persisted list at startup).
    pub fn exclude(&self) -> &[String] {
        self.settings.exclude.as_deref().unwrap_or(&[])
    }

    pub fn verbose(&self) -> Option<bool> {
        self.settings.verbose
    }
}

/// Load the settings file from `dir` if present. Returns None if missing or unreadable.
pub fn load_settings(dir: &Path) -> Option<SettingsFile> {
    let path = dir.join(PackagePaths::get().settings_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    SettingsFile::parse(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$opts_field = Some(v.into());
        }
    };
}

/// Apply file settings to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_settings_to_opts(file: &SettingsFile, opts: &mut Opts) {
    let s = &file.settings;
    apply_file_opt!(s, opts, workers => num_workers);
    apply_file_opt!(s, opts, helper_path => helper_path);
    if let Some(v) = s.verbose {
        opts.verbose = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_settings() {
        let file = SettingsFile::parse(
            r#"
            [settings]
            workers = 12
            exclude = ["/Volumes/Backup"]
            "#,
        )
        .unwrap();
        let mut opts = Opts::default();
        apply_settings_to_opts(&file, &mut opts);
        assert_eq!(opts.num_workers, Some(12));
        assert_eq!(opts.helper_path, None);
        assert_eq!(file.exclude(), ["/Volumes/Backup".to_string()]);
        assert!(file.db_path().is_none());
    }
}
