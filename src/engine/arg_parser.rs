use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
    pub const OFFSET: usize = 0;
    pub const LIMIT: usize = 50;
}

/// Local file catalog: index directory trees, then search them.
#[derive(Clone, Parser)]
#[command(name = "filecat")]
#[command(about = "Index directory trees into a local catalog and search it.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Catalog file. Default: `FILECAT_DB`, the settings file, then `~/.filecat/index.db`.
    #[arg(long, short, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose output (debug logs, progress bar while indexing).
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Build (or rebuild) the catalog for DIR.
    Index {
        /// Directory to index. Default: current directory.
        #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
        dir: PathBuf,

        /// Prompt for the sudo password (or read FILECAT_SUDO_PASSWORD) to read protected directories.
        #[arg(long, short = 's', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        sudo: Option<bool>,

        /// Directory worker count. Default: derived from drive type and the open-file limit.
        #[arg(long, short = 'w')]
        workers: Option<usize>,

        /// Path to the filecat-scan helper.
        #[arg(long)]
        helper: Option<PathBuf>,

        /// Never use the bulk helper, even with --sudo.
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        no_helper: Option<bool>,
    },

    /// Search names (wildcards `*` `?`), paths (terms with `/`) or a regex.
    Search {
        #[arg(value_name = "KEYWORD")]
        keyword: String,

        /// Treat KEYWORD as a regular expression (case-insensitive unless it starts with `(?-i)`).
        #[arg(long, short = 'r')]
        regex: bool,

        #[arg(long, default_value_t = DefaultArgs::OFFSET)]
        offset: usize,

        #[arg(long, short = 'n', default_value_t = DefaultArgs::LIMIT)]
        limit: usize,
    },

    /// Advanced search: keyword plus extension, path and size filters.
    Find {
        #[arg(value_name = "KEYWORD", default_value = "")]
        keyword: String,

        #[arg(long, short = 'r')]
        regex: bool,

        /// Allowed extensions: --ext rs toml  (dot optional).
        #[arg(long, short = 'e', num_args = 1..)]
        ext: Vec<String>,

        /// Substring the full path must contain.
        #[arg(long, short = 'p')]
        path: Option<String>,

        /// Minimum size in bytes (inclusive).
        #[arg(long)]
        min_size: Option<i64>,

        /// Maximum size in bytes (inclusive).
        #[arg(long)]
        max_size: Option<i64>,
    },

    /// List indexed roots.
    Roots,

    /// Forget an indexed root and delete its rows.
    Forget {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Show the exclusion list, or replace it with PATHS. `--clear` empties it.
    Exclude {
        #[arg(value_name = "PATHS")]
        paths: Vec<PathBuf>,

        #[arg(long)]
        clear: bool,
    },

    /// Catalog statistics.
    Stats,
}

impl Cli {
    /// Catalog path: flag, then `FILECAT_DB`, then `fallback` (settings file), then the default.
    pub fn db_path(&self, fallback: Option<PathBuf>) -> PathBuf {
        let paths = PackagePaths::get();
        self.db
            .clone()
            .or_else(|| std::env::var_os(paths.env_var("DB")).map(PathBuf::from))
            .or(fallback)
            .unwrap_or_else(|| paths.default_db_path())
    }
}
