//! CLI entry: load `.env` and the settings file, build Opts, open the catalog, dispatch.

use anyhow::Result;
use log::debug;

use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::handlers;
use crate::utils::config::PackagePaths;
use crate::utils::settings::{SettingsFile, apply_settings_to_opts, load_settings};
use crate::utils::setup_logging;
use crate::{Indexer, Opts};

/// Opts from the settings file, then CLI flags on top.
fn setup_opts(cli: &Cli, settings: Option<&SettingsFile>) -> Opts {
    let mut opts = Opts::default();
    if let Some(file) = settings {
        apply_settings_to_opts(file, &mut opts);
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    if let Commands::Index {
        workers,
        helper,
        no_helper,
        ..
    } = &cli.command
    {
        if workers.is_some() {
            opts.num_workers = *workers;
        }
        if helper.is_some() {
            opts.helper_path = helper.clone();
        }
        opts.no_helper = no_helper.unwrap_or(false);
    }
    opts
}

pub fn handle_run(cli: &Cli) -> Result<()> {
    let _ = dotenvy::dotenv();
    let settings = load_settings(&PackagePaths::get().data_dir());
    let opts = setup_opts(cli, settings.as_ref());
    setup_logging(opts.verbose, PackagePaths::get().pkg_name());

    let db_path = cli.db_path(settings.as_ref().and_then(SettingsFile::db_path));
    debug!("catalog: {}", db_path.display());
    let indexer = Indexer::open(&db_path, opts)?;
    if let Some(file) = &settings
        && !file.exclude().is_empty()
    {
        handlers::merge_settings_exclusions(&indexer, file.exclude())?;
    }

    match &cli.command {
        Commands::Index { dir, sudo, .. } => {
            handlers::handle_index(&indexer, dir, sudo.unwrap_or(false))
        }
        Commands::Search {
            keyword,
            regex,
            offset,
            limit,
        } => handlers::handle_search(&indexer, keyword, *regex, *offset, *limit),
        Commands::Find {
            keyword,
            regex,
            ext,
            path,
            min_size,
            max_size,
        } => handlers::handle_find(
            &indexer,
            crate::SearchOptions {
                keyword: keyword.clone(),
                use_regex: *regex,
                extensions: ext.clone(),
                path_filter: path.clone(),
                min_size: *min_size,
                max_size: *max_size,
            },
        ),
        Commands::Roots => handlers::handle_roots(&indexer),
        Commands::Forget { root } => handlers::handle_forget(&indexer, root),
        Commands::Exclude { paths, clear } => handlers::handle_exclude(&indexer, paths, *clear),
        Commands::Stats => handlers::handle_stats(&indexer),
    }
}
