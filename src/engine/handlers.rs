//! Command handlers: one per subcommand.

use anyhow::Result;
use colored::Colorize;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::engine::progress::{create_progress_bar, finish_progress_bar, update_progress_bar};
use crate::engine::tools::{format_bytes, path_to_db_string, running_as_root};
use crate::error::IndexError;
use crate::utils::prompt_credential;
use crate::{BuildOutcome, IndexEvent, Indexer, Record, SearchOptions};

/// Settings-file exclusions are added to the persisted list (never removed from it).
pub fn merge_settings_exclusions(indexer: &Indexer, extra: &[String]) -> Result<()> {
    let mut list = indexer.get_excluded_paths();
    let before = list.len();
    for e in extra {
        if !list.contains(e) {
            list.push(e.clone());
        }
    }
    if list.len() != before {
        indexer.set_excluded_paths(&list)?;
    }
    Ok(())
}

/// Build the catalog for `dir`. Ctrl+C requests a cooperative stop.
pub fn handle_index(indexer: &Indexer, dir: &Path, sudo: bool) -> Result<()> {
    if sudo && !running_as_root() {
        indexer.set_privileged_credential(&prompt_credential()?);
    }

    let stop = indexer.stop_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n{}", "Stopping after the current batch...".yellow());
        stop.store(true, Ordering::Release);
    }) {
        warn!("Ctrl+C handler not installed: {}", e);
    }

    let bar = indexer.opts().verbose.then(|| create_progress_bar("Indexing"));
    if let Some(bar) = &bar {
        let bar = Arc::clone(bar);
        indexer.set_event_callback(Some(Arc::new(move |ev: &IndexEvent| match ev {
            IndexEvent::Progress(s) => update_progress_bar(&bar, s),
            IndexEvent::Fallback { from, to, reason } => {
                warn!("{} -> {}: {}", from, to, reason)
            }
            _ => {}
        })));
    }

    let outcome = indexer.build_index(dir);
    if let Some(bar) = &bar
        && matches!(outcome, Ok(BuildOutcome::Completed(_)))
    {
        finish_progress_bar(bar);
    }
    match outcome {
        Ok(BuildOutcome::Completed(s)) => {
            println!(
                "{} {} files, {} dirs, {} on disk in {:.2}s",
                "Indexed".green().bold(),
                s.file_count,
                s.dir_count,
                format_bytes(s.disk_usage),
                s.elapsed.as_secs_f64()
            );
            if s.skipped > 0 {
                println!("{} unreadable entries skipped", s.skipped.to_string().yellow());
            }
        }
        Ok(BuildOutcome::Stopped) => {
            println!("{}", "Stopped; partial catalog kept.".yellow());
        }
        Err(e) if IndexError::is(&e, |k| matches!(k, IndexError::ElevationFailed(_))) => {
            eprintln!("{} {:#}", "Wrong sudo password:".red().bold(), e);
            return Err(e);
        }
        Err(e) => return Err(e),
    }
    // Let the post-build checkpoint finish before the process exits.
    indexer.flush_maintenance();
    Ok(())
}

fn print_records(records: &[Record]) {
    for r in records {
        if r.is_dir {
            println!("{}/", r.path.blue().bold());
        } else {
            println!("{}  {}", r.path, format_bytes(r.size.max(0) as u64).dimmed());
        }
    }
}

pub fn handle_search(
    indexer: &Indexer,
    keyword: &str,
    regex: bool,
    offset: usize,
    limit: usize,
) -> Result<()> {
    let records = indexer.search(keyword, regex, offset, limit)?;
    print_records(&records);
    info!("{} results", records.len());
    Ok(())
}

pub fn handle_find(indexer: &Indexer, opts: SearchOptions) -> Result<()> {
    let records = indexer.search_advanced(&opts)?;
    print_records(&records);
    info!("{} results", records.len());
    Ok(())
}

pub fn handle_roots(indexer: &Indexer) -> Result<()> {
    let roots = indexer.list_indexed_roots()?;
    if roots.is_empty() {
        println!("No indexed roots.");
    }
    for r in roots {
        println!(
            "{}  {} files, {} dirs",
            r.path.cyan(),
            r.file_count,
            r.dir_count
        );
    }
    Ok(())
}

/// Forget a root. The path need not exist any more; it is matched as given (and canonicalized
/// when it still exists).
pub fn handle_forget(indexer: &Indexer, root: &Path) -> Result<()> {
    let key = root
        .canonicalize()
        .map(|p| path_to_db_string(&p))
        .unwrap_or_else(|_| path_to_db_string(root));
    if indexer.delete_indexed_root(&key)? {
        println!("{} {}", "Forgot".green().bold(), key);
    } else {
        println!("{} was not an indexed root", key.yellow());
    }
    indexer.flush_maintenance();
    Ok(())
}

pub fn handle_exclude(indexer: &Indexer, paths: &[PathBuf], clear: bool) -> Result<()> {
    if clear {
        indexer.set_excluded_paths::<String>(&[])?;
    } else if !paths.is_empty() {
        let list: Vec<String> = paths.iter().map(|p| path_to_db_string(p)).collect();
        indexer.set_excluded_paths(&list)?;
    }
    let list = indexer.get_excluded_paths();
    if list.is_empty() {
        println!("No exclusions.");
    }
    for p in list {
        println!("{}", p);
    }
    Ok(())
}

pub fn handle_stats(indexer: &Indexer) -> Result<()> {
    let s = indexer.stats()?;
    let last = indexer.index_path()?;
    println!("{} {}", "Files:".bold(), s.file_count);
    println!("{} {}", "Dirs: ".bold(), s.dir_count);
    println!("{} {}s", "Last scan:".bold(), s.scan_time);
    if !last.is_empty() {
        println!("{} {}", "Last root:".bold(), last);
    }
    Ok(())
}
