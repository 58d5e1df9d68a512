//! filecat-scan: full-tree scan helper. Runs elevated, walks one root with the same walker the
//! library uses, writes one JSON record per line to --output and a progress snapshot to
//! --progress-file every tick.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use filecat::disk_detect::{volume_used_bytes, workers_for_path};
use filecat::engine::progress::disk_percent;
use filecat::engine::tools::{canonicalize_root, path_to_db_string};
use filecat::pipeline::{ExcludeRules, FileFilter, WalkConfig, WalkReport, start_walk};
use filecat::privileged::HelperProgress;
use filecat::utils::config::{ChannelCaps, ProgressConsts};
use filecat::utils::setup_logging;

#[derive(Parser)]
#[command(name = "filecat-scan")]
#[command(about = "Walk a tree and write every entry as NDJSON (used by filecat for elevated scans).")]
struct Args {
    /// Root directory to scan.
    #[arg(long)]
    path: PathBuf,

    /// NDJSON output file.
    #[arg(long)]
    output: PathBuf,

    /// Progress snapshot file, rewritten every tick.
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Paths to skip (comma separated or repeated).
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Skip files smaller than this (100M, 1.5G, 1024; 0 = no bound).
    #[arg(long, default_value = "0")]
    min_size: String,

    /// Skip files larger than this (0 = no bound).
    #[arg(long, default_value = "0")]
    max_size: String,

    /// Only files with these extensions (".txt" or "txt", comma separated).
    #[arg(long, value_delimiter = ',')]
    include_ext: Vec<String>,

    /// Skip files with these extensions.
    #[arg(long, value_delimiter = ',')]
    exclude_ext: Vec<String>,

    /// Only files whose name matches this regex.
    #[arg(long)]
    name: Option<String>,

    /// Directory worker count.
    #[arg(long)]
    workers: Option<usize>,

    /// Also print unreadable-entry and open-file-limit counts in the summary.
    #[arg(long)]
    errors: bool,

    #[arg(long, short = 'v')]
    verbose: bool,
}

struct Counts {
    files: u64,
    dirs: u64,
    disk: u64,
}

fn write_progress(path: &Path, start: Instant, c: &Counts, total_disk: u64, errors: u64, done: bool) {
    let percentage = if done {
        100.0
    } else {
        disk_percent(c.disk, total_disk).min(ProgressConsts::RUNNING_CAP)
    };
    let p = HelperProgress {
        elapsed: start.elapsed().as_secs_f64(),
        dir_count: c.dirs,
        file_count: c.files,
        total_disk,
        disk_used_size: c.disk,
        percentage,
        error_count: errors,
    };
    match serde_json::to_string(&p) {
        Ok(line) => {
            if let Err(e) = std::fs::write(path, line + "\n") {
                debug!("progress write {}: {}", path.display(), e);
            }
        }
        Err(e) => debug!("progress encode: {}", e),
    }
}

/// End-of-scan counters on stderr; stdout is left to callers that capture it.
fn print_summary(report: &WalkReport, errors: bool) {
    let lines = [
        ("symlinks skipped", report.symlinks),
        ("hardlinks deduplicated", report.hardlinks),
        ("sparse files", report.sparse),
        ("duplicate directories", report.duplicate_dirs),
        ("excluded entries", report.excluded),
    ];
    for (label, n) in lines.into_iter().filter(|(_, n)| *n > 0) {
        eprintln!("{label}: {n}");
    }
    if errors || report.exhausted > 0 {
        eprintln!(
            "unreadable entries: {}, open-file-limit hits: {}",
            report.skipped, report.exhausted
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose, "filecat-scan");
    let start = Instant::now();

    let filter = FileFilter::new(
        &args.min_size,
        &args.max_size,
        &args.include_ext,
        &args.exclude_ext,
        args.name.as_deref(),
    )?;
    let root = canonicalize_root(&args.path)?;
    let (workers, drive_type) = workers_for_path(&root, args.workers);
    let total_disk = volume_used_bytes(&root).unwrap_or(0);
    debug!("{} workers on {:?}", workers, drive_type);

    let file = File::create(&args.output)
        .with_context(|| format!("create {}", args.output.display()))?;
    let mut out = BufWriter::with_capacity(1 << 20, file);
    writeln!(out, "# filecat-scan {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "# root: {}", path_to_db_string(&root))?;

    let walk = start_walk(
        &root,
        WalkConfig {
            workers,
            dir_queue_cap: workers * ChannelCaps::DIR_QUEUE_PER_WORKER,
            record_cap: ChannelCaps::RECORDS,
            rules: ExcludeRules::new(&args.exclude),
            filter,
            stop: Arc::new(AtomicBool::new(false)),
            lister: None,
        },
    );

    let tick = Duration::from_millis(ProgressConsts::TICK_MS);
    let mut counts = Counts {
        files: 0,
        dirs: 0,
        disk: 0,
    };
    let mut last_tick = Instant::now();
    loop {
        match walk.records.recv_timeout(tick) {
            Ok(rec) => {
                if rec.is_dir {
                    counts.dirs += 1;
                } else {
                    counts.files += 1;
                }
                counts.disk += rec.disk_usage.max(0) as u64;
                serde_json::to_writer(&mut out, &rec).context("encode record")?;
                out.write_all(b"\n").context("write record")?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_tick.elapsed() >= tick {
            if let Some(p) = &args.progress_file {
                write_progress(p, start, &counts, total_disk, 0, false);
            }
            last_tick = Instant::now();
        }
    }
    out.flush().context("flush output")?;
    let report = walk.join();

    if let Some(p) = &args.progress_file {
        write_progress(p, start, &counts, total_disk, report.skipped, true);
    }
    print_summary(&report, args.errors);
    info!(
        "{} files, {} dirs in {:.2}s",
        counts.files,
        counts.dirs,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
