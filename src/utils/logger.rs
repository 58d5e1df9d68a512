use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Install the process-wide logger for the binaries. The library itself never calls this.
///
/// `verbose` lowers our own crate to `Debug`; dependencies stay at `Warn` unless `RUST_LOG` says otherwise.
/// `tag` distinguishes the CLI from the scan helper in interleaved output.
pub fn setup_logging(verbose: bool, tag: &'static str) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(move |buf, record| {
            let ts = buf.timestamp_seconds();
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = if record.level() == Level::Warn {
                        "WARN".yellow()
                    } else {
                        "ERROR".red()
                    };
                    format!(
                        "[{} {} {} {}] {}",
                        tag.cyan(),
                        ts,
                        level_str,
                        record.target().white(),
                        record.args()
                    )
                }
                Level::Debug | Level::Trace => {
                    format!("[{} {}] {}", tag.cyan(), ts, record.args().to_string().dimmed())
                }
                Level::Info => format!("[{} {}] {}", tag.cyan(), ts, record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
