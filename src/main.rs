//! filecat CLI: index directory trees and search the catalog.

use anyhow::Result;
use clap::Parser;
use filecat::engine::arg_parser::Cli;
use filecat::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
