//! dcmdex CLI: extract DICOM header metadata into SQLite; re-runs skip files already stored.

use anyhow::Result;
use clap::Parser;
use dcmdex::engine::arg_parser::Cli;
use dcmdex::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
