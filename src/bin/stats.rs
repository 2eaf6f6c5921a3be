//! edgemetrics stats binary
//!
//! Appends one day file's counters and client sets to a host's series.

use edgemetrics::stats::DayStats;
use edgemetrics::telemetry::Telemetry;

use clap::Parser;
use std::path::PathBuf;

/// Build per-host daily series from a day file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Day file named YYYY.MM.DD
    day_file: PathBuf,

    /// Root of the host's series (`main/` and `apps/<domain>/` go below it)
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("edgemetrics-stats", &args.log_level)?;

    let stats = DayStats::from_day_file(&args.day_file)?;
    stats.write_series(&args.out)?;
    Ok(())
}
