//! edgemetrics power binary
//!
//! Prints the decayed popularity score of a download or upload series.

use edgemetrics::date::DateKey;
use edgemetrics::merge::SumSeries;
use edgemetrics::power::{popularity, Decay};
use edgemetrics::telemetry::Telemetry;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Metric {
    Downloads,
    Uploads,
}

impl Metric {
    fn file_name(self) -> &'static str {
        match self {
            Metric::Downloads => "downloads.txt",
            Metric::Uploads => "uploads.txt",
        }
    }
}

/// Decayed popularity of a series
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Date to decay the score to (YYYY.MM.DD)
    as_of: String,

    /// Directory holding downloads.txt and uploads.txt
    data_dir: PathBuf,

    /// Which series to score
    #[arg(value_enum)]
    metric: Metric,

    /// Half-life in days: 0 (no decay), 1, 7, 30 or 90
    decay: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("edgemetrics-power", &args.log_level)?;

    let as_of: DateKey = args.as_of.parse()?;
    let decay: Decay = args.decay.parse()?;
    let series = SumSeries::load(&args.data_dir.join(args.metric.file_name()), false)?;
    println!("{}", popularity(&series, decay, as_of)?);
    Ok(())
}
