//! edgemetrics join binary
//!
//! Folds one host's series into the fleet series.
//!
//! Usage:
//!   edgemetrics-join 2021.11.05 build/tmp/main build/joined/main
//!   edgemetrics-join --ips build/tmp/main build/joined/main

use edgemetrics::date::DateKey;
use edgemetrics::merge;
use edgemetrics::telemetry::Telemetry;

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Merge a host's series into the running fleet series
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Merge the unique IP series instead of the download/upload counters
    #[arg(long)]
    ips: bool,

    /// Watermark date (counters only) followed by source and destination directories
    #[arg(num_args = 2..=3, required = true)]
    paths: Vec<String>,

    /// Directory for chart snippets (defaults to the destination directory)
    #[arg(long, env = "EDGEMETRICS_GRAPH_DIR")]
    graph_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("edgemetrics-join", &args.log_level)?;

    if args.ips {
        let [src, dest] = args.paths.as_slice() else {
            bail!("--ips takes exactly <src> <dest>");
        };
        let (src, dest) = (PathBuf::from(src), PathBuf::from(dest));
        let graph_dir = args.graph_dir.unwrap_or_else(|| dest.clone());
        match merge::join_unique_files(&src, &dest, &graph_dir)
            .with_context(|| format!("unable to unique-join {} into {}", src.display(), dest.display()))?
        {
            Some(join) => info!(days = join.days, dest = %join.dest.display(), "Unique join finished"),
            None => info!(src = %src.display(), "Source has no unique series, nothing to do"),
        }
    } else {
        let [watermark, src, dest] = args.paths.as_slice() else {
            bail!("expected <watermark> <src> <dest>");
        };
        let watermark: DateKey = watermark
            .parse()
            .with_context(|| format!("watermark '{watermark}' is not a YYYY.MM.DD date"))?;
        let (src, dest) = (PathBuf::from(src), PathBuf::from(dest));
        let graph_dir = args.graph_dir.unwrap_or_else(|| dest.clone());
        let joins = merge::join_sum_files(&src, &dest, &watermark, &graph_dir)
            .with_context(|| format!("unable to join {} into {}", src.display(), dest.display()))?;
        for join in joins {
            info!(series = %join.name, days = join.days, dest = %join.dest.display(), "Join finished");
        }
    }
    Ok(())
}
