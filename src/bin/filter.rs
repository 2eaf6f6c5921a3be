//! edgemetrics filter binary
//!
//! Condenses new access-log lines of one host into day files and the upload
//! log, resuming from the persisted cursor.

use edgemetrics::config::PipelineConfig;
use edgemetrics::telemetry::Telemetry;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Condense nginx access logs into per-day records
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the live access log and its rotated archives
    #[arg(env = "EDGEMETRICS_LOG_DIR")]
    log_dir: PathBuf,

    /// Metrics directory for checkpoints and outputs
    #[arg(env = "EDGEMETRICS_METRICS_DIR")]
    metrics_dir: PathBuf,

    /// File name of the live log; archives share it as a prefix
    #[arg(long, env = "EDGEMETRICS_LIVE_LOG")]
    live_log: Option<String>,

    /// Read and write buffer capacity in bytes
    #[arg(long, env = "EDGEMETRICS_BUFFER_BYTES")]
    buffer_bytes: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("edgemetrics-filter", &args.log_level)?;

    let config = PipelineConfig::resolve(
        &args.log_dir,
        &args.metrics_dir,
        args.live_log.as_deref(),
        args.buffer_bytes.as_deref(),
    )?;

    let summary = edgemetrics::run_pipeline(&config)?;
    info!(
        start_offset = summary.start_offset,
        end_offset = summary.end_offset,
        lines = summary.lines,
        days = summary.days.len(),
        "Filter run finished"
    );
    Ok(())
}
