//! edgemetrics banfinder binary
//!
//! Prints the IP of every upload of a blocked content identifier.

use edgemetrics::banscan::{self, EvilElementSet};
use edgemetrics::config::{MetricsLayout, DEFAULT_BUFFER_BYTES};
use edgemetrics::telemetry::Telemetry;

use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

/// Find uploaders of blocked content
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics directory holding uploadIPs.txt and evilSkylinks.txt
    #[arg(env = "EDGEMETRICS_METRICS_DIR")]
    metrics_dir: PathBuf,

    /// Scan buffer capacity in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_BYTES)]
    buffer_bytes: usize,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("edgemetrics-banfinder", &args.log_level)?;

    let layout = MetricsLayout::new(&args.metrics_dir);
    let set = EvilElementSet::load(&layout.evil_identifiers())?;
    let upload_log = layout.upload_log();
    let uploads = File::open(&upload_log)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut write_error = None;
    let hits = banscan::scan(uploads, &upload_log.display().to_string(), &set, args.buffer_bytes, |ip| {
        if write_error.is_none() {
            if let Err(e) = out.write_all(ip).and_then(|_| out.write_all(b"\n")) {
                write_error = Some(e);
            }
        }
    })?;
    if let Some(e) = write_error {
        return Err(e.into());
    }
    out.flush()?;
    info!(hits, "Ban scan finished");
    Ok(())
}
