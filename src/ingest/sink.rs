//! Destinations for committed batches.

use crate::config::MetricsLayout;
use crate::date::DateKey;
use crate::Result;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Durable, append-only outputs of the ingestion run.
///
/// Both calls must have reached stable storage when they return `Ok`, since
/// the cursor is advanced right after.
pub trait BatchSink {
    /// Append `identifier IP` lines to the upload log.
    fn append_uploads(&mut self, records: &[u8]) -> Result<()>;

    /// Append condensed `IP method domain` lines to the file for `date`.
    fn append_day(&mut self, date: &DateKey, records: &[u8]) -> Result<()>;

    /// Where the records for `date` land, for diagnostics.
    fn describe_day(&self, date: &DateKey) -> String;
}

/// Sink writing into a metrics directory.
#[derive(Debug)]
pub struct FsBatchSink {
    days_dir: PathBuf,
    upload_log: PathBuf,
}

impl FsBatchSink {
    /// Create the sink, making sure the day directory exists.
    pub fn open(layout: &MetricsLayout) -> Result<Self> {
        let days_dir = layout.days_dir();
        std::fs::create_dir_all(&days_dir)?;
        Ok(Self {
            days_dir,
            upload_log: layout.upload_log(),
        })
    }

    pub fn day_path(&self, date: &DateKey) -> PathBuf {
        self.days_dir.join(date.as_str())
    }
}

fn append_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file: File = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(data)?;
    file.sync_data()?;
    Ok(())
}

impl BatchSink for FsBatchSink {
    fn append_uploads(&mut self, records: &[u8]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        append_synced(&self.upload_log, records)
    }

    fn append_day(&mut self, date: &DateKey, records: &[u8]) -> Result<()> {
        append_synced(&self.day_path(date), records)
    }

    fn describe_day(&self, date: &DateKey) -> String {
        self.day_path(date).display().to_string()
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryBatchSink {
    pub uploads: Vec<u8>,
    pub days: BTreeMap<DateKey, Vec<u8>>,
    /// Number of `append_day` calls.
    pub day_writes: usize,
}

impl MemoryBatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of the day file for `date`, empty if never written.
    pub fn day(&self, date: &str) -> &[u8] {
        date.parse::<DateKey>()
            .ok()
            .and_then(|key| self.days.get(&key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl BatchSink for MemoryBatchSink {
    fn append_uploads(&mut self, records: &[u8]) -> Result<()> {
        self.uploads.extend_from_slice(records);
        Ok(())
    }

    fn append_day(&mut self, date: &DateKey, records: &[u8]) -> Result<()> {
        self.days.entry(*date).or_default().extend_from_slice(records);
        self.day_writes += 1;
        Ok(())
    }

    fn describe_day(&self, date: &DateKey) -> String {
        format!("memory:days/{date}")
    }
}
