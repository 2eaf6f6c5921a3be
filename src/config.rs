//! Environment-based configuration and on-disk layout
//!
//! A host has two directories: the nginx log directory (read-only to this
//! crate) and the metrics directory, which holds every checkpoint and output
//! file the pipeline owns.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default name of the live, uncompressed access log.
pub const DEFAULT_LIVE_LOG: &str = "access.log";

/// Default read buffer capacity (100 MB).
pub const DEFAULT_BUFFER_BYTES: usize = 100_000_000;

/// Configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the live log and its rotated archives.
    pub log_dir: PathBuf,
    /// Directory holding checkpoints and outputs.
    pub metrics_dir: PathBuf,
    /// Exact file name of the live segment. Archives share it as a prefix.
    pub live_log_name: String,
    /// Capacity of the raw read buffer.
    pub read_buffer_bytes: usize,
    /// Capacity of each condensed output buffer.
    pub write_buffer_bytes: usize,
}

impl PipelineConfig {
    /// Build a config with default capacities.
    pub fn new(log_dir: impl Into<PathBuf>, metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            metrics_dir: metrics_dir.into(),
            live_log_name: DEFAULT_LIVE_LOG.to_string(),
            read_buffer_bytes: DEFAULT_BUFFER_BYTES,
            write_buffer_bytes: DEFAULT_BUFFER_BYTES,
        }
    }

    /// Resolve a config from the environment.
    ///
    /// Environment variables:
    /// - EDGEMETRICS_LOG_DIR: nginx log directory (required)
    /// - EDGEMETRICS_METRICS_DIR: metrics directory (required)
    /// - EDGEMETRICS_LIVE_LOG: live log file name (default: access.log)
    /// - EDGEMETRICS_BUFFER_BYTES: read/write buffer capacity (default: 100000000)
    pub fn from_env() -> Result<Self> {
        let log_dir = std::env::var("EDGEMETRICS_LOG_DIR")
            .map_err(|_| Error::Config("EDGEMETRICS_LOG_DIR is required".to_string()))?;
        let metrics_dir = std::env::var("EDGEMETRICS_METRICS_DIR")
            .map_err(|_| Error::Config("EDGEMETRICS_METRICS_DIR is required".to_string()))?;
        Self::resolve(
            log_dir,
            metrics_dir,
            std::env::var("EDGEMETRICS_LIVE_LOG").ok().as_deref(),
            std::env::var("EDGEMETRICS_BUFFER_BYTES").ok().as_deref(),
        )
    }

    /// Resolve a config from explicit values, falling back to defaults for
    /// anything not provided.
    pub fn resolve(
        log_dir: impl Into<PathBuf>,
        metrics_dir: impl Into<PathBuf>,
        live_log_name: Option<&str>,
        buffer_bytes: Option<&str>,
    ) -> Result<Self> {
        let mut config = Self::new(log_dir, metrics_dir);

        if let Some(name) = live_log_name.map(str::trim).filter(|s| !s.is_empty()) {
            config.live_log_name = name.to_string();
        }
        if let Some(raw) = buffer_bytes {
            let bytes = raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("buffer size must be a byte count, got '{raw}': {e}"))
            })?;
            config.read_buffer_bytes = bytes;
            config.write_buffer_bytes = bytes;
        }

        config.validate()?;
        info!(
            log_dir = %config.log_dir.display(),
            metrics_dir = %config.metrics_dir.display(),
            live_log = %config.live_log_name,
            read_buffer_bytes = config.read_buffer_bytes,
            "Resolved pipeline configuration"
        );
        Ok(config)
    }

    /// Check the capacity constraints the ingestion loop relies on.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_bytes == 0 {
            return Err(Error::Config("read buffer capacity must be non-zero".to_string()));
        }
        if self.write_buffer_bytes > self.read_buffer_bytes {
            return Err(Error::Config(format!(
                "write buffer ({}) must not exceed read buffer ({})",
                self.write_buffer_bytes, self.read_buffer_bytes
            )));
        }
        if self.live_log_name.contains(std::path::MAIN_SEPARATOR) {
            return Err(Error::Config(format!(
                "live log name '{}' must be a bare file name",
                self.live_log_name
            )));
        }
        Ok(())
    }

    /// File layout of the metrics directory.
    pub fn layout(&self) -> MetricsLayout {
        MetricsLayout::new(&self.metrics_dir)
    }
}

/// Names of every file the pipeline owns inside the metrics directory.
#[derive(Debug, Clone)]
pub struct MetricsLayout {
    root: PathBuf,
}

impl MetricsLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted decompressed lengths of scanned archives.
    pub fn length_index(&self) -> PathBuf {
        self.root.join("archiveOffsets.dat")
    }

    /// Persisted ingestion cursor.
    pub fn cursor(&self) -> PathBuf {
        self.root.join("bytesProcessed.txt")
    }

    /// Directory of per-day condensed records.
    pub fn days_dir(&self) -> PathBuf {
        self.root.join("days")
    }

    /// Append-only `identifier IP` log.
    pub fn upload_log(&self) -> PathBuf {
        self.root.join("uploadIPs.txt")
    }

    /// Blocked identifiers, one per line.
    pub fn evil_identifiers(&self) -> PathBuf {
        self.root.join("evilSkylinks.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config = PipelineConfig::resolve("/logs", "/metrics", None, None).unwrap();
        assert_eq!(config.live_log_name, DEFAULT_LIVE_LOG);
        assert_eq!(config.read_buffer_bytes, DEFAULT_BUFFER_BYTES);
        assert_eq!(config.layout().cursor(), PathBuf::from("/metrics/bytesProcessed.txt"));
    }

    #[test]
    fn test_resolve_overrides() {
        let config =
            PipelineConfig::resolve("/logs", "/metrics", Some("nginx.log"), Some("4096")).unwrap();
        assert_eq!(config.live_log_name, "nginx.log");
        assert_eq!(config.read_buffer_bytes, 4096);
        assert_eq!(config.write_buffer_bytes, 4096);
    }

    #[test]
    fn test_rejects_bad_buffer() {
        let err = PipelineConfig::resolve("/logs", "/metrics", None, Some("lots")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut config = PipelineConfig::new("/logs", "/metrics");
        config.write_buffer_bytes = config.read_buffer_bytes + 1;
        assert!(config.validate().is_err());
    }
}
