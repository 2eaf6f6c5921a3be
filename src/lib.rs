//! # edgemetrics
//!
//! Offline metrics pipeline for a fleet of content-serving hosts.
//!
//! Each host turns its nginx access logs into compact per-day records, and a
//! central job folds every host's daily series into fleet-wide totals.
//!
//! ## Pipeline
//!
//! - **Stream**: rotated gzip archives plus the live log read as one seekable
//!   byte sequence, with archive lengths persisted so they are decompressed
//!   end-to-end at most once
//! - **Ingest**: resumable, at-least-once condensing of log lines into day
//!   files and the upload log, checkpointed by a byte cursor
//! - **Stats**: day file to per-host counters and distinct client sets
//! - **Merge**: sorted merge of host series into fleet series, with monthly
//!   distinct counts and churn
//! - **Power** and **Banscan**: decayed popularity scores, and lookup of
//!   uploaders of blocked content
//!
//! Everything runs as single-threaded batch jobs against flat files. One run
//! per directory at a time is assumed; no file locking is done.

pub mod banscan;
pub mod config;
pub mod date;
pub mod ingest;
pub mod merge;
pub mod power;
pub mod stats;
pub mod stream;
pub mod telemetry;

mod error;

pub use config::{MetricsLayout, PipelineConfig};
pub use date::DateKey;
pub use error::{Error, Result};
pub use ingest::{run_pipeline, IngestSummary, LogIngester};
pub use stream::ArchiveStream;
