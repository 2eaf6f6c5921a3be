//! Persistent decompressed lengths of scanned archives.
//!
//! The on-disk form is a bare sequence of little-endian `u64`, one per
//! archive, in archive order. Entries are only ever appended.

use crate::{Error, Result};

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ENTRY_LEN: usize = 8;

/// Backing storage for a [`LengthIndex`].
pub trait LengthStore {
    /// Load every persisted length, in archive order.
    fn load(&mut self) -> Result<Vec<u64>>;

    /// Durably append one length.
    fn append(&mut self, length: u64) -> Result<()>;
}

/// Length store backed by an append-only file.
#[derive(Debug)]
pub struct FileLengthStore {
    path: PathBuf,
    file: File,
}

impl FileLengthStore {
    /// Open or create the index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LengthStore for FileLengthStore {
    fn load(&mut self) -> Result<Vec<u64>> {
        let mut data = Vec::new();
        self.file.read_to_end(&mut data)?;

        let whole = data.len() / ENTRY_LEN * ENTRY_LEN;
        if whole != data.len() {
            // A crash mid-append leaves a torn entry. Drop it so the next
            // append lands on an entry boundary.
            warn!(
                path = %self.path.display(),
                torn_bytes = data.len() - whole,
                "Discarding torn trailing entry in length index"
            );
            self.file.set_len(whole as u64)?;
        }

        Ok(data[..whole]
            .chunks_exact(ENTRY_LEN)
            .map(|chunk| {
                let mut raw = [0u8; ENTRY_LEN];
                raw.copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect())
    }

    fn append(&mut self, length: u64) -> Result<()> {
        self.file.write_all(&length.to_le_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// In-memory length store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryLengthStore {
    lengths: Vec<u64>,
}

impl MemoryLengthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lengths(lengths: Vec<u64>) -> Self {
        Self { lengths }
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }
}

impl LengthStore for MemoryLengthStore {
    fn load(&mut self) -> Result<Vec<u64>> {
        Ok(self.lengths.clone())
    }

    fn append(&mut self, length: u64) -> Result<()> {
        self.lengths.push(length);
        Ok(())
    }
}

/// Ordered decompressed lengths for the leading archives of a log directory.
///
/// The index may be shorter than the archive list; trailing archives are
/// unscanned and get their length recorded the first time they are read to
/// the end.
pub struct LengthIndex {
    lengths: Vec<u64>,
    store: Box<dyn LengthStore>,
}

impl LengthIndex {
    /// Load the index and check it against the number of archives present.
    pub fn open(mut store: Box<dyn LengthStore>, archive_count: usize) -> Result<Self> {
        let lengths = store.load()?;
        if lengths.len() > archive_count {
            return Err(Error::Config(format!(
                "length index lists {} archives but only {} are present",
                lengths.len(),
                archive_count
            )));
        }
        debug!(
            indexed = lengths.len(),
            archives = archive_count,
            "Loaded archive length index"
        );
        Ok(Self { lengths, store })
    }

    /// Decompressed length of archive `segment`, if it has been scanned.
    pub fn get(&self, segment: usize) -> Option<u64> {
        self.lengths.get(segment).copied()
    }

    /// Number of indexed archives.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Sum of every indexed length.
    pub fn total(&self) -> u64 {
        self.lengths.iter().sum()
    }

    /// Record the scanned length of archive `segment`.
    ///
    /// Returns `true` if a new entry was persisted. Re-recording a known
    /// archive only checks that its length did not change.
    pub fn record(&mut self, segment: usize, length: u64) -> Result<bool> {
        match segment.cmp(&self.lengths.len()) {
            std::cmp::Ordering::Less => {
                let known = self.lengths[segment];
                if known != length {
                    return Err(Error::Config(format!(
                        "archive {} was indexed at {} bytes but now decompresses to {} bytes",
                        segment, known, length
                    )));
                }
                Ok(false)
            }
            std::cmp::Ordering::Equal => {
                self.store.append(length)?;
                self.lengths.push(length);
                Ok(true)
            }
            std::cmp::Ordering::Greater => Err(Error::Config(format!(
                "archive {} finished before archive {} was indexed",
                segment,
                self.lengths.len()
            ))),
        }
    }
}
