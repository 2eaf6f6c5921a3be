//! Persisted ingestion cursor
//!
//! The cursor is the logical offset up to which output has been durably
//! committed. It only moves forward and is written after the data it covers.

use crate::{Error, Result};

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for the ingestion cursor.
pub trait ProgressStore {
    /// Last committed offset, `0` if nothing was ever committed.
    fn load(&mut self) -> Result<u64>;

    /// Durably record that everything before `offset` is committed.
    fn advance(&mut self, offset: u64) -> Result<()>;
}

/// Cursor stored as a decimal number with a trailing newline.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, offset: u64) -> io::Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp)?;
        writeln!(file, "{offset}")?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&mut self) -> Result<u64> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Error::parse(
                    self.path.display().to_string(),
                    format!("cursor is not a byte offset ('{}'): {}", raw.trim(), e),
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn advance(&mut self, offset: u64) -> Result<()> {
        self.write_atomic(offset)
            .map_err(|source| Error::Checkpoint {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), offset, "Persisted ingestion cursor");
        Ok(())
    }
}

/// In-memory cursor for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryProgressStore {
    offset: u64,
    history: Vec<u64>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(offset: u64) -> Self {
        Self {
            offset,
            history: Vec::new(),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Every offset passed to `advance`, in order.
    pub fn history(&self) -> &[u64] {
        &self.history
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&mut self) -> Result<u64> {
        Ok(self.offset)
    }

    fn advance(&mut self, offset: u64) -> Result<()> {
        self.offset = offset;
        self.history.push(offset);
        Ok(())
    }
}
