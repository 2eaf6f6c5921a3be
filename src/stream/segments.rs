//! Log directory discovery and per-segment readers

use crate::{Error, Result};

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// The segments of one log directory, in logical order.
#[derive(Debug, Clone)]
pub struct LogDirectory {
    /// Live, uncompressed, append-only segment.
    pub live: PathBuf,
    /// Immutable gzip archives, in lexicographic (and therefore logical) order.
    pub archives: Vec<PathBuf>,
}

impl LogDirectory {
    /// Enumerate `log_dir` for the live log and its archives.
    ///
    /// Every file whose name starts with `live_name` belongs to the chain. The
    /// lexicographically first of them must be the live log itself.
    pub fn discover(log_dir: &Path, live_name: &str) -> Result<Self> {
        let entries = std::fs::read_dir(log_dir).map_err(|e| {
            Error::Config(format!(
                "unable to read log directory {}: {}",
                log_dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(live_name) {
                names.push(name);
            }
        }
        names.sort();

        match names.first() {
            Some(first) if first == live_name => {}
            Some(first) => {
                return Err(Error::Config(format!(
                    "log directory is not ordered correctly: first chain file is '{}', expected live log '{}'",
                    first, live_name
                )))
            }
            None => {
                return Err(Error::Config(format!(
                    "live log '{}' not found in {}",
                    live_name,
                    log_dir.display()
                )))
            }
        }

        Ok(Self {
            live: log_dir.join(live_name),
            archives: names[1..].iter().map(|name| log_dir.join(name)).collect(),
        })
    }
}

/// Open an archive for streaming decompression.
///
/// Multi-member gzip files are read as one continuous stream.
pub(crate) fn open_archive(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
}

/// Open the live log positioned at `offset`.
pub(crate) fn open_live(path: &Path, offset: u64) -> Result<Box<dyn Read>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(Box::new(file))
}
