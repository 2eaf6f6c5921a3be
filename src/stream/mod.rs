//! Seekable logical stream over rotated nginx logs
//!
//! nginx rotates `access.log` into gzip archives that sort after it. This
//! module stitches the archives (oldest first) and the live log into one
//! logical byte sequence:
//! - Archives are decompressed on the fly and never rewritten
//! - Each archive's decompressed length is persisted the first time it is
//!   read to the end, so later seeks skip it without decompressing
//! - The live log is seeked directly since it is uncompressed

mod length_index;
mod segments;

pub use length_index::{FileLengthStore, LengthIndex, LengthStore, MemoryLengthStore};
pub use segments::LogDirectory;

use crate::ingest::telemetry;
use crate::{Error, Result};

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

/// Counters describing the work a stream has done since it was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Archives opened for decompression.
    pub archives_opened: u64,
    /// Archives whose length was newly appended to the index.
    pub archives_indexed: u64,
}

/// One logical byte stream over every archive followed by the live log.
pub struct ArchiveStream {
    directory: LogDirectory,
    index: LengthIndex,
    /// Logical offset of the next byte `read` returns.
    position: u64,
    /// Index of the current segment; `archives.len()` means the live log.
    segment: usize,
    /// Decompressed bytes already consumed from the current segment.
    segment_progress: u64,
    reader: Option<Box<dyn Read>>,
    stats: StreamStats,
}

impl ArchiveStream {
    /// Open the stream for `live_name` in `log_dir`, persisting archive
    /// lengths through `store`.
    pub fn open(log_dir: &Path, live_name: &str, store: Box<dyn LengthStore>) -> Result<Self> {
        let directory = LogDirectory::discover(log_dir, live_name)?;
        Self::with_directory(directory, store)
    }

    /// Open the stream over an already discovered directory.
    pub fn with_directory(directory: LogDirectory, store: Box<dyn LengthStore>) -> Result<Self> {
        let index = LengthIndex::open(store, directory.archives.len())?;
        info!(
            archives = directory.archives.len(),
            indexed_archives = index.len(),
            "Opened archive stream"
        );
        Ok(Self {
            directory,
            index,
            position: 0,
            segment: 0,
            segment_progress: 0,
            reader: None,
            stats: StreamStats::default(),
        })
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Work done since the stream was opened.
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Number of archives in the chain.
    pub fn archive_count(&self) -> usize {
        self.directory.archives.len()
    }

    /// Number of archives with a known length.
    pub fn indexed_count(&self) -> usize {
        self.index.len()
    }

    /// Position the stream at logical `offset`.
    ///
    /// Archives with a known length that end at or before `offset` are skipped
    /// without being opened. Anything unscanned on the way is decompressed
    /// and indexed.
    pub fn seek_absolute(&mut self, offset: u64) -> Result<()> {
        self.reader = None;
        self.position = 0;
        self.segment = 0;
        self.segment_progress = 0;

        while self.segment < self.directory.archives.len() {
            if let Some(length) = self.index.get(self.segment) {
                if self.position + length <= offset {
                    self.position += length;
                    self.segment += 1;
                    continue;
                }
            }

            let mut reader = self.open_archive_segment()?;
            let wanted = offset - self.position;
            let skipped = io::copy(&mut (&mut reader).take(wanted), &mut io::sink())?;
            self.position += skipped;
            self.segment_progress = skipped;

            if skipped == wanted {
                debug!(
                    offset,
                    segment = self.segment,
                    segment_offset = skipped,
                    "Positioned inside archive"
                );
                self.reader = Some(reader);
                return Ok(());
            }

            // Exhausted before the target: the archive is now fully scanned.
            self.finish_archive()?;
            self.segment += 1;
        }

        let live_offset = offset - self.position;
        self.reader = Some(segments::open_live(&self.directory.live, live_offset)?);
        self.segment_progress = live_offset;
        self.position = offset;
        debug!(offset, live_offset, "Positioned inside live log");
        Ok(())
    }

    fn open_archive_segment(&mut self) -> Result<Box<dyn Read>> {
        let path = &self.directory.archives[self.segment];
        debug!(segment = self.segment, path = %path.display(), "Decompressing archive");
        self.stats.archives_opened += 1;
        segments::open_archive(path)
    }

    /// Record the length of the current archive once it is exhausted.
    fn finish_archive(&mut self) -> Result<()> {
        if self.index.record(self.segment, self.segment_progress)? {
            self.stats.archives_indexed += 1;
            telemetry::record_archive_indexed(self.segment_progress);
            info!(
                segment = self.segment,
                path = %self.directory.archives[self.segment].display(),
                length = self.segment_progress,
                "Indexed archive length"
            );
        }
        Ok(())
    }

    /// Move to the segment after the current one, opened at its start.
    fn advance_segment(&mut self) -> Result<()> {
        self.finish_archive()?;
        self.segment += 1;
        self.segment_progress = 0;
        self.reader = Some(if self.segment < self.directory.archives.len() {
            self.open_archive_segment()?
        } else {
            segments::open_live(&self.directory.live, 0)?
        });
        Ok(())
    }

    /// Fill `buf` from the logical stream, crossing segment boundaries.
    ///
    /// Returns fewer bytes than requested only when the live log reaches its
    /// current end; `Ok(0)` is end-of-stream.
    pub fn read_logical(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.reader.is_none() {
            let position = self.position;
            self.seek_absolute(position)?;
        }

        let mut total = 0;
        while total < buf.len() {
            let n = match self.reader.as_mut() {
                Some(reader) => reader.read(&mut buf[total..]),
                None => return Err(Error::Config("archive stream has no open segment".into())),
            };
            let n = match n {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if self.segment >= self.directory.archives.len() {
                    break;
                }
                self.advance_segment()?;
                continue;
            }

            total += n;
            self.position += n as u64;
            self.segment_progress += n as u64;
        }
        Ok(total)
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_logical(buf).map_err(io::Error::from)
    }
}

impl Seek for ArchiveStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => {
                self.seek_absolute(offset)?;
                Ok(offset)
            }
            SeekFrom::Current(_) | SeekFrom::End(_) => Err(Error::UnsupportedSeek.into()),
        }
    }
}
