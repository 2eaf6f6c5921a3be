//! Resumable log ingestion
//!
//! Reads the logical log stream from the persisted cursor, condenses every
//! line into `IP method domain`, and appends the result to one file per day.
//! Upload lines also produce an `identifier IP` record.
//!
//! # Commit order
//!
//! Each batch covers consecutive lines of a single day and is committed as:
//! 1. upload records (duplicates are harmless downstream)
//! 2. day records
//! 3. the cursor
//!
//! A crash between steps 2 and 3 replays the batch on the next run, so the
//! day file can hold at most one duplicated batch. Nothing is ever lost.

mod cursor;
mod record;
mod sink;
pub mod telemetry;
mod tokenizer;

pub use cursor::{FileProgressStore, MemoryProgressStore, ProgressStore};
pub use record::{content_id, AccessRecord, CONTENT_ID_LEN};
pub use sink::{BatchSink, FsBatchSink, MemoryBatchSink};
pub use tokenizer::{Fields, LineTokenizer};

use crate::config::PipelineConfig;
use crate::date::DateKey;
use crate::stream::{ArchiveStream, FileLengthStore};
use crate::{Error, Result};

use std::io::{self, Read, Seek, SeekFrom};
use std::time::Instant;
use tracing::{debug, error, info};

/// Minimum number of complete lines needed before a batch is cut.
const MIN_COMPLETE_LINES: usize = 2;

/// Why a batch ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchBoundary {
    /// The next line belongs to another day.
    DateChange,
    /// No more complete lines in the read buffer.
    BufferEnd,
    /// The next line would overflow an output buffer.
    WriteCapacity,
}

impl BatchBoundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchBoundary::DateChange => "date_change",
            BatchBoundary::BufferEnd => "buffer_end",
            BatchBoundary::WriteCapacity => "write_capacity",
        }
    }
}

/// One cut batch, with its condensed output sitting in the ingester buffers.
#[derive(Debug, Clone, Copy)]
struct Batch {
    date: DateKey,
    /// Raw bytes covered, trailing newline of the last line included.
    consumed: usize,
    lines: u64,
    uploads: u64,
    missing_ids: u64,
    boundary: BatchBoundary,
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Cursor at the start of the run.
    pub start_offset: u64,
    /// Cursor at the end of the run.
    pub end_offset: u64,
    pub batches: u64,
    pub lines: u64,
    pub upload_records: u64,
    /// Days that received records, in the order they were first written.
    pub days: Vec<DateKey>,
    /// Complete lines left for the next run.
    pub deferred_lines: u64,
}

impl IngestSummary {
    fn note_day(&mut self, date: DateKey) {
        if self.days.last() != Some(&date) && !self.days.contains(&date) {
            self.days.push(date);
        }
    }
}

/// Drives one ingestion run over a seekable log stream.
pub struct LogIngester<S: BatchSink, P: ProgressStore> {
    sink: S,
    progress: P,
    read_capacity: usize,
    write_capacity: usize,
}

impl LogIngester<FsBatchSink, FileProgressStore> {
    /// Ingester writing into the metrics directory named by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        Self::new(
            FsBatchSink::open(&layout)?,
            FileProgressStore::new(layout.cursor()),
            config.read_buffer_bytes,
            config.write_buffer_bytes,
        )
    }
}

impl<S: BatchSink, P: ProgressStore> LogIngester<S, P> {
    pub fn new(sink: S, progress: P, read_capacity: usize, write_capacity: usize) -> Result<Self> {
        if read_capacity == 0 || write_capacity == 0 {
            return Err(Error::Config(
                "ingestion buffer capacities must be non-zero".to_string(),
            ));
        }
        if write_capacity > read_capacity {
            return Err(Error::Config(format!(
                "write capacity ({write_capacity}) must not exceed read capacity ({read_capacity})"
            )));
        }
        Ok(Self {
            sink,
            progress,
            read_capacity,
            write_capacity,
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn into_parts(self) -> (S, P) {
        (self.sink, self.progress)
    }

    /// Ingest everything between the persisted cursor and the end of `stream`.
    pub fn run<R: Read + Seek>(&mut self, stream: &mut R) -> Result<IngestSummary> {
        let started = Instant::now();
        let mut committed = self.progress.load()?;
        stream.seek(SeekFrom::Start(committed))?;
        info!(offset = committed, "Resuming ingestion");

        let mut summary = IngestSummary {
            start_offset: committed,
            end_offset: committed,
            ..IngestSummary::default()
        };

        let mut read_buf = vec![0u8; self.read_capacity];
        let mut filled = 0usize;
        let mut day_buf = Vec::with_capacity(self.write_capacity.min(1 << 20));
        let mut upload_buf = Vec::with_capacity(self.write_capacity.min(1 << 20));
        let mut tokenizer = LineTokenizer::new();
        let mut eof = false;

        loop {
            if !eof && filled < read_buf.len() {
                let n = read_retrying(stream, &mut read_buf[filled..])?;
                if n == 0 {
                    eof = true;
                }
                filled += n;
            }

            while let Some(batch) = cut_batch(
                &read_buf[..filled],
                committed,
                self.write_capacity,
                &mut tokenizer,
                &mut day_buf,
                &mut upload_buf,
            )? {
                committed = self.commit(&batch, committed, &day_buf, &upload_buf)?;
                read_buf.copy_within(batch.consumed..filled, 0);
                filled -= batch.consumed;

                summary.batches += 1;
                summary.lines += batch.lines;
                summary.upload_records += batch.uploads;
                summary.note_day(batch.date);
            }

            if eof {
                break;
            }
            if filled == read_buf.len() {
                return Err(Error::Config(format!(
                    "read buffer of {} bytes holds fewer than {} complete lines at offset {}",
                    read_buf.len(),
                    MIN_COMPLETE_LINES,
                    committed
                )));
            }
        }

        summary.deferred_lines = count_complete_lines(&read_buf[..filled]) as u64;
        summary.end_offset = committed;
        telemetry::record_lines_deferred(summary.deferred_lines);
        info!(
            start_offset = summary.start_offset,
            end_offset = summary.end_offset,
            batches = summary.batches,
            lines = summary.lines,
            upload_records = summary.upload_records,
            days = summary.days.len(),
            deferred_lines = summary.deferred_lines,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ingestion run complete"
        );
        Ok(summary)
    }

    /// Write one batch in commit order and return the new cursor.
    fn commit(
        &mut self,
        batch: &Batch,
        committed: u64,
        day_records: &[u8],
        upload_records: &[u8],
    ) -> Result<u64> {
        let written = self
            .sink
            .append_uploads(upload_records)
            .and_then(|_| self.sink.append_day(&batch.date, day_records));
        if let Err(e) = written {
            telemetry::record_commit_outcome("sink_error");
            return Err(e);
        }

        let next = committed + batch.consumed as u64;
        if let Err(e) = self.progress.advance(next) {
            telemetry::record_commit_outcome("checkpoint_error");
            error!(
                day_file = %self.sink.describe_day(&batch.date),
                committed_offset = committed,
                batch_end_offset = next,
                error = %e,
                "CORRUPTION WARNING: day records written but cursor not advanced; the next run will duplicate this batch"
            );
            return Err(e);
        }

        telemetry::record_commit_outcome("ok");
        telemetry::record_batch(
            batch.boundary.as_str(),
            batch.consumed as u64,
            batch.lines,
            day_records.len() as u64,
        );
        telemetry::record_upload_records(batch.uploads, batch.missing_ids);
        debug!(
            date = %batch.date,
            lines = batch.lines,
            uploads = batch.uploads,
            boundary = batch.boundary.as_str(),
            offset = next,
            "Committed batch"
        );
        if batch.boundary == BatchBoundary::DateChange {
            info!(date = %batch.date, offset = next, "Finished day");
        }
        Ok(next)
    }
}

/// Run one ingestion pass as configured: open the log chain with its
/// persisted length index and ingest into the metrics directory.
pub fn run_pipeline(config: &PipelineConfig) -> Result<IngestSummary> {
    let layout = config.layout();
    std::fs::create_dir_all(layout.root())?;
    let store = FileLengthStore::open(layout.length_index())?;
    let mut stream = ArchiveStream::open(&config.log_dir, &config.live_log_name, Box::new(store))?;
    let mut ingester = LogIngester::from_config(config)?;
    let summary = ingester.run(&mut stream)?;
    let stats = stream.stats();
    info!(
        archives = stream.archive_count(),
        archives_opened = stats.archives_opened,
        archives_indexed = stats.archives_indexed,
        "Log stream closed"
    );
    Ok(summary)
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn count_complete_lines(data: &[u8]) -> usize {
    data.iter().filter(|&&b| b == b'\n').count()
}

fn has_complete_lines(data: &[u8], wanted: usize) -> bool {
    data.iter().filter(|&&b| b == b'\n').take(wanted).count() == wanted
}

/// Condense the leading lines of `data` that share the first line's date
/// into `day_buf` and `upload_buf`.
///
/// Returns `None` while fewer than two complete lines are buffered. Only
/// complete lines are ever consumed.
fn cut_batch(
    data: &[u8],
    base_offset: u64,
    write_capacity: usize,
    tokenizer: &mut LineTokenizer,
    day_buf: &mut Vec<u8>,
    upload_buf: &mut Vec<u8>,
) -> Result<Option<Batch>> {
    if !has_complete_lines(data, MIN_COMPLETE_LINES) {
        return Ok(None);
    }
    day_buf.clear();
    upload_buf.clear();

    let mut batch: Option<Batch> = None;
    let mut start = 0usize;
    let mut boundary = BatchBoundary::BufferEnd;

    while let Some(len) = data[start..].iter().position(|&b| b == b'\n') {
        let line = &data[start..start + len + 1];
        let line_offset = base_offset + start as u64;
        let fields = tokenizer.split(line);
        let record = AccessRecord::from_fields(&fields, line_offset)?;

        let current = batch.get_or_insert(Batch {
            date: record.date,
            consumed: 0,
            lines: 0,
            uploads: 0,
            missing_ids: 0,
            boundary,
        });
        if record.date != current.date {
            boundary = BatchBoundary::DateChange;
            break;
        }

        let upload = if record.is_upload() {
            content_id(&fields)
        } else {
            None
        };
        let upload_len = upload.map_or(0, |id| id.len() + record.ip.len() + 2);
        if day_buf.len() + record.condensed_len() > write_capacity
            || upload_buf.len() + upload_len > write_capacity
        {
            if current.lines == 0 {
                return Err(Error::Config(format!(
                    "write buffer of {write_capacity} bytes cannot hold the record at offset {line_offset}"
                )));
            }
            boundary = BatchBoundary::WriteCapacity;
            break;
        }

        record.write_condensed(day_buf);
        if let Some(id) = upload {
            upload_buf.extend_from_slice(id);
            upload_buf.push(b' ');
            upload_buf.extend_from_slice(record.ip);
            upload_buf.push(b'\n');
            current.uploads += 1;
        } else if record.is_upload() {
            current.missing_ids += 1;
        }
        current.lines += 1;
        start += len + 1;
        current.consumed = start;
    }

    Ok(batch.map(|mut batch| {
        batch.boundary = boundary;
        batch
    }))
}
