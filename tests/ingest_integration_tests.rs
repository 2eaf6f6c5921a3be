//! Integration tests for log ingestion.
//!
//! Tests cover:
//! - End-to-end runs over rotated archives and the live log
//! - Re-runs that find nothing new and runs that resume after appends
//! - Checkpoint failures duplicating at most the batch in flight, with a
//!   corruption warning naming the day file
//! - Sink failures leaving the cursor untouched
//! - Cursor, upload log and day file formats on disk

use edgemetrics::ingest::{
    BatchSink, FileProgressStore, LogIngester, MemoryBatchSink, MemoryProgressStore,
    ProgressStore,
};
use edgemetrics::{run_pipeline, DateKey, Error, PipelineConfig, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CONTENT_ID: &str = "_A2zt5SKoqwnnZU4cBF8uBycSKULXMyeqQz1QZrxfCCgYQ";

fn log_line(ip: &str, day: u32, method: &str, referer: &str) -> String {
    let content = if method == "POST" { CONTENT_ID } else { "-" };
    format!(
        "{ip} - - [{day:02}/Jun/2021:08:15:00 +0000] \"{method} /skynet/skyfile HTTP/1.1\" 200 1024 \"{referer}\" \"curl/7.68.0\" 0.020 0.019 \"siasky.net\" \"-\" - - \"{content}\" \n"
    )
}

/// Three lines on June 1st, three on June 2nd and one on June 3rd.
fn sample_days() -> Vec<String> {
    vec![
        log_line("10.0.0.1", 1, "GET", "https://app.one/index.html"),
        log_line("10.0.0.2", 1, "POST", "-"),
        log_line("10.0.0.1", 1, "GET", "https://app.two/"),
        log_line("10.0.0.3", 2, "GET", "https://app.one/"),
        log_line("10.0.0.3", 2, "GET", "https://app.one/a/b"),
        log_line("10.0.0.4", 2, "POST", "https://app.two/up"),
        log_line("10.0.0.5", 3, "GET", "-"),
    ]
}

fn write_gz(path: &Path, data: &[u8]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap();
}

struct Host {
    _dir: TempDir,
    logs: PathBuf,
    metrics: PathBuf,
}

impl Host {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("nginx");
        let metrics = dir.path().join("metrics");
        std::fs::create_dir_all(&logs).unwrap();
        Self {
            _dir: dir,
            logs,
            metrics,
        }
    }

    fn config(&self, buffer_bytes: usize) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.logs, &self.metrics);
        config.read_buffer_bytes = buffer_bytes;
        config.write_buffer_bytes = buffer_bytes / 2;
        config
    }

    fn day(&self, date: &str) -> String {
        std::fs::read_to_string(self.metrics.join("days").join(date)).unwrap_or_default()
    }

    fn cursor(&self) -> String {
        std::fs::read_to_string(self.metrics.join("bytesProcessed.txt")).unwrap()
    }

    fn append_live(&self, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(self.logs.join("access.log"))
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }
}

#[test]
fn test_pipeline_over_rotated_logs() {
    let host = Host::new();
    let lines = sample_days();
    write_gz(&host.logs.join("access.log-20210601.gz"), lines[..2].concat().as_bytes());
    write_gz(&host.logs.join("access.log-20210602.gz"), lines[2..5].concat().as_bytes());
    std::fs::write(host.logs.join("access.log"), lines[5..].concat()).unwrap();

    let summary = run_pipeline(&host.config(1024)).unwrap();
    let committed = lines[..6].concat().len() as u64;

    assert_eq!(summary.start_offset, 0);
    assert_eq!(summary.end_offset, committed);
    assert_eq!(summary.lines, 6);
    assert_eq!(summary.upload_records, 2);
    assert_eq!(summary.deferred_lines, 1);
    assert_eq!(
        summary.days,
        vec![
            "2021.06.01".parse::<DateKey>().unwrap(),
            "2021.06.02".parse().unwrap()
        ]
    );

    assert_eq!(
        host.day("2021.06.01"),
        "10.0.0.1 GET app.one\n10.0.0.2 POST -\n10.0.0.1 GET app.two\n"
    );
    assert_eq!(
        host.day("2021.06.02"),
        "10.0.0.3 GET app.one\n10.0.0.3 GET app.one\n10.0.0.4 POST app.two\n"
    );
    assert_eq!(host.day("2021.06.03"), "");
    assert_eq!(
        std::fs::read_to_string(host.metrics.join("uploadIPs.txt")).unwrap(),
        format!("{CONTENT_ID} 10.0.0.2\n{CONTENT_ID} 10.0.0.4\n")
    );
    assert_eq!(host.cursor(), format!("{committed}\n"));
    assert_eq!(
        std::fs::metadata(host.metrics.join("archiveOffsets.dat")).unwrap().len(),
        16
    );
}

#[test]
fn test_rerun_without_new_data_changes_nothing() {
    let host = Host::new();
    std::fs::write(host.logs.join("access.log"), sample_days().concat()).unwrap();

    run_pipeline(&host.config(64 * 1024)).unwrap();
    let day_one = host.day("2021.06.01");
    let cursor = host.cursor();

    let summary = run_pipeline(&host.config(64 * 1024)).unwrap();
    assert_eq!(summary.batches, 0);
    assert_eq!(summary.deferred_lines, 1);
    assert_eq!(host.day("2021.06.01"), day_one);
    assert_eq!(host.cursor(), cursor);
}

#[test]
fn test_resume_after_live_log_grows() {
    let host = Host::new();
    let lines = sample_days();
    std::fs::write(host.logs.join("access.log"), lines.concat()).unwrap();
    run_pipeline(&host.config(64 * 1024)).unwrap();

    let more = [
        log_line("10.0.0.6", 3, "GET", "https://app.three/"),
        log_line("10.0.0.7", 3, "GET", "-"),
    ]
    .concat();
    host.append_live(&more);

    let summary = run_pipeline(&host.config(64 * 1024)).unwrap();
    assert_eq!(summary.start_offset, lines[..6].concat().len() as u64);
    assert_eq!(summary.days, vec!["2021.06.03".parse::<DateKey>().unwrap()]);
    assert_eq!(summary.deferred_lines, 0);
    assert_eq!(
        host.day("2021.06.03"),
        "10.0.0.5 GET -\n10.0.0.6 GET app.three\n10.0.0.7 GET -\n"
    );
    assert_eq!(
        host.cursor(),
        format!("{}\n", lines.concat().len() + more.len())
    );
}

#[test]
fn test_small_buffers_match_large_buffers() {
    let small = Host::new();
    let large = Host::new();
    let mut log = String::new();
    for i in 0..200u32 {
        let method = if i % 9 == 0 { "POST" } else { "GET" };
        log.push_str(&log_line(&format!("10.1.{}.{}", i / 50, i % 50), 1 + i / 70, method, "https://app.one/"));
    }
    // A lone trailing day is held back whatever the buffer alignment.
    log.push_str(&log_line("10.9.9.9", 4, "GET", "-"));
    std::fs::write(small.logs.join("access.log"), &log).unwrap();
    std::fs::write(large.logs.join("access.log"), &log).unwrap();

    let a = run_pipeline(&small.config(700)).unwrap();
    let b = run_pipeline(&large.config(1 << 20)).unwrap();

    assert!(a.batches > b.batches);
    assert_eq!(a.end_offset, b.end_offset);
    assert_eq!((a.deferred_lines, b.deferred_lines), (1, 1));
    for date in ["2021.06.01", "2021.06.02", "2021.06.03", "2021.06.04"] {
        assert_eq!(small.day(date), large.day(date), "day {date}");
    }
    assert_eq!(
        std::fs::read(small.metrics.join("uploadIPs.txt")).unwrap(),
        std::fs::read(large.metrics.join("uploadIPs.txt")).unwrap()
    );
}

#[test]
fn test_garbage_cursor_is_reported() {
    let host = Host::new();
    std::fs::write(host.logs.join("access.log"), sample_days().concat()).unwrap();
    std::fs::create_dir_all(&host.metrics).unwrap();
    std::fs::write(host.metrics.join("bytesProcessed.txt"), "not a number\n").unwrap();

    let err = run_pipeline(&host.config(4096)).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }), "got {err}");
    assert_eq!(host.day("2021.06.01"), "");
}

/// Progress store that fails its `n`th advance (1-based), once.
struct FlakyProgress {
    inner: FileProgressStore,
    fail_on: usize,
    calls: usize,
}

impl ProgressStore for FlakyProgress {
    fn load(&mut self) -> Result<u64> {
        self.inner.load()
    }

    fn advance(&mut self, offset: u64) -> Result<()> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(Error::Checkpoint {
                path: self.inner.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.advance(offset)
    }
}

#[test]
fn test_checkpoint_failure_duplicates_one_batch() {
    let dir = TempDir::new().unwrap();
    let cursor_path = dir.path().join("bytesProcessed.txt");
    let log = sample_days().concat();
    let day_one_len = sample_days()[..3].concat().len() as u64;

    let flaky = FlakyProgress {
        inner: FileProgressStore::new(&cursor_path),
        fail_on: 2,
        calls: 0,
    };
    let mut ingester = LogIngester::new(MemoryBatchSink::new(), flaky, 4096, 4096).unwrap();
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let err = tracing::subscriber::with_default(subscriber, || {
        ingester.run(&mut Cursor::new(log.as_bytes())).unwrap_err()
    });
    assert!(matches!(err, Error::Checkpoint { .. }));

    let output = logs.contents();
    let warning = output
        .lines()
        .find(|line| line.contains("CORRUPTION WARNING"))
        .unwrap_or_else(|| panic!("no corruption warning in:\n{output}"));
    assert!(warning.contains("ERROR"), "{warning}");
    assert!(warning.contains("memory:days/2021.06.02"), "{warning}");
    assert_eq!(output.matches("CORRUPTION WARNING").count(), 1);

    let (sink, _) = ingester.into_parts();
    assert_eq!(
        std::fs::read_to_string(&cursor_path).unwrap(),
        format!("{day_one_len}\n")
    );
    let day_two_once = sink.day("2021.06.02").to_vec();
    assert_eq!(day_two_once.iter().filter(|&&b| b == b'\n').count(), 3);

    // The retry replays June 2nd into the same sink.
    let mut ingester =
        LogIngester::new(sink, FileProgressStore::new(&cursor_path), 4096, 4096).unwrap();
    let summary = ingester.run(&mut Cursor::new(log.as_bytes())).unwrap();
    assert_eq!(summary.start_offset, day_one_len);
    assert_eq!(summary.batches, 1);

    let sink = ingester.sink();
    assert_eq!(sink.day("2021.06.01").iter().filter(|&&b| b == b'\n').count(), 3);
    assert_eq!(sink.day("2021.06.02"), [day_two_once.clone(), day_two_once].concat());
}

/// Log output shared between the test and the subscriber's writer.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Sink that refuses to write a given day.
struct FailingSink {
    inner: MemoryBatchSink,
    refuse: DateKey,
}

impl BatchSink for FailingSink {
    fn append_uploads(&mut self, records: &[u8]) -> Result<()> {
        self.inner.append_uploads(records)
    }

    fn append_day(&mut self, date: &DateKey, records: &[u8]) -> Result<()> {
        if *date == self.refuse {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )));
        }
        self.inner.append_day(date, records)
    }

    fn describe_day(&self, date: &DateKey) -> String {
        self.inner.describe_day(date)
    }
}

#[test]
fn test_sink_failure_keeps_cursor() {
    let log = sample_days().concat();
    let sink = FailingSink {
        inner: MemoryBatchSink::new(),
        refuse: "2021.06.02".parse().unwrap(),
    };
    let mut ingester = LogIngester::new(sink, MemoryProgressStore::new(), 4096, 4096).unwrap();
    let err = ingester.run(&mut Cursor::new(log.as_bytes())).unwrap_err();
    assert!(matches!(err, Error::Io(_)));

    let (sink, progress) = ingester.into_parts();
    assert_eq!(progress.offset(), sample_days()[..3].concat().len() as u64);
    assert_eq!(progress.history().len(), 1);
    assert!(sink.inner.day("2021.06.02").is_empty());

    let mut retry = LogIngester::new(sink.inner, progress, 4096, 4096).unwrap();
    retry.run(&mut Cursor::new(log.as_bytes())).unwrap();
    assert_eq!(
        retry.sink().day("2021.06.02"),
        b"10.0.0.3 GET app.one\n10.0.0.3 GET app.one\n10.0.0.4 POST app.two\n"
    );
}
