//! Ingestion telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct IngestInstruments {
    bytes_consumed: Counter<u64>,
    lines_accepted: Counter<u64>,
    lines_deferred: Counter<u64>,
    upload_records: Counter<u64>,
    uploads_without_id: Counter<u64>,
    batches_committed: Counter<u64>,
    batch_bytes: Histogram<u64>,
    commit_outcomes: Counter<u64>,
    archives_indexed: Counter<u64>,
    archive_bytes_indexed: Counter<u64>,
}

fn instruments() -> &'static IngestInstruments {
    static INSTRUMENTS: OnceLock<IngestInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("edgemetrics.ingest");
        IngestInstruments {
            bytes_consumed: meter
                .u64_counter("edgemetrics.ingest.bytes_consumed")
                .with_description("Raw log bytes covered by committed batches")
                .with_unit("By")
                .init(),
            lines_accepted: meter
                .u64_counter("edgemetrics.ingest.lines.accepted")
                .with_description("Log lines written to day files")
                .init(),
            lines_deferred: meter
                .u64_counter("edgemetrics.ingest.lines.deferred")
                .with_description("Complete lines left unprocessed at end of stream")
                .init(),
            upload_records: meter
                .u64_counter("edgemetrics.ingest.uploads.records")
                .with_description("Identifier/IP pairs appended to the upload log")
                .init(),
            uploads_without_id: meter
                .u64_counter("edgemetrics.ingest.uploads.missing_id")
                .with_description("Upload lines without a well-formed content identifier")
                .init(),
            batches_committed: meter
                .u64_counter("edgemetrics.ingest.batches.committed")
                .with_description("Batches committed by boundary reason")
                .init(),
            batch_bytes: meter
                .u64_histogram("edgemetrics.ingest.batch.bytes")
                .with_description("Condensed bytes written per batch")
                .with_unit("By")
                .init(),
            commit_outcomes: meter
                .u64_counter("edgemetrics.ingest.commit.outcomes")
                .with_description("Batch commit outcomes")
                .init(),
            archives_indexed: meter
                .u64_counter("edgemetrics.stream.archives.indexed")
                .with_description("Archives whose decompressed length was newly persisted")
                .init(),
            archive_bytes_indexed: meter
                .u64_counter("edgemetrics.stream.archives.indexed_bytes")
                .with_description("Decompressed bytes of newly indexed archives")
                .with_unit("By")
                .init(),
        }
    })
}

pub fn record_batch(reason: &'static str, consumed_bytes: u64, lines: u64, condensed_bytes: u64) {
    let i = instruments();
    i.batches_committed
        .add(1, &[KeyValue::new("reason", reason)]);
    i.bytes_consumed.add(consumed_bytes, &[]);
    i.lines_accepted.add(lines, &[]);
    i.batch_bytes.record(condensed_bytes, &[]);
}

pub fn record_upload_records(records: u64, missing_id: u64) {
    let i = instruments();
    i.upload_records.add(records, &[]);
    i.uploads_without_id.add(missing_id, &[]);
}

pub fn record_lines_deferred(lines: u64) {
    instruments().lines_deferred.add(lines, &[]);
}

pub fn record_commit_outcome(outcome: &'static str) {
    instruments()
        .commit_outcomes
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_archive_indexed(length: u64) {
    let i = instruments();
    i.archives_indexed.add(1, &[]);
    i.archive_bytes_indexed.add(length, &[]);
}
