//! Merge telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct MergeInstruments {
    merges: Counter<u64>,
    entries_emitted: Counter<u64>,
    entries_dropped: Counter<u64>,
    duration_seconds: Histogram<f64>,
}

fn instruments() -> &'static MergeInstruments {
    static INSTRUMENTS: OnceLock<MergeInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("edgemetrics.merge");
        MergeInstruments {
            merges: meter
                .u64_counter("edgemetrics.merge.runs")
                .with_description("Series merges by kind and outcome")
                .init(),
            entries_emitted: meter
                .u64_counter("edgemetrics.merge.entries.emitted")
                .with_description("Days written to merged series")
                .init(),
            entries_dropped: meter
                .u64_counter("edgemetrics.merge.entries.below_watermark")
                .with_description("Source days skipped as already merged")
                .init(),
            duration_seconds: meter
                .f64_histogram("edgemetrics.merge.duration")
                .with_description("Merge duration including rewrite")
                .with_unit("s")
                .init(),
        }
    })
}

pub fn record_merge(kind: &'static str, outcome: &'static str, duration_seconds: f64) {
    let i = instruments();
    let attrs = [KeyValue::new("kind", kind), KeyValue::new("outcome", outcome)];
    i.merges.add(1, &attrs);
    i.duration_seconds.record(duration_seconds, &attrs);
}

pub fn record_entries(kind: &'static str, emitted: u64, below_watermark: u64) {
    let i = instruments();
    i.entries_emitted
        .add(emitted, &[KeyValue::new("kind", kind)]);
    i.entries_dropped
        .add(below_watermark, &[KeyValue::new("kind", kind)]);
}
