//! Ingestion throughput benchmark

use edgemetrics::ingest::{LineTokenizer, LogIngester, MemoryBatchSink, MemoryProgressStore};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::io::Cursor;

fn create_log(lines: usize) -> Vec<u8> {
    let mut log = String::with_capacity(lines * 220);
    for i in 0..lines {
        let day = 1 + (i * 4 / lines.max(1)) as u32;
        let method = if i % 20 == 0 { "POST" } else { "GET" };
        let referer = match i % 4 {
            0 => "https://app-one.example/page",
            1 => "https://app-two.example/",
            2 => "-",
            _ => "https://app-three.example/a/b",
        };
        log.push_str(&format!(
            "10.{}.{}.{} - - [{:02}/Jun/2021:10:{:02}:00 +0000] \"{} /skynet/skyfile HTTP/1.1\" 200 {} \"{}\" \"Mozilla/5.0 (X11; Linux x86_64)\" 0.010 0.009 \"siasky.net\" \"-\" - - \"AAAaaaBBBbbbCCCcccDDDdddEEEeeeFFFfffGGGgggHH{:02}\" \n",
            i % 256,
            (i / 256) % 256,
            i % 7,
            day,
            i % 60,
            method,
            512 + i,
            referer,
            i % 100
        ));
    }
    log.into_bytes()
}

fn benchmark_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");
    let log = create_log(10_000);
    group.throughput(Throughput::Bytes(log.len() as u64));

    group.bench_function("split_10000_lines", |b| {
        let mut tokenizer = LineTokenizer::new();
        b.iter(|| {
            let mut fields = 0usize;
            for line in log.split_inclusive(|&byte| byte == b'\n') {
                fields += tokenizer.split(black_box(line)).len();
            }
            black_box(fields)
        });
    });

    group.finish();
}

fn benchmark_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for lines in [10_000, 100_000] {
        let log = create_log(lines);
        group.throughput(Throughput::Bytes(log.len() as u64));

        for capacity in [1 << 20, 16 << 20] {
            group.bench_function(format!("{}_lines_{}_kib_buffer", lines, capacity >> 10), |b| {
                b.iter(|| {
                    let mut ingester = LogIngester::new(
                        MemoryBatchSink::new(),
                        MemoryProgressStore::new(),
                        capacity,
                        capacity,
                    )
                    .unwrap();
                    black_box(ingester.run(&mut Cursor::new(&log)).unwrap())
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_tokenizer, benchmark_ingest);

criterion_main!(benches);
