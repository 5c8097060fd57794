//! Criterion benchmarks for the dedup hot path.
//!
//! Benchmarks:
//! 1. Fingerprinting a batch of normalized records
//! 2. Filtering a batch against a known-fingerprint set
//! 3. Encoding a batch to the archive format
//! 4. Decoding archive objects back into fingerprints

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use snaplake_core::archive::format::{encode_batch, ArchiveTable, FINGERPRINT_COLUMN};
use snaplake_core::dedup::{filter_attached, FingerprintSet};
use snaplake_core::domain::{DataKind, Fingerprint, Record};
use snaplake_core::fingerprint::attach_fingerprints;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize) -> Vec<Record> {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 60_000.0 + (i as f64 * 0.1).sin() * 500.0;
            Record::new(base + Duration::hours(n as i64))
                .with_field("symbol", "BTCUSDT")
                .with_field("interval", "1h")
                .with_field("open_time", base + Duration::hours(i as i64))
                .with_field("open", close - 12.5)
                .with_field("high", close + 40.0)
                .with_field("low", close - 55.0)
                .with_field("close", close)
                .with_field("volume", 150.0 + i as f64)
                .with_field("trades", i as i64 * 3)
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for n in [24usize, 1000] {
        let candles = make_candles(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &candles, |b, candles| {
            b.iter(|| attach_fingerprints(DataKind::Ohlcv, black_box(candles.clone())).unwrap())
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_unseen");
    for n in [24usize, 1000] {
        let candles = attach_fingerprints(DataKind::Ohlcv, make_candles(n)).unwrap();
        // Half the batch already stored, plus unrelated history.
        let mut known: FingerprintSet = candles
            .iter()
            .step_by(2)
            .filter_map(Record::fingerprint)
            .collect();
        known.extend((0..20_000u32).map(|i| Fingerprint::of_bytes(&i.to_le_bytes())));

        group.bench_with_input(BenchmarkId::from_parameter(n), &candles, |b, candles| {
            b.iter(|| filter_attached(black_box(candles.clone()), &known))
        });
    }
    group.finish();
}

fn bench_archive_codec(c: &mut Criterion) {
    let candles = attach_fingerprints(DataKind::Ohlcv, make_candles(1000)).unwrap();
    let bytes = encode_batch(&candles).unwrap();

    c.bench_function("encode_batch_1000", |b| {
        b.iter(|| encode_batch(black_box(&candles)).unwrap())
    });
    c.bench_function("decode_fingerprints_1000", |b| {
        b.iter(|| {
            let table = ArchiveTable::decode(black_box(&bytes)).unwrap();
            table
                .column(FINGERPRINT_COLUMN)
                .unwrap()
                .into_iter()
                .filter_map(|c| c.parse::<Fingerprint>().ok())
                .count()
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_filter, bench_archive_codec);
criterion_main!(benches);
