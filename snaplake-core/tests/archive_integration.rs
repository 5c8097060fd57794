//! Integration tests: normalize → fingerprint → write → reload window → filter,
//! against both the filesystem store and the in-memory store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use snaplake_core::archive::{load_recent, BatchWriter, FsStore, LookbackWindow, MemoryStore, ObjectStore, WriteOutcome};
use snaplake_core::data::{normalize, FetchRequest};
use snaplake_core::dedup::filter_attached;
use snaplake_core::domain::DataKind;
use snaplake_core::fingerprint::attach_fingerprints;
use snaplake_core::partition::PartitionScheme;

fn klines_request() -> FetchRequest {
    FetchRequest::Klines {
        symbol: "BTCUSDT".into(),
        interval: "1h".into(),
        limit: 24,
    }
}

fn klines_body(first_open_ms: i64, n: usize) -> Value {
    let rows: Vec<Value> = (0..n as i64)
        .map(|i| {
            let open = first_open_ms + i * 3_600_000;
            json!([open, "100.0", "101.0", "99.5", "100.5", "12.5", open + 3_599_999, "1250.0", 42, "6.0", "600.0", "0"])
        })
        .collect();
    Value::Array(rows)
}

fn collected(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, hour, 0, 5).unwrap()
}

/// One collection pass; returns how many records were written.
fn collect_once(store: &dyn ObjectStore, body: &Value, at: DateTime<Utc>) -> usize {
    let request = klines_request();
    let scheme = PartitionScheme::new(Some("crypto".into())).unwrap();
    let dims = request.dimensions();
    let prefix = scheme.prefix("ohlcv", "binance", &dims).unwrap();

    let records = normalize(&request, body, at).unwrap();
    let records = attach_fingerprints(DataKind::Ohlcv, records).unwrap();
    let recent = load_recent(store, &prefix, &LookbackWindow::new(30, 20).unwrap(), at.date_naive());
    let fresh = filter_attached(records, &recent.known);

    let key = scheme.build_key("ohlcv", "binance", at, &dims).unwrap();
    BatchWriter::new(store).write(&fresh, &key).unwrap().count()
}

#[test]
fn fs_store_second_pass_writes_only_new_candles() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    let start = 1_749_513_600_000; // 2025-06-10T00:00:00Z

    assert_eq!(collect_once(&store, &klines_body(start, 24), collected(1)), 24);
    // Window slides by two hours: 22 known candles, 2 new ones.
    let slid = klines_body(start + 2 * 3_600_000, 24);
    assert_eq!(collect_once(&store, &slid, collected(3)), 2);
    // Nothing new an instant later.
    assert_eq!(collect_once(&store, &slid, collected(4)), 0);

    let keys = store.list_keys("crypto/ohlcv/source=binance/").unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].contains("symbol=BTCUSDT/interval=1h/year=2025/month=06/day=10/"));
}

#[test]
fn memory_store_empty_pass_touches_only_list_and_reads() {
    let store = MemoryStore::new();
    let body = klines_body(1_749_513_600_000, 24);
    assert_eq!(collect_once(&store, &body, collected(1)), 24);

    store.reset_calls();
    assert_eq!(collect_once(&store, &body, collected(2)), 0);
    let calls = store.calls();
    assert_eq!(calls.writes, 0);
    assert_eq!(calls.lists, 1);
    assert_eq!(calls.reads, 1);
}

#[test]
fn objects_older_than_window_are_forgotten() {
    let store = MemoryStore::new();
    let body = klines_body(1_749_513_600_000, 3);
    let first = collected(1);
    assert_eq!(collect_once(&store, &body, first), 3);

    // Same candles again, 31 days later: the old object is outside the window.
    assert_eq!(collect_once(&store, &body, first + Duration::days(31)), 3);
}

#[test]
fn write_outcome_reports_empty() {
    let store = MemoryStore::new();
    let outcome = BatchWriter::new(&store).write(&[], "crypto/x.csv").unwrap();
    assert_eq!(outcome, WriteOutcome::Empty);
}
