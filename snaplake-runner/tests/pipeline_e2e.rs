//! End-to-end runs through tasks, coordinator and stores with scripted sources.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use snaplake_core::archive::{FsStore, MemoryStore, ObjectStore};
use snaplake_core::data::{ConnectorError, FetchRequest, RawResponse, SourceConnector};
use snaplake_core::domain::FixedClock;
use snaplake_core::StorageError;
use snaplake_runner::{
    FailurePolicy, FailureStage, Pipeline, PipelineConfig, RunCoordinator, RunError,
    RunnableTask, StoreBackend, TaskConfig, TaskOutcome,
};

// ── Test doubles ─────────────────────────────────────────────────────

/// Serves whatever body is currently loaded.
struct Scripted {
    name: &'static str,
    body: Mutex<Value>,
}

impl Scripted {
    fn new(name: &'static str, body: Value) -> Arc<Self> {
        Arc::new(Self {
            name,
            body: Mutex::new(body),
        })
    }

    fn load(&self, body: Value) {
        *self.body.lock().unwrap() = body;
    }
}

impl SourceConnector for Scripted {
    fn name(&self) -> &str {
        self.name
    }
    fn fetch(&self, _request: &FetchRequest) -> Result<RawResponse, ConnectorError> {
        Ok(RawResponse {
            source: self.name.to_string(),
            body: self.body.lock().unwrap().clone(),
        })
    }
    fn is_available(&self) -> bool {
        true
    }
}

enum Misbehavior {
    Unreachable,
    Panic,
    Hang(Duration),
}

struct Broken {
    name: &'static str,
    how: Misbehavior,
}

impl SourceConnector for Broken {
    fn name(&self) -> &str {
        self.name
    }
    fn fetch(&self, _request: &FetchRequest) -> Result<RawResponse, ConnectorError> {
        match self.how {
            Misbehavior::Unreachable => {
                Err(ConnectorError::NetworkUnreachable("connection refused".into()))
            }
            Misbehavior::Panic => panic!("connector exploded"),
            Misbehavior::Hang(d) => {
                std::thread::sleep(d);
                Err(ConnectorError::NetworkUnreachable("too late".into()))
            }
        }
    }
    fn is_available(&self) -> bool {
        true
    }
}

/// Listing always fails; reads and writes go to an inner memory store.
struct UnlistableStore(MemoryStore);

impl ObjectStore for UnlistableStore {
    fn describe(&self) -> String {
        "unlistable".into()
    }
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Err(StorageError::List {
            prefix: prefix.into(),
            reason: "access denied".into(),
        })
    }
    fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.0.read_object(key)
    }
    fn write_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.0.write_object(key, bytes, content_type)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn coin(price: f64) -> Value {
    json!({
        "usd": price,
        "usd_market_cap": price * 19_000_000.0,
        "usd_24h_vol": 1.0e9,
        "usd_24h_change": -0.42,
        "last_updated_at": 1_759_500_900
    })
}

fn spot_body(coins: &[(&str, f64)]) -> Value {
    let map: serde_json::Map<String, Value> =
        coins.iter().map(|(id, p)| (id.to_string(), coin(*p))).collect();
    Value::Object(map)
}

fn klines_body(first_open_ms: i64, n: usize) -> Value {
    let rows: Vec<Value> = (0..n as i64)
        .map(|i| {
            let open = first_open_ms + i * 3_600_000;
            json!([open, "67000.0", "67100.0", "66900.5", "67050.5", "812.5", open + 3_599_999, "54500000.0", 9120, "400.0", "26800000.0", "0"])
        })
        .collect();
    Value::Array(rows)
}

fn spot_task(coins: &[&str]) -> TaskConfig {
    TaskConfig {
        name: "coingecko_spot_prices".into(),
        source: "coingecko".into(),
        request: FetchRequest::SpotPrices {
            coin_ids: coins.iter().map(|c| c.to_string()).collect(),
            vs_currencies: vec!["usd".into()],
        },
        lookback_days: 7,
        max_objects: 20,
    }
}

fn klines_task() -> TaskConfig {
    TaskConfig {
        name: "binance_ohlcv_btcusdt_1h".into(),
        source: "binance".into(),
        request: FetchRequest::Klines {
            symbol: "BTCUSDT".into(),
            interval: "1h".into(),
            limit: 24,
        },
        lookback_days: 30,
        max_objects: 20,
    }
}

fn config(tasks: Vec<TaskConfig>) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.archive.backend = StoreBackend::Memory;
    config.run.parallelism = 3;
    config.tasks = tasks;
    config
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 10, 3, 14, 15, 3).unwrap()))
}

fn shared<C: SourceConnector + 'static>(connector: Arc<C>) -> Arc<dyn SourceConnector> {
    connector
}

fn connectors(
    list: Vec<(&'static str, Arc<dyn SourceConnector>)>,
) -> BTreeMap<&'static str, Arc<dyn SourceConnector>> {
    list.into_iter().collect()
}

const FIVE_COINS: [&str; 5] = ["bitcoin", "ethereum", "cardano", "solana", "binancecoin"];

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn five_coins_with_three_known_collects_two_into_fresh_key() {
    let store = Arc::new(MemoryStore::new());
    let clock = clock();
    let source = Scripted::new(
        "coingecko",
        spot_body(&[("bitcoin", 67_000.0), ("ethereum", 2_400.0), ("cardano", 0.61)]),
    );
    let cfg = config(vec![spot_task(&FIVE_COINS)]);
    let pipeline = Pipeline::with_parts(
        &cfg,
        store.clone(),
        &connectors(vec![("coingecko", shared(source.clone()))]),
        clock.clone(),
    )
    .unwrap();

    let first = pipeline.run();
    assert_eq!(first.tasks[0].outcome, TaskOutcome::Collected(3));
    let first_keys = store.keys();

    // Same minute, same three prices, two more coins.
    clock.advance(chrono::Duration::seconds(20));
    source.load(spot_body(&[
        ("bitcoin", 67_000.0),
        ("ethereum", 2_400.0),
        ("cardano", 0.61),
        ("solana", 152.3),
        ("binancecoin", 590.0),
    ]));
    let second = pipeline.run();
    assert_eq!(second.tasks[0].outcome, TaskOutcome::Collected(2));
    assert_eq!(second.total_collected, 2);

    let keys = store.keys();
    assert_eq!(keys.len(), 2);
    let new_key = keys.iter().find(|k| !first_keys.contains(k)).unwrap();
    assert!(new_key.starts_with(
        "crypto/spot_prices/source=coingecko/year=2025/month=10/day=03/spot_prices_20251003_141523"
    ));
}

#[test]
fn twenty_four_known_candles_write_nothing() {
    let store = Arc::new(MemoryStore::new());
    let clock = clock();
    let body = klines_body(1_759_413_600_000, 24);
    let source = Scripted::new("binance", body);
    let cfg = config(vec![klines_task()]);
    let pipeline = Pipeline::with_parts(
        &cfg,
        store.clone(),
        &connectors(vec![("binance", shared(source))]),
        clock.clone(),
    )
    .unwrap();

    assert_eq!(pipeline.run().tasks[0].outcome, TaskOutcome::Collected(24));
    store.reset_calls();
    clock.advance(chrono::Duration::minutes(15));

    let summary = pipeline.run();
    assert_eq!(summary.tasks[0].outcome, TaskOutcome::NoNewData);
    assert_eq!(store.calls().writes, 0);
    assert_eq!(store.len(), 1);
}

#[test]
fn failing_middle_task_does_not_affect_others() {
    let store = Arc::new(MemoryStore::new());
    let tickers = TaskConfig {
        name: "binance_tickers_24h".into(),
        source: "binance".into(),
        request: FetchRequest::Tickers24h {
            symbols: vec!["BTCUSDT".into()],
        },
        lookback_days: 7,
        max_objects: 20,
    };

    // Spot and klines on working connectors, tickers on a dead one: run the
    // tasks through the coordinator directly with per-task connectors.
    let clock = clock();
    let scheme = PipelineConfig::default().archive.scheme().unwrap();
    let good_spot: Arc<dyn SourceConnector> =
        Scripted::new("coingecko", spot_body(&[("bitcoin", 67_000.0)]));
    let dead: Arc<dyn SourceConnector> = Arc::new(Broken {
        name: "binance",
        how: Misbehavior::Unreachable,
    });
    let good_klines: Arc<dyn SourceConnector> =
        Scripted::new("binance", klines_body(1_759_413_600_000, 3));

    let make = |cfg: TaskConfig, connector: Arc<dyn SourceConnector>| -> Arc<dyn RunnableTask> {
        Arc::new(snaplake_runner::CollectionTask::new(
            cfg.to_spec().unwrap(),
            connector,
            store.clone(),
            clock.clone(),
            scheme.clone(),
        ))
    };
    let tasks = vec![
        make(spot_task(&["bitcoin"]), good_spot),
        make(tickers, dead),
        make(klines_task(), good_klines),
    ];

    let summary = RunCoordinator::new(clock.clone()).with_parallelism(3).run_all(&tasks);
    assert_eq!(summary.tasks[0].outcome, TaskOutcome::Collected(1));
    assert!(matches!(
        &summary.tasks[1].outcome,
        TaskOutcome::Failed { stage: FailureStage::Fetch, reason } if reason.contains("connection refused")
    ));
    assert_eq!(summary.tasks[2].outcome, TaskOutcome::Collected(3));
    assert_eq!(summary.total_collected, 4);
    assert_eq!(summary.failed_count(), 1);
    assert!(summary.check(FailurePolicy::FailWhenAllFailed).is_ok());
    assert_eq!(store.len(), 2);
}

#[test]
fn listing_failure_fails_open() {
    let store = Arc::new(UnlistableStore(MemoryStore::new()));
    let source = Scripted::new("binance", klines_body(1_759_413_600_000, 5));
    let cfg = config(vec![klines_task()]);
    let clock = clock();
    let pipeline = Pipeline::with_parts(
        &cfg,
        store.clone(),
        &connectors(vec![("binance", shared(source))]),
        clock.clone(),
    )
    .unwrap();

    assert_eq!(pipeline.run().tasks[0].outcome, TaskOutcome::Collected(5));
    // Without an index every record is new again on the next run.
    clock.advance(chrono::Duration::minutes(15));
    assert_eq!(pipeline.run().tasks[0].outcome, TaskOutcome::Collected(5));
    assert_eq!(store.0.len(), 2);
}

#[test]
fn all_failed_trips_strict_policy_only() {
    let dead = |name: &'static str| -> Arc<dyn SourceConnector> {
        Arc::new(Broken {
            name,
            how: Misbehavior::Unreachable,
        })
    };
    let cfg = config(vec![spot_task(&["bitcoin"]), klines_task()]);
    let pipeline = Pipeline::with_parts(
        &cfg,
        Arc::new(MemoryStore::new()),
        &connectors(vec![("coingecko", dead("coingecko")), ("binance", dead("binance"))]),
        clock(),
    )
    .unwrap();

    let summary = pipeline.run();
    assert!(summary.all_failed());
    assert!(summary.check(FailurePolicy::Lenient).is_ok());
    assert_eq!(
        summary.check(FailurePolicy::FailWhenAllFailed),
        Err(RunError::AllTasksFailed { failed: 2 })
    );
    assert!(summary.tasks.iter().all(|t| t.outcome.is_failure()));
}

#[test]
fn panicking_connector_is_contained() {
    let store = Arc::new(MemoryStore::new());
    let cfg = config(vec![spot_task(&["bitcoin"]), klines_task()]);
    let pipeline = Pipeline::with_parts(
        &cfg,
        store.clone(),
        &connectors(vec![
            (
                "coingecko",
                shared(Arc::new(Broken {
                    name: "coingecko",
                    how: Misbehavior::Panic,
                })),
            ),
            ("binance", shared(Scripted::new("binance", klines_body(1_759_413_600_000, 2)))),
        ]),
        clock(),
    )
    .unwrap();

    let summary = pipeline.run();
    assert!(matches!(
        &summary.tasks[0].outcome,
        TaskOutcome::Failed { stage: FailureStage::Panicked, reason } if reason.contains("connector exploded")
    ));
    assert_eq!(summary.tasks[1].outcome, TaskOutcome::Collected(2));
}

#[test]
fn hung_connector_times_out() {
    let mut cfg = config(vec![spot_task(&["bitcoin"]), klines_task()]);
    cfg.run.task_timeout_secs = Some(1);
    let pipeline = Pipeline::with_parts(
        &cfg,
        Arc::new(MemoryStore::new()),
        &connectors(vec![
            (
                "coingecko",
                shared(Arc::new(Broken {
                    name: "coingecko",
                    how: Misbehavior::Hang(Duration::from_secs(5)),
                })),
            ),
            ("binance", shared(Scripted::new("binance", klines_body(1_759_413_600_000, 2)))),
        ]),
        clock(),
    )
    .unwrap();

    let summary = pipeline.run();
    assert!(matches!(
        summary.tasks[0].outcome,
        TaskOutcome::Failed {
            stage: FailureStage::Timeout,
            ..
        }
    ));
    assert!(summary.tasks[0].elapsed_ms < 5_000);
    assert_eq!(summary.tasks[1].outcome, TaskOutcome::Collected(2));
}

#[test]
fn fs_archive_persists_across_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(vec![klines_task()]);
    cfg.archive.backend = StoreBackend::Fs;
    cfg.archive.root = dir.path().to_path_buf();
    let clock = clock();

    let run = |body: Value| {
        let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(dir.path()));
        let pipeline = Pipeline::with_parts(
            &cfg,
            store,
            &connectors(vec![("binance", shared(Scripted::new("binance", body)))]),
            clock.clone(),
        )
        .unwrap();
        pipeline.run().tasks[0].outcome.clone()
    };

    assert_eq!(run(klines_body(1_759_413_600_000, 24)), TaskOutcome::Collected(24));
    clock.advance(chrono::Duration::hours(1));
    assert_eq!(
        run(klines_body(1_759_413_600_000 + 3_600_000, 24)),
        TaskOutcome::Collected(1)
    );

    let keys = FsStore::new(dir.path())
        .list_keys("crypto/ohlcv/source=binance/symbol=BTCUSDT/interval=1h/")
        .unwrap();
    assert_eq!(keys.len(), 2);
}
