//! Assembles a runnable pipeline from a [`PipelineConfig`].
//!
//! One store is built per pipeline and shared by every task through `Arc`.
//! Each task gets its own connector, and with it its own circuit breaker, so a
//! source that keeps failing one endpoint does not lock out its other tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use snaplake_core::archive::{load_recent, FsStore, MemoryStore, ObjectStore, RecentFingerprints};
use snaplake_core::data::{
    binance, coingecko, BinanceConnector, CoinGeckoConnector, SourceConnector,
};
use snaplake_core::domain::Clock;
use snaplake_core::partition::PartitionScheme;

use crate::config::{ConfigError, PipelineConfig, StoreBackend, TaskConfig};
use crate::coordinator::RunCoordinator;
use crate::summary::RunSummary;
use crate::task::{CollectionTask, RunnableTask, TaskSpec};

pub fn build_store(config: &PipelineConfig) -> Result<Arc<dyn ObjectStore>, ConfigError> {
    match config.archive.backend {
        StoreBackend::Fs => {
            let store = FsStore::new(&config.archive.root);
            store.ensure_root()?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

pub fn build_connector(
    config: &PipelineConfig,
    source: &str,
) -> Result<Arc<dyn SourceConnector>, ConfigError> {
    match source {
        coingecko::SOURCE => Ok(Arc::new(CoinGeckoConnector::new(
            config.coingecko.base_url.clone(),
            config.coingecko.api_key.clone(),
            &config.http,
        )?)),
        binance::SOURCE => Ok(Arc::new(BinanceConnector::new(
            config.binance.base_url.clone(),
            config.binance.api_key.clone(),
            &config.http,
        )?)),
        other => Err(ConfigError::Invalid(format!("unknown source '{other}'"))),
    }
}

pub struct Pipeline {
    tasks: Vec<Arc<dyn RunnableTask>>,
    coordinator: RunCoordinator,
}

impl Pipeline {
    /// Validate `config` and build every task, or only those named in `only`.
    pub fn from_config(
        config: &PipelineConfig,
        clock: Arc<dyn Clock>,
        only: &[String],
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        for name in only {
            config.task(name)?;
        }
        let store = build_store(config)?;
        Self::assemble(config, store, clock, only, |task| {
            build_connector(config, &task.source)
        })
    }

    /// Build with caller-supplied store and connectors, keyed by source name.
    /// Tasks naming the same source share that connector.
    pub fn with_parts(
        config: &PipelineConfig,
        store: Arc<dyn ObjectStore>,
        connectors: &BTreeMap<&str, Arc<dyn SourceConnector>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::assemble(config, store, clock, &[], |task| {
            connectors.get(task.source.as_str()).cloned().ok_or_else(|| {
                ConfigError::Invalid(format!("no connector for source '{}'", task.source))
            })
        })
    }

    fn assemble(
        config: &PipelineConfig,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        only: &[String],
        connector_for: impl Fn(&TaskConfig) -> Result<Arc<dyn SourceConnector>, ConfigError>,
    ) -> Result<Self, ConfigError> {
        let scheme = config.archive.scheme()?;
        let mut tasks: Vec<Arc<dyn RunnableTask>> = Vec::new();
        for task in config.tasks.iter().filter(|t| only.is_empty() || only.contains(&t.name)) {
            let connector = connector_for(task)?;
            tasks.push(Arc::new(CollectionTask::new(
                task.to_spec()?,
                connector,
                Arc::clone(&store),
                Arc::clone(&clock),
                scheme.clone(),
            )));
        }
        info!(tasks = tasks.len(), backend = ?config.archive.backend, "pipeline assembled");

        let coordinator = RunCoordinator::new(clock)
            .with_parallelism(config.run.parallelism)
            .with_task_timeout(config.run.task_timeout());
        Ok(Self { tasks, coordinator })
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn run(&self) -> RunSummary {
        self.coordinator.run_all(&self.tasks)
    }
}

/// What the index would see for one configured task right now.
#[derive(Debug)]
pub struct RecentReport {
    pub task: String,
    pub prefix: String,
    pub recent: RecentFingerprints,
}

pub fn inspect_recent(
    config: &PipelineConfig,
    store: &dyn ObjectStore,
    task_name: &str,
    clock: &dyn Clock,
) -> Result<RecentReport, ConfigError> {
    let spec: TaskSpec = config.task(task_name)?.to_spec()?;
    let scheme: PartitionScheme = config.archive.scheme()?;
    let prefix = spec.prefix(&scheme)?;
    let recent = load_recent(store, &prefix, &spec.window, clock.now().date_naive());
    Ok(RecentReport {
        task: spec.name,
        prefix,
        recent,
    })
}
