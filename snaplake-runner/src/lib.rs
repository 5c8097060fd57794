//! Snaplake Runner: collection tasks, the run coordinator, configuration.
//!
//! This crate builds on `snaplake-core` to provide:
//! - `CollectionTask`: fetch, normalize, fingerprint, reconcile, write
//! - `RunCoordinator`: bounded parallel execution with per-task isolation
//! - `RunSummary` and the failure policy
//! - TOML pipeline configuration and pipeline assembly
//! - Logging setup

pub mod config;
pub mod coordinator;
pub mod logging;
pub mod pipeline;
pub mod summary;
pub mod task;

pub use config::{
    BinanceConfig, CoinGeckoConfig, ConfigError, PipelineConfig, StoreBackend, TaskConfig,
};
pub use coordinator::RunCoordinator;
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
pub use pipeline::{build_connector, build_store, inspect_recent, Pipeline, RecentReport};
pub use summary::{FailurePolicy, RunError, RunSummary, TaskReport};
pub use task::{CollectionTask, FailureStage, RunnableTask, TaskOutcome, TaskSpec};
