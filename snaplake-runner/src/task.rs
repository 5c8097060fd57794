//! Collection task: one (source, kind) fetch → normalize → fingerprint →
//! reconcile → filter → write unit.
//!
//! Every error is caught at the task boundary, logged once, and turned into
//! `TaskOutcome::Failed` with the stage that failed. A task never panics on
//! bad input and never affects other tasks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};

use snaplake_core::archive::{load_recent, BatchWriter, LookbackWindow, ObjectStore, WriteOutcome};
use snaplake_core::data::{normalize, ConnectorError, FetchRequest, SourceConnector};
use snaplake_core::dedup::filter_attached;
use snaplake_core::domain::Clock;
use snaplake_core::fingerprint::attach_fingerprints;
use snaplake_core::partition::PartitionScheme;
use snaplake_core::CoreError;

/// Where in the pipeline a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Task definition rejected before any I/O.
    Config,
    Fetch,
    Normalize,
    Fingerprint,
    Write,
    Timeout,
    Panicked,
}

impl FailureStage {
    /// Whether re-running the whole unit later can reasonably succeed.
    ///
    /// Defects (bad config, schema drift, identity bugs, panics) will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureStage::Fetch | FailureStage::Write | FailureStage::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Config => "config",
            FailureStage::Fetch => "fetch",
            FailureStage::Normalize => "normalize",
            FailureStage::Fingerprint => "fingerprint",
            FailureStage::Write => "write",
            FailureStage::Timeout => "timeout",
            FailureStage::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// This many new records were written as one object.
    Collected(usize),
    /// Everything fetched was already stored; nothing was written.
    NoNewData,
    Failed { stage: FailureStage, reason: String },
}

impl TaskOutcome {
    pub fn failed(stage: FailureStage, reason: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn collected(&self) -> usize {
        match self {
            TaskOutcome::Collected(n) => *n,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Collected(n) => write!(f, "collected {n}"),
            TaskOutcome::NoNewData => f.write_str("no new data"),
            TaskOutcome::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// Anything the coordinator can run.
pub trait RunnableTask: Send + Sync {
    fn name(&self) -> &str;

    /// Run to completion. Must not return errors; failures are outcomes.
    fn run(&self) -> TaskOutcome;
}

/// Static definition of a collection task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    /// `source=` partition segment; must match the connector's name.
    pub source: String,
    pub request: FetchRequest,
    pub window: LookbackWindow,
}

impl TaskSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid("task name must not be empty"));
        }
        self.request.validate()?;
        self.window.validate()
    }

    /// Prefix under which this task's objects live.
    pub fn prefix(&self, scheme: &PartitionScheme) -> Result<String, CoreError> {
        scheme.prefix(self.request.kind().as_str(), &self.source, &self.request.dimensions())
    }
}

struct StageError {
    stage: FailureStage,
    reason: String,
}

impl StageError {
    fn new(stage: FailureStage, err: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: err.to_string(),
        }
    }
}

/// A [`TaskSpec`] bound to its connector, store, clock and key scheme.
pub struct CollectionTask {
    spec: TaskSpec,
    connector: Arc<dyn SourceConnector>,
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    scheme: PartitionScheme,
}

impl CollectionTask {
    pub fn new(
        spec: TaskSpec,
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        scheme: PartitionScheme,
    ) -> Self {
        Self {
            spec,
            connector,
            store,
            clock,
            scheme,
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn execute(&self) -> Result<TaskOutcome, StageError> {
        let spec = &self.spec;
        spec.validate()
            .map_err(|e| StageError::new(FailureStage::Config, e))?;
        if self.connector.name() != spec.source {
            return Err(StageError::new(
                FailureStage::Config,
                format!(
                    "task source '{}' does not match connector '{}'",
                    spec.source,
                    self.connector.name()
                ),
            ));
        }
        let kind = spec.request.kind();
        let dims = spec.request.dimensions();
        let prefix = spec
            .prefix(&self.scheme)
            .map_err(|e| StageError::new(FailureStage::Config, e))?;

        // 1. fetch
        if !self.connector.is_available() {
            return Err(StageError::new(
                FailureStage::Fetch,
                ConnectorError::CircuitBreakerTripped,
            ));
        }
        let collected_at = self.clock.now();
        let raw = self
            .connector
            .fetch(&spec.request)
            .map_err(|e| StageError::new(FailureStage::Fetch, e))?;

        // 2. normalize
        let records = normalize(&spec.request, &raw.body, collected_at)
            .map_err(|e| StageError::new(FailureStage::Normalize, e))?;
        let fetched = records.len();

        // 3. fingerprint
        let records = attach_fingerprints(kind, records)
            .map_err(|e| StageError::new(FailureStage::Fingerprint, e))?;

        // 4-5. reconcile against the recent window and filter
        let recent = load_recent(
            self.store.as_ref(),
            &prefix,
            &spec.window,
            collected_at.date_naive(),
        );
        if recent.listing_failed {
            warn!("archive listing failed; every fetched record is treated as new");
        }
        let fresh = filter_attached(records, &recent.known);
        info!(
            fetched,
            known = recent.len(),
            scanned_objects = recent.scanned,
            new = fresh.len(),
            "reconciled against archive"
        );

        // 6. nothing new
        if fresh.is_empty() {
            return Ok(TaskOutcome::NoNewData);
        }

        // 7. write
        let key = self
            .scheme
            .build_key(kind.as_str(), &spec.source, self.clock.now(), &dims)
            .map_err(|e| StageError::new(FailureStage::Config, e))?;
        match BatchWriter::new(self.store.as_ref())
            .write(&fresh, &key)
            .map_err(|e| StageError::new(FailureStage::Write, e))?
        {
            WriteOutcome::Written(n) => Ok(TaskOutcome::Collected(n)),
            WriteOutcome::Empty => Ok(TaskOutcome::NoNewData),
        }
    }
}

impl RunnableTask for CollectionTask {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn run(&self) -> TaskOutcome {
        let span = info_span!("task", name = %self.spec.name, source = %self.spec.source);
        let _guard = span.enter();

        match self.execute() {
            Ok(outcome) => {
                info!(outcome = %outcome, "task finished");
                outcome
            }
            Err(StageError { stage, reason }) => {
                error!(stage = %stage, retryable = stage.is_retryable(), reason = %reason, "task failed");
                TaskOutcome::Failed { stage, reason }
            }
        }
    }
}
