//! Run summary: per-task outcomes plus aggregate totals.
//!
//! Produced once per coordinator invocation and handed to the caller; never
//! persisted by the pipeline itself. `check` applies the configured failure
//! policy to decide whether the run as a whole counts as failed.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskOutcome;

/// How task failures affect the run's overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The run succeeds whenever it completes; failures show up per task only.
    #[default]
    Lenient,
    /// The run fails when every task failed.
    FailWhenAllFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("all {failed} tasks failed")]
    AllTasksFailed { failed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
    pub total_collected: usize,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, finished_at: DateTime<Utc>, tasks: Vec<TaskReport>) -> Self {
        let total_collected = tasks.iter().map(|t| t.outcome.collected()).sum();
        Self {
            started_at,
            finished_at,
            tasks,
            total_collected,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.outcome.is_failure()).count()
    }

    /// True if there was at least one task and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.tasks.is_empty() && self.failed_count() == self.tasks.len()
    }

    pub fn report(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn check(&self, policy: FailurePolicy) -> Result<(), RunError> {
        match policy {
            FailurePolicy::FailWhenAllFailed if self.all_failed() => Err(RunError::AllTasksFailed {
                failed: self.failed_count(),
            }),
            _ => Ok(()),
        }
    }

    /// Plain-text table for terminals and orchestrator logs.
    pub fn render_table(&self) -> String {
        let width = self
            .tasks
            .iter()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(4)
            .max(4);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} -> {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%H:%M:%S")
        );
        let _ = writeln!(out, "{:<width$}  {:>7}  {:>9}  outcome", "task", "records", "elapsed");
        let _ = writeln!(out, "{}", "-".repeat(width + 40));
        for t in &self.tasks {
            let _ = writeln!(
                out,
                "{:<width$}  {:>7}  {:>7}ms  {}",
                t.name,
                t.outcome.collected(),
                t.elapsed_ms,
                t.outcome
            );
        }
        let _ = writeln!(out, "{}", "-".repeat(width + 40));
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  ({} of {} tasks failed)",
            "TOTAL",
            self.total_collected,
            self.failed_count(),
            self.tasks.len()
        );
        out
    }
}
