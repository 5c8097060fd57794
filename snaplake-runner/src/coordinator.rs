//! Run coordinator: executes every task to completion and aggregates outcomes.
//!
//! Tasks run on a bounded rayon pool when `parallelism > 1`, sequentially
//! otherwise. Each task is guarded twice:
//! - a panic inside the task becomes `Failed { stage: Panicked }`;
//! - with a deadline set, a task that overruns becomes `Failed { stage: Timeout }`.
//!
//! A timed-out task keeps running on its own thread until its blocking call
//! returns; its outcome is discarded. It can still write its object late, in
//! which case the next run's index absorbs the records.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use snaplake_core::domain::Clock;

use crate::summary::{RunSummary, TaskReport};
use crate::task::{FailureStage, RunnableTask, TaskOutcome};

pub struct RunCoordinator {
    parallelism: usize,
    task_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl RunCoordinator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            parallelism: 1,
            task_timeout: None,
            clock,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run every task and summarize. Never fails; see [`RunSummary::check`].
    pub fn run_all(&self, tasks: &[Arc<dyn RunnableTask>]) -> RunSummary {
        let started_at = self.clock.now();
        info!(tasks = tasks.len(), parallelism = self.parallelism, "run started");

        // Build Rayon thread pool if parallelism > 1
        let thread_pool = if self.parallelism > 1 && tasks.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.parallelism.min(tasks.len()))
                .thread_name(|i| format!("snaplake-task-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "failed to build thread pool; running tasks sequentially");
                    None
                }
            }
        } else {
            None
        };

        let reports: Vec<TaskReport> = if let Some(ref tp) = thread_pool {
            tp.install(|| tasks.par_iter().map(|t| self.run_one(t)).collect())
        } else {
            tasks.iter().map(|t| self.run_one(t)).collect()
        };

        let summary = RunSummary::new(started_at, self.clock.now(), reports);
        info!(
            total_collected = summary.total_collected,
            failed = summary.failed_count(),
            "run finished"
        );
        summary
    }

    fn run_one(&self, task: &Arc<dyn RunnableTask>) -> TaskReport {
        let start = Instant::now();
        let outcome = match self.task_timeout {
            Some(timeout) => run_with_deadline(task, timeout),
            None => run_guarded(task.as_ref()),
        };
        TaskReport {
            name: task.name().to_string(),
            outcome,
            elapsed_ms: millis(start.elapsed()),
        }
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn panicked(task: &str, payload: &(dyn Any + Send)) -> TaskOutcome {
    let message = panic_message(payload);
    warn!(task, panic = %message, "task panicked");
    TaskOutcome::failed(FailureStage::Panicked, message)
}

fn run_guarded(task: &dyn RunnableTask) -> TaskOutcome {
    catch_unwind(AssertUnwindSafe(|| task.run()))
        .unwrap_or_else(|payload| panicked(task.name(), payload.as_ref()))
}

fn run_with_deadline(task: &Arc<dyn RunnableTask>, timeout: Duration) -> TaskOutcome {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(task);
    let spawned = thread::Builder::new()
        .name(format!("task-{}", task.name()))
        .spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| worker.run()));
            let _ = tx.send(result);
        });

    if let Err(e) = spawned {
        warn!(task = task.name(), error = %e, "could not spawn task thread; running without deadline");
        return run_guarded(task.as_ref());
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(payload)) => panicked(task.name(), payload.as_ref()),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(task = task.name(), timeout_secs = timeout.as_secs_f64(), "task timed out");
            TaskOutcome::failed(
                FailureStage::Timeout,
                format!("no outcome within {:.1}s", timeout.as_secs_f64()),
            )
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            TaskOutcome::failed(FailureStage::Panicked, "task thread exited without an outcome")
        }
    }
}
