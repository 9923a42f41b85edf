// src/engine/mod.rs

//! Scheduler/executor adapter.
//!
//! This module ties together:
//! - per-run DAG scheduling ([`crate::dag`])
//! - schedule ticks (the [`ticker`] clock collaborator)
//! - the main runtime event loop reacting to ticks, task completions,
//!   cancellations, and shutdown
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. The core guarantees at-most-one execution run
//! per `(job_id, logical timestamp)` and never dispatches a task before all
//! of its dependencies succeeded.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::RetryPolicy;

/// Canonical task identifier type used throughout the engine.
pub type TaskId = String;

/// Identity of one execution run: a job at one logical schedule tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId {
    pub job_id: String,
    pub logical_date: DateTime<Utc>,
}

impl RunId {
    pub fn new(job_id: impl Into<String>, logical_date: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            logical_date,
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_id, self.logical_date.to_rfc3339())
    }
}

/// Outcome of one task attempt, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed {
        message: String,
        /// Whether a retry could plausibly change the outcome. Permanent
        /// failures (missing secret, unknown function) skip retries even for
        /// retry-safe side-effect classes.
        transient: bool,
    },
}

impl TaskOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            message: message.into(),
            transient: true,
        }
    }

    pub fn failed_permanent(message: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            message: message.into(),
            transient: false,
        }
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active (used for `--once`).
    pub exit_when_idle: bool,
    /// Retry policy applied to retry-safe tasks.
    pub retry: RetryPolicy,
}

/// Events flowing into the runtime from the ticker, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A schedule tick for a job is due.
    TickArrived {
        job_id: String,
        logical_date: DateTime<Utc>,
        /// True for backfill ticks emitted for elapsed schedule instants;
        /// jobs with `catchup = false` skip these.
        historical: bool,
    },
    /// A task attempt finished with a concrete outcome.
    TaskCompleted {
        run: RunId,
        task_id: TaskId,
        outcome: TaskOutcome,
    },
    /// Cancel an in-flight run.
    RunCancelled { run: RunId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod runtime;
pub mod ticker;

pub use self::core::{CoreCommand, CoreRuntime, CoreStep, RunRecord};
pub use self::runtime::Runtime;
pub use self::ticker::{JobTickSpec, spawn_ticker};
