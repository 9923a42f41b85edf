// src/spec/model.rs

//! Data model for job specification documents.
//!
//! `RawJobSpec` is the exact deserialized shape of a job TOML file;
//! `JobDefinition` is the validated form produced by
//! [`crate::spec::validate`]. The split keeps deserialization and semantic
//! validation apart, so tests can construct raw specs programmatically.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::spec::schedule::Schedule;

/// Raw, unvalidated job specification as found in a TOML document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawJobSpec {
    pub job_id: String,

    #[serde(default)]
    pub description: String,

    /// Cron expression or named cadence (e.g. `@daily`).
    pub schedule: String,

    /// ISO date string, e.g. `"2024-01-01"`.
    pub start_date: NaiveDate,

    #[serde(default)]
    pub catchup: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Task name -> task table. The task name doubles as the task_id unless
    /// the task table overrides it.
    #[serde(default)]
    pub tasks: BTreeMap<String, RawTaskSpec>,
}

/// Raw, unvalidated task specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTaskSpec {
    /// Function name, resolved against the function registry at compile
    /// time.
    pub function: String,

    /// Optional explicit task_id; defaults to the task's key in `tasks`.
    #[serde(default)]
    pub task_id: Option<String>,

    /// Optional reference into the secret store, resolved at execution time.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// task_ids within the same job that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Keyword arguments: scalars, lists, or nested mappings.
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

/// A validated job definition.
///
/// Invariants (enforced by [`crate::spec::validate`]):
/// - `job_id` is non-empty (batch loading additionally enforces uniqueness)
/// - every task's `depends_on` entries name existing tasks in this job
/// - the dependency graph is acyclic
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefinition {
    pub job_id: String,
    pub description: String,
    pub schedule: Schedule,
    pub start_date: NaiveDate,
    pub catchup: bool,
    pub tags: Vec<String>,
    /// Keyed by task_id.
    pub tasks: BTreeMap<String, TaskDefinition>,
}

/// A validated task definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub task_id: String,
    pub function: String,
    pub secret_key: Option<String>,
    pub depends_on: Vec<String>,
    pub kwargs: BTreeMap<String, Value>,
}

impl JobDefinition {
    /// Construct without re-validating. Only [`crate::spec::validate`] and
    /// test builders should call this.
    pub fn new_unchecked(
        job_id: String,
        description: String,
        schedule: Schedule,
        start_date: NaiveDate,
        catchup: bool,
        tags: Vec<String>,
        tasks: BTreeMap<String, TaskDefinition>,
    ) -> Self {
        Self {
            job_id,
            description,
            schedule,
            start_date,
            catchup,
            tags,
            tasks,
        }
    }

    /// task_ids with no dependencies (ready at run start).
    pub fn root_tasks(&self) -> Vec<&str> {
        self.tasks
            .values()
            .filter(|t| t.depends_on.is_empty())
            .map(|t| t.task_id.as_str())
            .collect()
    }
}
