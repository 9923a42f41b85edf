// src/dag/run_scheduler.rs

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::compile::{CompiledJob, CompiledUnit};
use crate::dag::graph::DagGraph;
use crate::dag::task_state::{FailureReason, TaskState};
use crate::engine::{RunId, TaskOutcome};
use crate::types::RetryPolicy;

/// Overall status of one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A unit the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledUnit {
    pub run: RunId,
    pub unit: CompiledUnit,
    /// 0-based attempt; retries carry a positive number so the executor can
    /// apply backoff before invoking.
    pub attempt: u32,
}

/// Structured result of feeding one task completion into the scheduler.
#[derive(Debug, Clone, Default)]
pub struct CompletionStep {
    /// Tasks whose dependencies became satisfied (now `Ready`).
    pub newly_ready: Vec<ScheduledUnit>,
    /// Re-dispatch of the completed task itself, if it is being retried.
    pub retry: Option<ScheduledUnit>,
    /// Tasks newly failed by this step (the failing task plus dependents).
    pub newly_failed: Vec<String>,
    /// Whether this step brought every task to a terminal state.
    pub run_finished: bool,
}

/// Per-run scheduler: holds the immutable compiled DAG plus mutable task
/// states for exactly one [`RunId`].
///
/// It is responsible for:
/// - deciding when a task is ready to run (all dependencies `Succeeded`)
/// - applying retry policy according to the unit's side-effect class
/// - failing dependents transitively when a task fails terminally
/// - cancelling all non-terminal tasks without waiting on in-flight calls
#[derive(Debug)]
pub struct RunScheduler {
    run: RunId,
    graph: DagGraph,
    units: BTreeMap<String, CompiledUnit>,
    states: BTreeMap<String, TaskState>,
    retry: RetryPolicy,
    /// Outcomes that arrived after the owning task was already terminal
    /// (e.g. an external call returning after cancellation).
    late_outcomes: Vec<(String, TaskOutcome)>,
}

impl RunScheduler {
    pub fn new(run: RunId, job: &CompiledJob, retry: RetryPolicy) -> Self {
        let graph = DagGraph::from_compiled(job);
        let mut units = BTreeMap::new();
        let mut states = BTreeMap::new();

        for unit in job.units.iter() {
            units.insert(unit.task_id.clone(), unit.clone());
            states.insert(unit.task_id.clone(), TaskState::Pending);
        }

        Self {
            run,
            graph,
            units,
            states,
            retry,
            late_outcomes: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run
    }

    pub fn state_of(&self, task_id: &str) -> Option<&TaskState> {
        self.states.get(task_id)
    }

    pub fn task_states(&self) -> &BTreeMap<String, TaskState> {
        &self.states
    }

    pub fn late_outcomes(&self) -> &[(String, TaskOutcome)] {
        &self.late_outcomes
    }

    pub fn is_finished(&self) -> bool {
        self.states.values().all(TaskState::is_terminal)
    }

    pub fn status(&self) -> RunStatus {
        if self.states.values().all(|s| *s == TaskState::Pending) {
            return RunStatus::Pending;
        }
        if !self.is_finished() {
            return RunStatus::Running;
        }
        if self.states.values().all(|s| *s == TaskState::Succeeded) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    /// Move every `Pending` task whose dependencies are all `Succeeded` to
    /// `Ready` and return dispatchable units for them.
    ///
    /// The caller marks each unit `Running` via [`Self::mark_running`] when
    /// it actually hands them to the executor.
    pub fn collect_ready(&mut self) -> Vec<ScheduledUnit> {
        // Decide first, then mutate, to avoid borrowing issues.
        let candidates: Vec<String> = self
            .states
            .iter()
            .filter(|(task_id, state)| {
                **state == TaskState::Pending && self.deps_satisfied(task_id.as_str())
            })
            .map(|(task_id, _)| task_id.clone())
            .collect();

        let mut ready = Vec::new();
        for task_id in candidates {
            self.states.insert(task_id.clone(), TaskState::Ready);
            debug!(run = %self.run, task_id = %task_id, "dependencies satisfied; task Ready");
            ready.push(ScheduledUnit {
                run: self.run.clone(),
                unit: self.units[&task_id].clone(),
                attempt: 0,
            });
        }
        ready
    }

    /// Record that a `Ready` or `Retrying` task has been handed to the
    /// executor.
    pub fn mark_running(&mut self, task_id: &str, attempt: u32) {
        match self.states.get_mut(task_id) {
            Some(state @ (TaskState::Ready | TaskState::Retrying { .. })) => {
                *state = TaskState::Running { attempt };
            }
            Some(state) => {
                warn!(
                    run = %self.run,
                    task_id = %task_id,
                    state = ?state,
                    "mark_running on task not Ready/Retrying; ignoring"
                );
            }
            None => {
                warn!(run = %self.run, task_id = %task_id, "mark_running on unknown task; ignoring");
            }
        }
    }

    /// Feed a task completion into the run.
    pub fn handle_completion(&mut self, task_id: &str, outcome: TaskOutcome) -> CompletionStep {
        let Some(state) = self.states.get(task_id).cloned() else {
            warn!(run = %self.run, task_id = %task_id, "completion for unknown task; ignoring");
            return CompletionStep {
                run_finished: self.is_finished(),
                ..CompletionStep::default()
            };
        };

        let attempt = match state {
            TaskState::Running { attempt } => attempt,
            _ if state.is_terminal() => {
                // The run moved on without this task (cancellation); keep the
                // outcome for the record but change no state.
                debug!(
                    run = %self.run,
                    task_id = %task_id,
                    "late completion for terminal task; recording outcome only"
                );
                self.late_outcomes.push((task_id.to_string(), outcome));
                return CompletionStep {
                    run_finished: self.is_finished(),
                    ..CompletionStep::default()
                };
            }
            _ => {
                warn!(
                    run = %self.run,
                    task_id = %task_id,
                    state = ?state,
                    "completion for task that was never dispatched; ignoring"
                );
                return CompletionStep {
                    run_finished: self.is_finished(),
                    ..CompletionStep::default()
                };
            }
        };

        let mut step = CompletionStep::default();

        match outcome {
            TaskOutcome::Success => {
                self.states
                    .insert(task_id.to_string(), TaskState::Succeeded);
                info!(run = %self.run, task_id = %task_id, attempt, "task succeeded");
                step.newly_ready = self.collect_ready();
            }
            TaskOutcome::Failed { message, transient } => {
                let unit = &self.units[task_id];
                let retryable = unit.side_effect.retry_safe()
                    && transient
                    && attempt + 1 < self.retry.max_attempts;

                if retryable {
                    let next = attempt + 1;
                    warn!(
                        run = %self.run,
                        task_id = %task_id,
                        attempt,
                        next_attempt = next,
                        error = %message,
                        "task failed; retrying"
                    );
                    self.states
                        .insert(task_id.to_string(), TaskState::Retrying { attempt: next });
                    step.retry = Some(ScheduledUnit {
                        run: self.run.clone(),
                        unit: unit.clone(),
                        attempt: next,
                    });
                } else {
                    warn!(
                        run = %self.run,
                        task_id = %task_id,
                        attempt,
                        error = %message,
                        "task failed terminally; failing dependents"
                    );
                    self.states.insert(
                        task_id.to_string(),
                        TaskState::Failed(FailureReason::Execution { message }),
                    );
                    step.newly_failed.push(task_id.to_string());
                    let mut downstream = self.fail_dependents(task_id);
                    step.newly_failed.append(&mut downstream);
                }
            }
        }

        step.run_finished = self.is_finished();
        step
    }

    /// Mark all non-terminal tasks `Failed(Cancelled)` and return their ids.
    ///
    /// Does not wait for in-flight external calls; their completions arrive
    /// later and are recorded via [`Self::handle_completion`] as late
    /// outcomes.
    pub fn cancel(&mut self) -> Vec<String> {
        let mut cancelled = Vec::new();
        for (task_id, state) in self.states.iter_mut() {
            if !state.is_terminal() {
                *state = TaskState::Failed(FailureReason::Cancelled);
                cancelled.push(task_id.clone());
            }
        }
        info!(run = %self.run, count = cancelled.len(), "run cancelled");
        cancelled
    }

    fn deps_satisfied(&self, task_id: &str) -> bool {
        self.graph
            .dependencies_of(task_id)
            .iter()
            .all(|dep| self.states.get(dep) == Some(&TaskState::Succeeded))
    }

    /// Transitively mark dependents of a failed task `Failed(Upstream)`.
    ///
    /// Only `Pending` tasks can be affected: a dependent cannot be Ready,
    /// Running or Retrying while one of its dependencies is unfinished.
    fn fail_dependents(&mut self, failed_task: &str) -> Vec<String> {
        let mut stack: Vec<(String, String)> = self
            .graph
            .dependents_of(failed_task)
            .iter()
            .map(|d| (d.clone(), failed_task.to_string()))
            .collect();

        let mut newly_failed = Vec::new();

        while let Some((task_id, upstream)) = stack.pop() {
            match self.states.get(&task_id) {
                Some(TaskState::Pending) => {
                    debug!(
                        run = %self.run,
                        task_id = %task_id,
                        upstream = %upstream,
                        "failing dependent due to upstream failure"
                    );
                    self.states.insert(
                        task_id.clone(),
                        TaskState::Failed(FailureReason::UpstreamFailed { upstream }),
                    );
                    for next in self.graph.dependents_of(&task_id) {
                        stack.push((next.clone(), task_id.clone()));
                    }
                    newly_failed.push(task_id);
                }
                _ => {
                    // Already terminal or executing independently of the
                    // failed branch.
                }
            }
        }

        newly_failed
    }
}
