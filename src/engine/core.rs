// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! A synchronous, deterministic core that consumes [`RuntimeEvent`]s and
//! produces commands for the IO shell. It owns the compiled jobs, the active
//! run schedulers, the set of already-seen ticks (at-most-one run per tick),
//! and the run history.
//!
//! It has **no** channels, no Tokio types, and performs no IO, so every
//! scheduling semantic can be unit tested without async machinery.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::compile::CompiledJob;
use crate::dag::{RunScheduler, RunStatus, ScheduledUnit, TaskState};
use crate::engine::{RunId, RuntimeEvent, RuntimeOptions, TaskId, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these units to the executor. They may run concurrently.
    DispatchUnits(Vec<ScheduledUnit>),
    /// Request that the process exits (used for `--once` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single [`RuntimeEvent`].
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    fn noop() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Audit record of a finished (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run: RunId,
    pub status: RunStatus,
    pub task_states: BTreeMap<TaskId, TaskState>,
    /// Outcomes that arrived after the run was already terminal.
    pub late_outcomes: Vec<(TaskId, TaskOutcome)>,
}

#[derive(Debug)]
pub struct CoreRuntime {
    jobs: BTreeMap<String, CompiledJob>,
    active: BTreeMap<RunId, RunScheduler>,
    /// Every tick ever accepted or skipped; the at-most-one-run guarantee.
    seen_ticks: HashSet<RunId>,
    history: Vec<RunRecord>,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(jobs: Vec<CompiledJob>, options: RuntimeOptions) -> Self {
        let jobs = jobs
            .into_iter()
            .map(|job| (job.job_id.clone(), job))
            .collect();
        Self {
            jobs,
            active: BTreeMap::new(),
            seen_ticks: HashSet::new(),
            history: Vec::new(),
            options,
        }
    }

    /// Whether no run is currently active.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_runs(&self) -> impl Iterator<Item = &RunId> {
        self.active.keys()
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TickArrived {
                job_id,
                logical_date,
                historical,
            } => self.handle_tick(job_id, logical_date, historical),
            RuntimeEvent::TaskCompleted {
                run,
                task_id,
                outcome,
            } => self.handle_completion(run, task_id, outcome),
            RuntimeEvent::RunCancelled { run } => self.handle_cancel(run),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }

    fn handle_tick(
        &mut self,
        job_id: String,
        logical_date: chrono::DateTime<chrono::Utc>,
        historical: bool,
    ) -> CoreStep {
        let Some(job) = self.jobs.get(&job_id) else {
            warn!(job_id = %job_id, "tick for unknown job; ignoring");
            return CoreStep::noop();
        };

        let run = RunId::new(job_id, logical_date);

        // At-most-one execution run per (job_id, logical timestamp): a
        // duplicate tick is dropped whether the first one instantiated a run
        // or skipped it.
        if !self.seen_ticks.insert(run.clone()) {
            debug!(run = %run, "duplicate tick; run already instantiated or skipped");
            return CoreStep::noop();
        }

        if historical && !job.catchup {
            debug!(run = %run, "historical tick with catchup=false; skipping");
            return CoreStep::noop();
        }

        info!(run = %run, historical, "instantiating execution run");

        let mut scheduler = RunScheduler::new(run.clone(), job, self.options.retry);
        let ready = scheduler.collect_ready();
        for unit in ready.iter() {
            scheduler.mark_running(&unit.unit.task_id, unit.attempt);
        }
        self.active.insert(run, scheduler);

        let mut commands = Vec::new();
        if !ready.is_empty() {
            commands.push(CoreCommand::DispatchUnits(ready));
        }
        CoreStep {
            commands,
            keep_running: true,
        }
    }

    fn handle_completion(&mut self, run: RunId, task_id: TaskId, outcome: TaskOutcome) -> CoreStep {
        let Some(scheduler) = self.active.get_mut(&run) else {
            // The run was already retired (finished or cancelled); keep the
            // outcome on its record.
            if let Some(record) = self.history.iter_mut().find(|r| r.run == run) {
                debug!(run = %run, task_id = %task_id, "late completion for retired run; recording");
                record.late_outcomes.push((task_id, outcome));
            } else {
                warn!(run = %run, task_id = %task_id, "completion for unknown run; ignoring");
            }
            return self.idle_step();
        };

        let step = scheduler.handle_completion(&task_id, outcome);

        let mut dispatch = step.newly_ready;
        if let Some(retry) = step.retry {
            dispatch.push(retry);
        }
        for unit in dispatch.iter() {
            scheduler.mark_running(&unit.unit.task_id, unit.attempt);
        }

        let mut commands = Vec::new();
        if !dispatch.is_empty() {
            commands.push(CoreCommand::DispatchUnits(dispatch));
        }

        if step.run_finished {
            self.retire_run(&run);
        }

        let mut core_step = self.idle_step();
        commands.extend(core_step.commands.drain(..));
        CoreStep {
            commands,
            keep_running: core_step.keep_running,
        }
    }

    fn handle_cancel(&mut self, run: RunId) -> CoreStep {
        match self.active.get_mut(&run) {
            Some(scheduler) => {
                scheduler.cancel();
                self.retire_run(&run);
            }
            None => {
                warn!(run = %run, "cancel for unknown or already-finished run; ignoring");
            }
        }
        self.idle_step()
    }

    /// Move a finished run from the active set into history.
    fn retire_run(&mut self, run: &RunId) {
        if let Some(scheduler) = self.active.remove(run) {
            let status = scheduler.status();
            info!(run = %run, status = ?status, "run finished");
            self.history.push(RunRecord {
                run: run.clone(),
                status,
                task_states: scheduler.task_states().clone(),
                late_outcomes: scheduler.late_outcomes().to_vec(),
            });
        }
    }

    /// In `--once` mode the runtime exits as soon as nothing is active.
    fn idle_step(&self) -> CoreStep {
        if self.options.exit_when_idle && self.is_idle() {
            CoreStep {
                commands: vec![CoreCommand::RequestExit],
                keep_running: false,
            }
        } else {
            CoreStep::noop()
        }
    }
}
