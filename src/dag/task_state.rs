// src/dag/task_state.rs

//! Per-task state machine within one execution run.
//!
//! `Pending → Ready → Running → {Succeeded, Failed}`, with
//! `Running → Retrying → Running` for retry-safe tasks that failed and have
//! attempts left.

/// Why a task ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The task's own execution failed (terminally, after any retries).
    Execution { message: String },
    /// An upstream dependency failed; this task was never executed.
    UpstreamFailed { upstream: String },
    /// The run was cancelled while this task was non-terminal.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting on dependencies.
    Pending,
    /// All dependencies succeeded; not yet dispatched.
    Ready,
    /// Dispatched to the executor. `attempt` is 0-based.
    Running { attempt: u32 },
    /// Failed, retry scheduled; `attempt` is the upcoming attempt number.
    Retrying { attempt: u32 },
    Succeeded,
    Failed(FailureReason),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed(_))
    }
}
