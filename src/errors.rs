// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Parse/compile-time errors (`Validation`, `Cycle`) are scoped to a single
//! job so one bad definition never blocks siblings in a batch.
//! Execution-time errors (`Execution`, `SecretNotFound`) are scoped to the
//! failing task and its downstream dependents.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobdagError {
    #[error("validation error in job '{job_id}': {reason}")]
    Validation { job_id: String, reason: String },

    #[error("cycle detected in job '{job_id}': {}", .path.join(" -> "))]
    Cycle { job_id: String, path: Vec<String> },

    #[error("conflicting registration for function '{function}': {reason}")]
    Conflict { function: String, reason: String },

    #[error("function '{function}' is not registered")]
    FunctionNotFound { function: String },

    #[error("secret '{key}' not found in the secret store")]
    SecretNotFound { key: String },

    #[error("secret '{key}' is malformed: {reason}")]
    SecretMalformed { key: String, reason: String },

    #[error("execution failed for task '{task_id}' in job '{job_id}': {reason}")]
    Execution {
        job_id: String,
        task_id: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobdagError {
    /// Whether a retry can plausibly change the outcome.
    ///
    /// Configuration-class failures (unknown function, missing or malformed
    /// secret, invalid arguments) are permanent regardless of the function's
    /// side-effect class.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            JobdagError::Validation { .. }
                | JobdagError::Cycle { .. }
                | JobdagError::Conflict { .. }
                | JobdagError::FunctionNotFound { .. }
                | JobdagError::SecretNotFound { .. }
                | JobdagError::SecretMalformed { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobdagError>;
