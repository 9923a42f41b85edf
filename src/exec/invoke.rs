// src/exec/invoke.rs

//! Single-unit invocation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dag::ScheduledUnit;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::Result;
use crate::registry::{FunctionRegistry, Invocation};
use crate::secrets::SecretStore;
use crate::types::RetryPolicy;

/// Run one scheduled unit and report its outcome to the runtime.
///
/// Secrets are resolved here — at execution time, once per attempt — and
/// never appear in the unit itself. Failures are classified as transient or
/// permanent via [`crate::errors::JobdagError::is_transient`] so the
/// scheduler can skip pointless retries of configuration errors.
pub async fn invoke_unit(
    registry: Arc<FunctionRegistry>,
    secrets: Arc<dyn SecretStore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    scheduled: ScheduledUnit,
    retry: RetryPolicy,
) {
    if scheduled.attempt > 0 {
        let delay = retry.backoff_for(scheduled.attempt);
        info!(
            run = %scheduled.run,
            task_id = %scheduled.unit.task_id,
            attempt = scheduled.attempt,
            delay_ms = delay.as_millis() as u64,
            "backing off before retry"
        );
        tokio::time::sleep(delay).await;
    }

    let outcome = match run_unit(&registry, secrets.as_ref(), &scheduled).await {
        Ok(()) => TaskOutcome::Success,
        Err(err) => {
            error!(
                run = %scheduled.run,
                task_id = %scheduled.unit.task_id,
                attempt = scheduled.attempt,
                error = %err,
                "unit invocation failed"
            );
            TaskOutcome::Failed {
                message: err.to_string(),
                transient: err.is_transient(),
            }
        }
    };

    // A send failure means the runtime already shut down; the outcome has
    // nowhere to go.
    let _ = runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            run: scheduled.run.clone(),
            task_id: scheduled.unit.task_id.clone(),
            outcome,
        })
        .await;
}

async fn run_unit(
    registry: &FunctionRegistry,
    secrets: &dyn SecretStore,
    scheduled: &ScheduledUnit,
) -> Result<()> {
    let unit = &scheduled.unit;
    let binding = registry.resolve(&unit.function)?;

    let secret = match unit.secret_key.as_deref() {
        Some(key) => {
            debug!(
                run = %scheduled.run,
                task_id = %unit.task_id,
                secret_key = %key,
                "resolving secret"
            );
            Some(secrets.resolve(key)?)
        }
        None => None,
    };

    let invocation = Invocation {
        job_id: &unit.job_id,
        task_id: &unit.task_id,
        kwargs: &unit.kwargs,
        secret: secret.as_ref(),
        logical_date: scheduled.run.logical_date,
    };

    binding.capability.invoke(&invocation).await
}
