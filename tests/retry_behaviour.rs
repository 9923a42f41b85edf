// tests/retry_behaviour.rs

//! Retry semantics: retry-safe tasks are re-attempted with backoff up to the
//! configured maximum; non-idempotent tasks fail terminally on first error.

use jobdag_test_utils::builders::{JobSpecBuilder, TaskSpecBuilder, test_registry};
use jobdag_test_utils::fake_executor::ScriptedExecutor;
use jobdag_test_utils::init_tracing;

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

use jobdag::compile::CompiledJob;
use jobdag::dag::{FailureReason, RunStatus, TaskState};
use jobdag::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome};
use jobdag::types::RetryPolicy;

type TestResult = Result<(), Box<dyn Error>>;

fn tick_for(job_id: &str) -> RuntimeEvent {
    RuntimeEvent::TickArrived {
        job_id: job_id.to_string(),
        logical_date: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        historical: false,
    }
}

async fn drive(
    compiled: CompiledJob,
    executor: ScriptedExecutor,
    rt_rx: mpsc::Receiver<RuntimeEvent>,
    retry: RetryPolicy,
) -> Result<CoreRuntime, Box<dyn Error>> {
    let core = CoreRuntime::new(
        vec![compiled],
        RuntimeOptions {
            exit_when_idle: true,
            retry,
        },
    );
    let runtime = Runtime::new(core, rt_rx, executor);
    match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => Ok(result?),
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    }
}

#[tokio::test]
async fn idempotent_task_retries_until_success() -> TestResult {
    init_tracing();

    let compiled = JobSpecBuilder::new("flaky_job")
        .with_task("flaky", TaskSpecBuilder::new("noop_write").build())
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    // First attempt fails, second succeeds.
    executor.script("flaky", TaskOutcome::failed("connection reset"));

    rt_tx.send(tick_for("flaky_job")).await?;

    let retry = RetryPolicy::new(3, StdDuration::from_millis(1));
    let core = drive(compiled, executor, rt_rx, retry).await?;

    // Dispatched twice: original attempt plus one retry.
    assert_eq!(executed.lock().unwrap().len(), 2);

    let record = &core.history()[0];
    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(record.task_states["flaky"], TaskState::Succeeded);

    Ok(())
}

#[tokio::test]
async fn retries_exhaust_into_failure() -> TestResult {
    init_tracing();

    let compiled = JobSpecBuilder::new("doomed_job")
        .with_task("doomed", TaskSpecBuilder::new("noop_write").build())
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    executor.script("doomed", TaskOutcome::failed("boom 1"));
    executor.script("doomed", TaskOutcome::failed("boom 2"));

    rt_tx.send(tick_for("doomed_job")).await?;

    let retry = RetryPolicy::new(2, StdDuration::from_millis(1));
    let core = drive(compiled, executor, rt_rx, retry).await?;

    // max_attempts = 2: one original attempt, one retry, then terminal.
    assert_eq!(executed.lock().unwrap().len(), 2);

    let record = &core.history()[0];
    assert_eq!(record.status, RunStatus::Failed);
    assert!(matches!(
        &record.task_states["doomed"],
        TaskState::Failed(FailureReason::Execution { message }) if message.contains("boom 2")
    ));

    Ok(())
}

#[tokio::test]
async fn non_idempotent_task_is_never_retried() -> TestResult {
    init_tracing();

    let compiled = JobSpecBuilder::new("volatile_job")
        .with_task("volatile", TaskSpecBuilder::new("noop_volatile").build())
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    executor.script("volatile", TaskOutcome::failed("half-applied write"));

    rt_tx.send(tick_for("volatile_job")).await?;

    // Generous retry budget, which must not apply to this class.
    let retry = RetryPolicy::new(5, StdDuration::from_millis(1));
    let core = drive(compiled, executor, rt_rx, retry).await?;

    assert_eq!(executed.lock().unwrap().len(), 1);
    assert_eq!(core.history()[0].status, RunStatus::Failed);

    Ok(())
}

#[tokio::test]
async fn permanent_failures_skip_retry_for_idempotent_tasks() -> TestResult {
    init_tracing();

    let compiled = JobSpecBuilder::new("misconfigured_job")
        .with_task("task", TaskSpecBuilder::new("noop_write").build())
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    executor.script(
        "task",
        TaskOutcome::failed_permanent("secret 'pg' not found in the secret store"),
    );

    rt_tx.send(tick_for("misconfigured_job")).await?;

    let retry = RetryPolicy::new(5, StdDuration::from_millis(1));
    let core = drive(compiled, executor, rt_rx, retry).await?;

    assert_eq!(executed.lock().unwrap().len(), 1);
    assert_eq!(core.history()[0].status, RunStatus::Failed);

    Ok(())
}
