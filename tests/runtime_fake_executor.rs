// tests/runtime_fake_executor.rs

use jobdag_test_utils::builders::{JobSpecBuilder, TaskSpecBuilder, test_registry};
use jobdag_test_utils::fake_executor::FakeExecutor;
use jobdag_test_utils::init_tracing;

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

use jobdag::compile::CompiledJob;
use jobdag::dag::RunStatus;
use jobdag::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use jobdag::types::RetryPolicy;

type TestResult = Result<(), Box<dyn Error>>;

/// Very simple chain: a -> b
fn simple_chain_job() -> CompiledJob {
    JobSpecBuilder::new("chain")
        .with_task("a", TaskSpecBuilder::new("noop_write").build())
        .with_task(
            "b",
            TaskSpecBuilder::new("noop_write").depends_on("a").build(),
        )
        .compile(&test_registry())
}

fn options() -> RuntimeOptions {
    RuntimeOptions {
        exit_when_idle: true,
        retry: RetryPolicy::default(),
    }
}

fn tick_for(job_id: &str) -> RuntimeEvent {
    RuntimeEvent::TickArrived {
        job_id: job_id.to_string(),
        logical_date: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        historical: false,
    }
}

async fn drive_to_completion(
    runtime: Runtime<FakeExecutor>,
) -> Result<CoreRuntime, Box<dyn Error>> {
    match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(Ok(core)) => Ok(core),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    }
}

#[tokio::test]
async fn runtime_with_fake_executor_runs_simple_chain() -> TestResult {
    init_tracing();

    let compiled = simple_chain_job();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    // Seed one schedule tick before starting the runtime loop.
    rt_tx.send(tick_for("chain")).await?;

    let core = CoreRuntime::new(vec![compiled], options());
    let runtime = Runtime::new(core, rt_rx, executor);
    let core = drive_to_completion(runtime).await?;

    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["a".to_string(), "b".to_string()]);

    assert_eq!(core.history().len(), 1);
    assert_eq!(core.history()[0].status, RunStatus::Succeeded);

    Ok(())
}

#[tokio::test]
async fn duplicate_ticks_yield_exactly_one_run() -> TestResult {
    init_tracing();

    let compiled = simple_chain_job();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    // The same (job_id, logical timestamp) tick arrives twice.
    rt_tx.send(tick_for("chain")).await?;
    rt_tx.send(tick_for("chain")).await?;

    let core = CoreRuntime::new(vec![compiled], options());
    let runtime = Runtime::new(core, rt_rx, executor);
    let core = drive_to_completion(runtime).await?;

    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(core.history().len(), 1);

    Ok(())
}

#[tokio::test]
async fn independent_jobs_run_from_separate_ticks() -> TestResult {
    init_tracing();

    let alpha = JobSpecBuilder::new("alpha")
        .with_task("load", TaskSpecBuilder::new("noop_write").build())
        .compile(&test_registry());
    let beta = JobSpecBuilder::new("beta")
        .with_task("load", TaskSpecBuilder::new("noop_read").build())
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    rt_tx.send(tick_for("alpha")).await?;
    rt_tx.send(tick_for("beta")).await?;

    let core = CoreRuntime::new(vec![alpha, beta], options());
    let runtime = Runtime::new(core, rt_rx, executor);
    let core = drive_to_completion(runtime).await?;

    assert_eq!(executed.lock().unwrap().len(), 2);
    assert_eq!(core.history().len(), 2);
    assert!(
        core.history()
            .iter()
            .all(|r| r.status == RunStatus::Succeeded)
    );

    Ok(())
}
