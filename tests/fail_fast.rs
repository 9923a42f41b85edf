// tests/fail_fast.rs

//! Failure of an upstream task must fail its dependents without ever running
//! them, while unrelated branches of the same run keep executing.

use jobdag_test_utils::builders::{JobSpecBuilder, TaskSpecBuilder, test_registry};
use jobdag_test_utils::fake_executor::ScriptedExecutor;
use jobdag_test_utils::init_tracing;

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

use jobdag::dag::{FailureReason, RunStatus, TaskState};
use jobdag::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome};
use jobdag::types::RetryPolicy;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn failed_root_fails_both_dependents_without_running_them() -> TestResult {
    init_tracing();

    // a (no deps), b and c both depend on a.
    let compiled = JobSpecBuilder::new("diamondless")
        .with_task("a", TaskSpecBuilder::new("noop_volatile").build())
        .with_task(
            "b",
            TaskSpecBuilder::new("noop_write").depends_on("a").build(),
        )
        .with_task(
            "c",
            TaskSpecBuilder::new("noop_write").depends_on("a").build(),
        )
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    executor.script("a", TaskOutcome::failed("upstream source unavailable"));

    rt_tx
        .send(RuntimeEvent::TickArrived {
            job_id: "diamondless".to_string(),
            logical_date: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            historical: false,
        })
        .await?;

    let core = CoreRuntime::new(
        vec![compiled],
        RuntimeOptions {
            exit_when_idle: true,
            retry: RetryPolicy::default(),
        },
    );
    let runtime = Runtime::new(core, rt_rx, executor);

    let core = match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => result?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    };

    // Only `a` was ever dispatched; `b` and `c` never entered Running.
    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["a".to_string()]);

    assert_eq!(core.history().len(), 1);
    let record = &core.history()[0];
    assert_eq!(record.status, RunStatus::Failed);

    assert!(matches!(
        record.task_states["a"],
        TaskState::Failed(FailureReason::Execution { .. })
    ));
    for task in ["b", "c"] {
        assert_eq!(
            record.task_states[task],
            TaskState::Failed(FailureReason::UpstreamFailed {
                upstream: "a".to_string()
            })
        );
    }

    Ok(())
}

#[tokio::test]
async fn sibling_branch_survives_a_failed_branch() -> TestResult {
    init_tracing();

    // bad -> blocked, and an unrelated branch ok -> downstream.
    let compiled = JobSpecBuilder::new("two_branches")
        .with_task("bad", TaskSpecBuilder::new("noop_volatile").build())
        .with_task(
            "blocked",
            TaskSpecBuilder::new("noop_write").depends_on("bad").build(),
        )
        .with_task("ok", TaskSpecBuilder::new("noop_write").build())
        .with_task(
            "downstream",
            TaskSpecBuilder::new("noop_write").depends_on("ok").build(),
        )
        .compile(&test_registry());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = ScriptedExecutor::new(rt_tx.clone(), executed.clone());
    executor.script("bad", TaskOutcome::failed("boom"));

    rt_tx
        .send(RuntimeEvent::TickArrived {
            job_id: "two_branches".to_string(),
            logical_date: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            historical: false,
        })
        .await?;

    let core = CoreRuntime::new(
        vec![compiled],
        RuntimeOptions {
            exit_when_idle: true,
            retry: RetryPolicy::default(),
        },
    );
    let runtime = Runtime::new(core, rt_rx, executor);

    let core = match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => result?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    };

    let tasks_run = executed.lock().unwrap().clone();
    assert!(tasks_run.contains(&"ok".to_string()));
    assert!(tasks_run.contains(&"downstream".to_string()));
    assert!(!tasks_run.contains(&"blocked".to_string()));

    let record = &core.history()[0];
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(record.task_states["ok"], TaskState::Succeeded);
    assert_eq!(record.task_states["downstream"], TaskState::Succeeded);

    Ok(())
}
