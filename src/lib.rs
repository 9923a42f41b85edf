// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod compile;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod registry;
pub mod secrets;
pub mod spec;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::cli::Command;
use crate::compile::{CompileOptions, CompiledJob, compile_batch};
use crate::engine::ticker::once_events;
use crate::engine::{
    CoreRuntime, JobTickSpec, Runtime, RuntimeEvent, RuntimeOptions, spawn_ticker,
};
use crate::exec::FunctionExecutorBackend;
use crate::registry::{FunctionRegistry, builtin_registry};
use crate::secrets::FileSecretStore;
use crate::spec::load_batch;
use crate::types::{KwargStrictness, RetryPolicy};

/// High-level entry point used by `main.rs`.
pub async fn run(command: Command) -> Result<()> {
    let strictness = command.strictness();
    match command {
        Command::Validate { jobs, sql_root, .. } => {
            let compiled = load_and_compile(&jobs, &sql_root, strictness)?;
            println!("{} job(s) valid:", compiled.len());
            for job in compiled.iter() {
                println!(
                    "  - {} ({} task(s), {} edge(s), schedule {})",
                    job.job_id,
                    job.units.len(),
                    job.edges.len(),
                    job.schedule
                );
            }
            Ok(())
        }
        Command::Generate {
            jobs,
            out,
            sql_root,
            ..
        } => {
            let compiled = load_and_compile(&jobs, &sql_root, strictness)?;
            let summary = artifact::emit_artifacts(&compiled, &out)?;
            println!(
                "{} artifact(s) written, {} unchanged",
                summary.written.len(),
                summary.unchanged.len()
            );
            Ok(())
        }
        Command::Run {
            jobs,
            secrets,
            sql_root,
            once,
            max_attempts,
            backoff_secs,
            max_backfill,
            ..
        } => {
            let registry = Arc::new(builtin_registry(&sql_root));
            let compiled = compile_jobs(&jobs, &registry, strictness)?;
            let retry = RetryPolicy::new(max_attempts, Duration::from_secs(backoff_secs));

            run_scheduler_loop(
                compiled,
                registry,
                Arc::new(FileSecretStore::new(secrets)),
                retry,
                once,
                max_backfill,
            )
            .await?;
            Ok(())
        }
    }
}

/// Load a directory of job definitions and compile them with the built-in
/// registry. Per-job failures are reported; any failure makes the whole
/// invocation fail (after all jobs have been checked).
fn load_and_compile(
    jobs_dir: &Path,
    sql_root: &Path,
    strictness: KwargStrictness,
) -> Result<Vec<CompiledJob>> {
    let registry = Arc::new(builtin_registry(sql_root));
    compile_jobs(jobs_dir, &registry, strictness)
}

fn compile_jobs(
    jobs_dir: &Path,
    registry: &Arc<FunctionRegistry>,
    strictness: KwargStrictness,
) -> Result<Vec<CompiledJob>> {
    let batch = load_batch(jobs_dir)?;

    for (path, err) in batch.failures.iter() {
        error!(path = %path.display(), error = %err, "job definition rejected");
    }

    let options = CompileOptions { strictness };
    let (compiled, failures) = compile_batch(&batch.jobs, registry, &options);

    for (job_id, err) in failures.iter() {
        error!(job_id = %job_id, error = %err, "job failed to compile");
    }

    let total_failures = batch.failures.len() + failures.len();
    if total_failures > 0 {
        bail!(
            "{total_failures} job definition(s) failed to load or compile; see diagnostics above"
        );
    }
    if compiled.is_empty() {
        bail!("no job definitions found in {}", jobs_dir.display());
    }

    info!(jobs = compiled.len(), "compiled job definitions");
    Ok(compiled)
}

/// Wire the runtime together and drive it until shutdown:
/// ticker → event channel → pure core → executor backend.
///
/// In `--once` mode all ticks are seeded into the channel before the
/// runtime starts, so `exit_when_idle` cannot fire between the runs of two
/// jobs whose ticks are still in flight.
async fn run_scheduler_loop(
    compiled: Vec<CompiledJob>,
    registry: Arc<FunctionRegistry>,
    secrets: Arc<dyn secrets::SecretStore>,
    retry: RetryPolicy,
    once: bool,
    max_backfill: usize,
) -> Result<CoreRuntime> {
    let tick_specs = compiled
        .iter()
        .map(JobTickSpec::from_compiled)
        .collect::<std::result::Result<Vec<_>, String>>()
        .map_err(anyhow::Error::msg)?;

    let seed_events = if once {
        once_events(&tick_specs, chrono::Utc::now(), max_backfill)
    } else {
        Vec::new()
    };

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(seed_events.len() + 64);

    let executor =
        FunctionExecutorBackend::new(Arc::clone(&registry), secrets, rt_tx.clone(), retry);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    if once {
        for event in seed_events {
            rt_tx.send(event).await.map_err(anyhow::Error::from)?;
        }
    } else {
        let _ticker = spawn_ticker(tick_specs, rt_tx.clone(), max_backfill);
    }

    let options = RuntimeOptions {
        exit_when_idle: once,
        retry,
    };
    let core = CoreRuntime::new(compiled, options);
    let runtime = Runtime::new(core, rt_rx, executor);

    let core = runtime.run().await?;

    for record in core.history() {
        info!(run = %record.run, status = ?record.status, "run record");
    }

    Ok(core)
}
