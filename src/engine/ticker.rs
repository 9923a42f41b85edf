// src/engine/ticker.rs

//! Schedule tick delivery.
//!
//! The core treats time as an external collaborator: it only reacts to
//! `TickArrived` events. This module is the production clock:
//!
//! - [`backfill_events`] computes bounded historical ticks between a job's
//!   `start_date` and now, flagged `historical` (the core skips them for
//!   `catchup = false` jobs).
//! - [`once_events`] builds the complete event list for `--once` mode:
//!   backfill plus one immediate tick per job. The caller seeds these into
//!   the channel **before** starting the runtime, so `exit_when_idle` can
//!   never fire while ticks are still on their way.
//! - [`spawn_ticker`] is the continuous mode: emit backfill, then sleep
//!   until each upcoming schedule instant and emit a live tick.

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::compile::CompiledJob;
use crate::engine::RuntimeEvent;
use crate::spec::Schedule;

/// Per-job data the ticker needs; derived from a [`CompiledJob`].
#[derive(Debug, Clone)]
pub struct JobTickSpec {
    pub job_id: String,
    pub schedule: Schedule,
    pub start_date: NaiveDate,
}

impl JobTickSpec {
    /// The schedule expression was validated when the job was parsed, so
    /// re-parsing from the compiled form only fails for hand-edited
    /// artifacts; those are reported rather than ticked.
    pub fn from_compiled(job: &CompiledJob) -> Result<Self, String> {
        let schedule = Schedule::parse(&job.schedule)
            .map_err(|reason| format!("job '{}': {reason}", job.job_id))?;
        Ok(Self {
            job_id: job.job_id.clone(),
            schedule,
            start_date: job.start_date,
        })
    }
}

/// Historical ticks between `start_date` and `now`, oldest first.
///
/// When the schedule produces more instants than `max_backfill`, only the
/// most recent ones are kept and the truncation is logged — silently
/// dropping history would make a catchup job look complete when it is not.
pub fn backfill_events(
    job: &JobTickSpec,
    now: DateTime<Utc>,
    max_backfill: usize,
) -> Vec<RuntimeEvent> {
    let Some(start) = job.start_date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()) else {
        warn!(job_id = %job.job_id, "invalid start_date; skipping backfill");
        return Vec::new();
    };

    let mut ticks: Vec<DateTime<Utc>> = Vec::new();
    for tick in job.schedule.ticks_after(start) {
        if tick > now {
            break;
        }
        ticks.push(tick);
    }

    if ticks.len() > max_backfill {
        warn!(
            job_id = %job.job_id,
            total = ticks.len(),
            max_backfill,
            "backfill truncated to the most recent ticks"
        );
        ticks.drain(..ticks.len() - max_backfill);
    }

    if !ticks.is_empty() {
        info!(job_id = %job.job_id, count = ticks.len(), "backfill ticks computed");
    }

    ticks
        .into_iter()
        .map(|tick| RuntimeEvent::TickArrived {
            job_id: job.job_id.clone(),
            logical_date: tick,
            historical: true,
        })
        .collect()
}

/// The full event list for `--once` mode: every job's backfill followed by
/// one immediate live tick per job.
pub fn once_events(
    jobs: &[JobTickSpec],
    now: DateTime<Utc>,
    max_backfill: usize,
) -> Vec<RuntimeEvent> {
    let mut events = Vec::new();
    for job in jobs {
        events.extend(backfill_events(job, now, max_backfill));
    }
    for job in jobs {
        events.push(RuntimeEvent::TickArrived {
            job_id: job.job_id.clone(),
            logical_date: now,
            historical: false,
        });
    }
    events
}

/// Spawn the continuous ticker task. The runtime stops ticking by going
/// away: sends fail once the receiving side is dropped.
pub fn spawn_ticker(
    jobs: Vec<JobTickSpec>,
    tx: mpsc::Sender<RuntimeEvent>,
    max_backfill: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let now = Utc::now();

        for job in jobs.iter() {
            for event in backfill_events(job, now, max_backfill) {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }

        let mut handles = Vec::new();
        for job in jobs {
            let tx = tx.clone();
            handles.push(tokio::spawn(live_ticks(job, tx)));
        }
        for handle in handles {
            let _ = handle.await;
        }
    })
}

/// Sleep-until-next-tick loop for one job.
async fn live_ticks(job: JobTickSpec, tx: mpsc::Sender<RuntimeEvent>) {
    loop {
        let now = Utc::now();
        let Some(next) = job.schedule.next_tick(now) else {
            info!(job_id = %job.job_id, "schedule has no further ticks; ticker stopping");
            return;
        };

        let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
        debug!(job_id = %job.job_id, next = %next, "sleeping until next tick");
        tokio::time::sleep(wait).await;

        if tx
            .send(RuntimeEvent::TickArrived {
                job_id: job.job_id.clone(),
                logical_date: next,
                historical: false,
            })
            .await
            .is_err()
        {
            // Runtime is gone; stop ticking.
            return;
        }
    }
}
