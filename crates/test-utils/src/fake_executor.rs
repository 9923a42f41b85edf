use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use jobdag::dag::ScheduledUnit;
use jobdag::engine::{RuntimeEvent, TaskOutcome};
use jobdag::errors::Result;
use jobdag::exec::ExecutorBackend;

/// A fake executor that:
/// - records which units were "run" (task_ids, in dispatch order)
/// - immediately reports `TaskCompleted(Success)` for each.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for u in units {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(u.unit.task_id.clone());
                }

                tx.send(RuntimeEvent::TaskCompleted {
                    run: u.run.clone(),
                    task_id: u.unit.task_id.clone(),
                    outcome: TaskOutcome::Success,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}

/// A fake executor with scripted outcomes per task.
///
/// Each dispatch of `task_id` pops the next outcome from its queue; when the
/// queue is empty the task succeeds. Useful for retry tests ("fail once,
/// then succeed").
pub struct ScriptedExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    outcomes: Arc<Mutex<HashMap<String, VecDeque<TaskOutcome>>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            outcomes: Arc::new(Mutex::new(HashMap::new())),
            executed,
        }
    }

    /// Queue an outcome for the next dispatch of `task_id`.
    pub fn script(&self, task_id: &str, outcome: TaskOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .push_back(outcome);
    }
}

impl ExecutorBackend for ScriptedExecutor {
    fn dispatch(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let outcomes = Arc::clone(&self.outcomes);
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for u in units {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(u.unit.task_id.clone());
                }

                let outcome = outcomes
                    .lock()
                    .unwrap()
                    .get_mut(&u.unit.task_id)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(TaskOutcome::Success);

                tx.send(RuntimeEvent::TaskCompleted {
                    run: u.run.clone(),
                    task_id: u.unit.task_id.clone(),
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
