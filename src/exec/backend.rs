// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of invoking functions
//! directly. This keeps the production invocation path in [`super::invoke`]
//! while tests swap in fakes that script outcomes without touching any
//! external system.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dag::ScheduledUnit;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::invoke::invoke_unit;
use crate::registry::FunctionRegistry;
use crate::secrets::SecretStore;
use crate::types::RetryPolicy;

/// Trait abstracting how scheduled units are executed.
///
/// Implementations are free to:
/// - invoke real capabilities in spawned tasks (production)
/// - simulate completion and emit `RuntimeEvent`s (tests)
pub trait ExecutorBackend: Send {
    fn dispatch(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: one spawned Tokio task per unit.
///
/// Units dispatched together run concurrently; the scheduler already
/// guaranteed their dependencies are satisfied. Each spawned task applies
/// the retry backoff delay, resolves the unit's secret reference, invokes
/// the bound capability, and reports a `TaskCompleted` event.
pub struct FunctionExecutorBackend {
    registry: Arc<FunctionRegistry>,
    secrets: Arc<dyn SecretStore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    retry: RetryPolicy,
}

impl FunctionExecutorBackend {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        secrets: Arc<dyn SecretStore>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            secrets,
            runtime_tx,
            retry,
        }
    }
}

impl ExecutorBackend for FunctionExecutorBackend {
    fn dispatch(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone shared handles so the future doesn't borrow `self` across
        // `await`.
        let registry = Arc::clone(&self.registry);
        let secrets = Arc::clone(&self.secrets);
        let tx = self.runtime_tx.clone();
        let retry = self.retry;

        Box::pin(async move {
            for unit in units {
                tokio::spawn(invoke_unit(
                    Arc::clone(&registry),
                    Arc::clone(&secrets),
                    tx.clone(),
                    unit,
                    retry,
                ));
            }
            Ok(())
        })
    }
}
