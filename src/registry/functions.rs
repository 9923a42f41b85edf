// src/registry/functions.rs

//! The closed set of executable capabilities.
//!
//! Function dispatch is by name through the registry, but the capabilities
//! themselves are tagged variants of [`Capability`] — there is no runtime
//! plugin loading. Production deployments register [`PostgresSqlFunction`];
//! [`InlineFunction`] exists for tests and demos that need an in-process
//! function.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{JobdagError, Result};
use crate::secrets::ConnectionParams;

/// Everything a capability sees for one invocation.
///
/// The secret (if the task declared a `secret_key`) has already been
/// resolved by the executor; compiled artifacts only ever carry the key.
pub struct Invocation<'a> {
    pub job_id: &'a str,
    pub task_id: &'a str,
    pub kwargs: &'a BTreeMap<String, Value>,
    pub secret: Option<&'a ConnectionParams>,
    pub logical_date: DateTime<Utc>,
}

impl Invocation<'_> {
    fn execution_error(&self, reason: impl Into<String>) -> JobdagError {
        JobdagError::Execution {
            job_id: self.job_id.to_string(),
            task_id: self.task_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// A typed executable capability.
#[derive(Clone)]
pub enum Capability {
    /// Run a parameterized SQL file against a PostgreSQL connection.
    PostgresSql(PostgresSqlFunction),
    /// An in-process function (tests, demos).
    Inline(InlineFunction),
}

impl Capability {
    pub async fn invoke(&self, inv: &Invocation<'_>) -> Result<()> {
        match self {
            Capability::PostgresSql(f) => f.invoke(inv).await,
            Capability::Inline(f) => f.invoke(inv),
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::PostgresSql(inner) => f.debug_tuple("PostgresSql").field(inner).finish(),
            Capability::Inline(_) => f.write_str("Inline(..)"),
        }
    }
}

pub type InlineFn = dyn Fn(&Invocation<'_>) -> std::result::Result<(), String> + Send + Sync;

/// Wrapper around an in-process closure.
#[derive(Clone)]
pub struct InlineFunction {
    f: Arc<InlineFn>,
}

impl InlineFunction {
    pub fn new(f: impl Fn(&Invocation<'_>) -> std::result::Result<(), String> + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    fn invoke(&self, inv: &Invocation<'_>) -> Result<()> {
        (self.f)(inv).map_err(|reason| inv.execution_error(reason))
    }
}

/// Executes a SQL file against PostgreSQL.
///
/// The file is resolved against `sql_root`, rendered with the single
/// `execution_date` template parameter, and executed on a connection built
/// from the invocation's resolved secret.
#[derive(Debug, Clone)]
pub struct PostgresSqlFunction {
    sql_root: PathBuf,
}

impl PostgresSqlFunction {
    pub fn new(sql_root: impl Into<PathBuf>) -> Self {
        Self {
            sql_root: sql_root.into(),
        }
    }

    async fn invoke(&self, inv: &Invocation<'_>) -> Result<()> {
        let secret = inv.secret.ok_or_else(|| {
            inv.execution_error("PostgreSQLFunction requires a secret_key on the task")
        })?;

        let rel_path = inv
            .kwargs
            .get("sql_file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| inv.execution_error("kwarg 'sql_file_path' must be a string"))?;

        let path = self.sql_root.join(rel_path);
        let template = tokio::fs::read_to_string(&path).await.map_err(|e| {
            inv.execution_error(format!("reading SQL file '{}': {e}", path.display()))
        })?;

        let mut sql = render_sql(&template, inv.logical_date)
            .map_err(|reason| inv.execution_error(reason))?;

        if let Some(secs) = inv
            .kwargs
            .get("statement_timeout_secs")
            .and_then(Value::as_i64)
        {
            sql = format!("SET statement_timeout = '{secs}s';\n{sql}");
        }

        debug!(
            job_id = %inv.job_id,
            task_id = %inv.task_id,
            sql_file = %path.display(),
            "executing SQL statement"
        );

        let (client, connection) = secret
            .pg_config()
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| inv.execution_error(format!("connecting to postgres: {e}")))?;

        // The connection future drives the socket; it resolves once the
        // client is dropped.
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection terminated with error");
            }
        });

        let exec_result = client.batch_execute(&sql).await;
        drop(client);
        let _ = driver.await;

        exec_result.map_err(|e| inv.execution_error(format!("executing SQL: {e}")))?;

        info!(
            job_id = %inv.job_id,
            task_id = %inv.task_id,
            "SQL statement executed and committed"
        );
        Ok(())
    }
}

/// Render the SQL template, substituting the `execution_date` parameter
/// (`{{ execution_date }}`, formatted `YYYY-MM-DD`).
fn render_sql(template: &str, logical_date: DateTime<Utc>) -> std::result::Result<String, String> {
    let mut env = minijinja::Environment::new();
    env.add_template("statement", template)
        .map_err(|e| format!("invalid SQL template: {e}"))?;
    let tmpl = env
        .get_template("statement")
        .map_err(|e| format!("invalid SQL template: {e}"))?;
    tmpl.render(minijinja::context! {
        execution_date => logical_date.format("%Y-%m-%d").to_string(),
    })
    .map_err(|e| format!("rendering SQL template: {e}"))
}
