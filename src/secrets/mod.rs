// src/secrets/mod.rs

//! Secret resolution.
//!
//! Secrets are referenced by key in task definitions and resolved **at
//! execution time only** — never during compilation, so credentials are
//! never persisted into compiled artifacts. A resolution failure aborts only
//! the dependent task, not the whole run.
//!
//! The backing store is a pluggable collaborator behind [`SecretStore`]:
//! - [`FileSecretStore`] reads one `<key>.toml` record per key from a
//!   directory (the production default, and the shape of the original
//!   mock secret folder).
//! - [`MemorySecretStore`] serves a fixed map, for tests and demos.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{JobdagError, Result};

fn default_port() -> u16 {
    5432
}

/// Structured connection record a secret key resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionParams {
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

/// Key-to-connection-parameters lookup.
///
/// Implementations are read-mostly after initialization and must be safe to
/// call from concurrently executing tasks.
pub trait SecretStore: Send + Sync {
    fn resolve(&self, key: &str) -> Result<ConnectionParams>;
}

/// Reads `<dir>/<key>.toml` per key.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretStore for FileSecretStore {
    fn resolve(&self, key: &str) -> Result<ConnectionParams> {
        // Keys are bare file stems; reject anything that could escape the
        // store directory.
        if key.is_empty() || key.contains(['/', '\\', '.']) {
            return Err(JobdagError::SecretMalformed {
                key: key.to_string(),
                reason: "secret keys must be bare names without path separators".to_string(),
            });
        }

        let path = self.dir.join(format!("{key}.toml"));
        if !path.exists() {
            return Err(JobdagError::SecretNotFound {
                key: key.to_string(),
            });
        }

        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents).map_err(|e| JobdagError::SecretMalformed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fixed in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    entries: BTreeMap<String, ConnectionParams>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, key: &str, params: ConnectionParams) -> Self {
        self.entries.insert(key.to_string(), params);
        self
    }
}

impl SecretStore for MemorySecretStore {
    fn resolve(&self, key: &str) -> Result<ConnectionParams> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| JobdagError::SecretNotFound {
                key: key.to_string(),
            })
    }
}
