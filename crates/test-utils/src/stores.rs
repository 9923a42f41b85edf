use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jobdag::errors::Result;
use jobdag::secrets::{ConnectionParams, SecretStore};

/// Connection parameters pointing at nothing in particular.
pub fn dummy_params() -> ConnectionParams {
    ConnectionParams {
        host: "localhost".to_string(),
        port: 5432,
        database: "testdb".to_string(),
        user: "tester".to_string(),
        password: "secret".to_string(),
    }
}

/// Wraps any `SecretStore` and counts `resolve` calls.
pub struct CountingSecretStore<S> {
    inner: S,
    resolutions: Arc<AtomicUsize>,
}

impl<S: SecretStore> CountingSecretStore<S> {
    pub fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let resolutions = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                resolutions: Arc::clone(&resolutions),
            },
            resolutions,
        )
    }
}

impl<S: SecretStore> SecretStore for CountingSecretStore<S> {
    fn resolve(&self, key: &str) -> Result<ConnectionParams> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(key)
    }
}
