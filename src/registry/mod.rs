// src/registry/mod.rs

//! Function registry: maps a function name to a typed executable capability
//! and its contract.
//!
//! Registration happens at process startup and requires `&mut self`; after
//! setup the registry is shared immutably (typically behind an `Arc`) for
//! concurrent `resolve` calls from in-flight tasks. That split serializes
//! writes relative to reads without any locking.

pub mod contract;
pub mod functions;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::json;
use tracing::debug;

use crate::errors::{JobdagError, Result};
use crate::types::SideEffectClass;

pub use contract::{CapabilityContract, ParamKind, ParamSpec};
pub use functions::{Capability, InlineFunction, Invocation, PostgresSqlFunction};

/// A registered function: name, contract, and the capability that backs it.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    pub name: String,
    pub contract: CapabilityContract,
    pub capability: Capability,
}

impl FunctionBinding {
    pub fn new(name: &str, contract: CapabilityContract, capability: Capability) -> Self {
        Self {
            name: name.to_string(),
            contract,
            capability,
        }
    }
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    bindings: BTreeMap<String, FunctionBinding>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function binding.
    ///
    /// Idempotent: re-registering a name with an identical contract is a
    /// no-op; a conflicting contract fails with a `Conflict` error.
    pub fn register(&mut self, binding: FunctionBinding) -> Result<()> {
        match self.bindings.get(&binding.name) {
            Some(existing) if existing.contract == binding.contract => {
                debug!(function = %binding.name, "re-registration with identical contract; no-op");
                Ok(())
            }
            Some(_) => Err(JobdagError::Conflict {
                function: binding.name.clone(),
                reason: "already registered with a different contract".to_string(),
            }),
            None => {
                debug!(function = %binding.name, "registered function");
                self.bindings.insert(binding.name.clone(), binding);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&FunctionBinding> {
        self.bindings
            .get(name)
            .ok_or_else(|| JobdagError::FunctionNotFound {
                function: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|s| s.as_str())
    }
}

/// Registry with the built-in production functions.
pub fn builtin_registry(sql_root: &Path) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    let postgres = FunctionBinding::new(
        "PostgreSQLFunction",
        CapabilityContract::new(SideEffectClass::IdempotentWrite)
            .with_required("sql_file_path", ParamKind::Path)
            .with_optional("statement_timeout_secs", ParamKind::Integer, json!(300)),
        Capability::PostgresSql(PostgresSqlFunction::new(sql_root)),
    );

    // The built-in set is fixed; registration cannot conflict.
    registry
        .register(postgres)
        .expect("built-in registry registration is conflict-free");

    registry
}
