// src/registry/contract.rs

//! Capability contracts.
//!
//! A contract declares the keyword parameters a function accepts (required,
//! or optional with a default) and the function's side-effect class. The
//! compiler validates task kwargs against the contract; the scheduler reads
//! the side-effect class off the compiled unit to decide retry safety.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::SideEffectClass;

/// Semantic kind of a keyword parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    /// A string interpreted as a file path relative to a configured root.
    Path,
    List,
    Mapping,
}

impl ParamKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String | ParamKind::Path => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Float => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::List => value.is_array(),
            ParamKind::Mapping => value.is_object(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Float => "float",
            ParamKind::Boolean => "boolean",
            ParamKind::Path => "path",
            ParamKind::List => "list",
            ParamKind::Mapping => "mapping",
        }
    }
}

/// One declared keyword parameter. Required iff `default` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(kind: ParamKind) -> Self {
        Self {
            kind,
            default: None,
        }
    }

    pub fn optional(kind: ParamKind, default: Value) -> Self {
        Self {
            kind,
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The full capability contract for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityContract {
    pub params: BTreeMap<String, ParamSpec>,
    pub side_effect: SideEffectClass,
}

impl CapabilityContract {
    pub fn new(side_effect: SideEffectClass) -> Self {
        Self {
            params: BTreeMap::new(),
            side_effect,
        }
    }

    pub fn with_required(mut self, name: &str, kind: ParamKind) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::required(kind));
        self
    }

    pub fn with_optional(mut self, name: &str, kind: ParamKind, default: Value) -> Self {
        self.params
            .insert(name.to_string(), ParamSpec::optional(kind, default));
        self
    }
}
