#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Value, json};

use jobdag::compile::{CompileOptions, CompiledJob, compile};
use jobdag::registry::{
    Capability, CapabilityContract, FunctionBinding, FunctionRegistry, InlineFunction, ParamKind,
};
use jobdag::spec::{JobDefinition, RawJobSpec, RawTaskSpec};
use jobdag::types::SideEffectClass;

/// Builder for `JobDefinition` to simplify test setup.
pub struct JobSpecBuilder {
    spec: RawJobSpec,
}

impl JobSpecBuilder {
    pub fn new(job_id: &str) -> Self {
        Self {
            spec: RawJobSpec {
                job_id: job_id.to_string(),
                description: String::new(),
                schedule: "@daily".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                catchup: false,
                tags: Vec::new(),
                tasks: BTreeMap::new(),
            },
        }
    }

    pub fn schedule(mut self, expr: &str) -> Self {
        self.spec.schedule = expr.to_string();
        self
    }

    pub fn catchup(mut self, val: bool) -> Self {
        self.spec.catchup = val;
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.spec.start_date = date;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.spec.tags.push(tag.to_string());
        self
    }

    pub fn with_task(mut self, name: &str, task: RawTaskSpec) -> Self {
        self.spec.tasks.insert(name.to_string(), task);
        self
    }

    pub fn build(self) -> JobDefinition {
        JobDefinition::try_from(self.spec).expect("Failed to build valid job from builder")
    }

    /// Build and compile against the given registry in one step.
    pub fn compile(self, registry: &FunctionRegistry) -> CompiledJob {
        let job = self.build();
        compile(&job, registry, &CompileOptions::default())
            .expect("Failed to compile job from builder")
    }
}

/// Builder for `RawTaskSpec`.
pub struct TaskSpecBuilder {
    task: RawTaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(function: &str) -> Self {
        Self {
            task: RawTaskSpec {
                function: function.to_string(),
                task_id: None,
                secret_key: None,
                depends_on: Vec::new(),
                kwargs: BTreeMap::new(),
            },
        }
    }

    pub fn task_id(mut self, id: &str) -> Self {
        self.task.task_id = Some(id.to_string());
        self
    }

    pub fn secret_key(mut self, key: &str) -> Self {
        self.task.secret_key = Some(key.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn kwarg(mut self, name: &str, value: Value) -> Self {
        self.task.kwargs.insert(name.to_string(), value);
        self
    }

    pub fn build(self) -> RawTaskSpec {
        self.task
    }
}

/// Registry with inline no-op functions covering each side-effect class:
///
/// - `noop_read` (`ReadOnly`)
/// - `noop_write` (`IdempotentWrite`)
/// - `noop_volatile` (`NonIdempotent`)
///
/// All accept an optional string kwarg `label`.
pub fn test_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();

    let classes = [
        ("noop_read", SideEffectClass::ReadOnly),
        ("noop_write", SideEffectClass::IdempotentWrite),
        ("noop_volatile", SideEffectClass::NonIdempotent),
    ];

    for (name, class) in classes {
        registry
            .register(FunctionBinding::new(
                name,
                CapabilityContract::new(class).with_optional(
                    "label",
                    ParamKind::String,
                    json!(""),
                ),
                Capability::Inline(InlineFunction::new(|_| Ok(()))),
            ))
            .expect("test registry registration cannot conflict");
    }

    registry
}
