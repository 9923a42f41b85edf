// src/compile/mod.rs

//! DAG compiler: translates a validated [`JobDefinition`] plus its function
//! bindings into engine-executable [`CompiledUnit`]s and dependency edges.
//!
//! Compilation is deterministic: tasks iterate in task_id order (BTreeMap),
//! kwargs live in ordered maps, and edges are emitted sorted, so recompiling
//! the same definition produces byte-identical artifacts.
//!
//! Secrets are never resolved here; a `secret_key` is carried through as a
//! reference for the executor to resolve at run time.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{JobdagError, Result};
use crate::registry::{CapabilityContract, FunctionRegistry};
use crate::spec::JobDefinition;
use crate::types::{KwargStrictness, SideEffectClass};

/// Engine-executable artifact derived from one task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Stable identifier: `<job_id>.<task_id>`.
    pub unit_id: String,
    pub job_id: String,
    pub task_id: String,
    pub function: String,
    /// Denormalized from the function binding so the scheduler can decide
    /// retry safety without registry access.
    pub side_effect: SideEffectClass,
    /// Carried as a reference; resolved only at execution time.
    pub secret_key: Option<String>,
    /// Validated kwargs with contract defaults filled in.
    pub kwargs: BTreeMap<String, Value>,
    /// Upstream task_ids, sorted.
    pub depends_on: Vec<String>,
}

/// One dependency edge in engine-native form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub upstream: String,
    pub downstream: String,
}

/// The compiled form of a whole job, ready for artifact emission and
/// scheduling. This is what outlives the `JobDefinition` it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledJob {
    pub job_id: String,
    pub description: String,
    pub schedule: String,
    pub start_date: NaiveDate,
    pub catchup: bool,
    pub tags: Vec<String>,
    /// Sorted by task_id.
    pub units: Vec<CompiledUnit>,
    /// Sorted lexicographically.
    pub edges: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub strictness: KwargStrictness,
}

/// Compile a single job definition.
pub fn compile(
    job: &JobDefinition,
    registry: &FunctionRegistry,
    options: &CompileOptions,
) -> Result<CompiledJob> {
    let mut units = Vec::with_capacity(job.tasks.len());
    let mut edges = Vec::new();

    // BTreeMap iteration gives task_id order; no incidental map ordering can
    // leak into the generated artifact.
    for task in job.tasks.values() {
        let binding = registry.resolve(&task.function)?;

        let kwargs = validate_kwargs(
            &job.job_id,
            &task.task_id,
            &binding.contract,
            &task.kwargs,
            options.strictness,
        )?;

        let mut depends_on = task.depends_on.clone();
        depends_on.sort();
        depends_on.dedup();

        for upstream in depends_on.iter() {
            edges.push(DependencyEdge {
                upstream: upstream.clone(),
                downstream: task.task_id.clone(),
            });
        }

        units.push(CompiledUnit {
            unit_id: format!("{}.{}", job.job_id, task.task_id),
            job_id: job.job_id.clone(),
            task_id: task.task_id.clone(),
            function: task.function.clone(),
            side_effect: binding.contract.side_effect,
            secret_key: task.secret_key.clone(),
            kwargs,
            depends_on,
        });
    }

    edges.sort();

    debug!(
        job_id = %job.job_id,
        units = units.len(),
        edges = edges.len(),
        "compiled job definition"
    );

    Ok(CompiledJob {
        job_id: job.job_id.clone(),
        description: job.description.clone(),
        schedule: job.schedule.expression().to_string(),
        start_date: job.start_date,
        catchup: job.catchup,
        tags: job.tags.clone(),
        units,
        edges,
    })
}

/// Compile a batch of jobs; a contract violation aborts only the offending
/// job, never its siblings.
pub fn compile_batch(
    jobs: &[JobDefinition],
    registry: &FunctionRegistry,
    options: &CompileOptions,
) -> (Vec<CompiledJob>, Vec<(String, JobdagError)>) {
    let mut compiled = Vec::new();
    let mut failures = Vec::new();

    for job in jobs {
        match compile(job, registry, options) {
            Ok(c) => compiled.push(c),
            Err(err) => {
                warn!(job_id = %job.job_id, error = %err, "job failed to compile");
                failures.push((job.job_id.clone(), err));
            }
        }
    }

    (compiled, failures)
}

/// Check supplied kwargs against the contract: required present, kinds
/// compatible, defaults filled, unknowns handled per strictness.
fn validate_kwargs(
    job_id: &str,
    task_id: &str,
    contract: &CapabilityContract,
    supplied: &BTreeMap<String, Value>,
    strictness: KwargStrictness,
) -> Result<BTreeMap<String, Value>> {
    let arg_error = |reason: String| JobdagError::Validation {
        job_id: job_id.to_string(),
        reason: format!("task '{task_id}': {reason}"),
    };

    let mut resolved = BTreeMap::new();

    for (name, spec) in contract.params.iter() {
        match supplied.get(name) {
            Some(value) if spec.kind.matches(value) => {
                resolved.insert(name.clone(), value.clone());
            }
            Some(value) => {
                return Err(arg_error(format!(
                    "kwarg '{name}' expects {} but got {value}",
                    spec.kind.describe()
                )));
            }
            None => match &spec.default {
                Some(default) => {
                    resolved.insert(name.clone(), default.clone());
                }
                None => {
                    return Err(arg_error(format!("missing required kwarg '{name}'")));
                }
            },
        }
    }

    for (name, value) in supplied.iter() {
        if contract.params.contains_key(name) {
            continue;
        }
        match strictness {
            KwargStrictness::Reject => {
                return Err(arg_error(format!("unknown kwarg '{name}'")));
            }
            KwargStrictness::Passthrough => {
                resolved.insert(name.clone(), value.clone());
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::registry::{
        Capability, CapabilityContract, FunctionBinding, FunctionRegistry, InlineFunction,
        ParamKind, builtin_registry,
    };
    use crate::spec::model::{RawJobSpec, RawTaskSpec};
    use crate::types::SideEffectClass;

    use super::*;

    fn test_registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry
            .register(FunctionBinding::new(
                "Copy",
                CapabilityContract::new(SideEffectClass::IdempotentWrite)
                    .with_required("source", ParamKind::String)
                    .with_optional("batch_size", ParamKind::Integer, json!(500)),
                Capability::Inline(InlineFunction::new(|_| Ok(()))),
            ))
            .unwrap();
        registry
    }

    fn job_with_task(kwargs: BTreeMap<String, Value>) -> JobDefinition {
        let raw = RawJobSpec {
            job_id: "demo".to_string(),
            description: String::new(),
            schedule: "@daily".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            catchup: false,
            tags: Vec::new(),
            tasks: [(
                "copy_task".to_string(),
                RawTaskSpec {
                    function: "Copy".to_string(),
                    task_id: None,
                    secret_key: None,
                    depends_on: Vec::new(),
                    kwargs,
                },
            )]
            .into_iter()
            .collect(),
        };
        JobDefinition::try_from(raw).unwrap()
    }

    #[test]
    fn fills_defaults_and_keeps_supplied_kwargs() {
        let job = job_with_task([("source".to_string(), json!("upstream"))].into());
        let compiled = compile(&job, &test_registry(), &CompileOptions::default()).unwrap();

        assert_eq!(compiled.units.len(), 1);
        let unit = &compiled.units[0];
        assert_eq!(unit.unit_id, "demo.copy_task");
        assert_eq!(unit.kwargs["source"], json!("upstream"));
        assert_eq!(unit.kwargs["batch_size"], json!(500));
        assert_eq!(unit.side_effect, SideEffectClass::IdempotentWrite);
    }

    #[test]
    fn missing_required_kwarg_fails_with_task_context() {
        let job = job_with_task(BTreeMap::new());
        let err = compile(&job, &test_registry(), &CompileOptions::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("demo"));
        assert!(msg.contains("copy_task"));
        assert!(msg.contains("missing required kwarg 'source'"));
    }

    #[test]
    fn kind_mismatch_fails() {
        let job = job_with_task(
            [
                ("source".to_string(), json!("upstream")),
                ("batch_size".to_string(), json!("lots")),
            ]
            .into(),
        );
        let err = compile(&job, &test_registry(), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("expects integer"));
    }

    #[test]
    fn unknown_kwarg_rejected_by_default_passed_through_when_configured() {
        let kwargs: BTreeMap<String, Value> = [
            ("source".to_string(), json!("upstream")),
            ("color".to_string(), json!("blue")),
        ]
        .into();

        let job = job_with_task(kwargs);
        let err = compile(&job, &test_registry(), &CompileOptions::default()).unwrap_err();
        assert!(err.to_string().contains("unknown kwarg 'color'"));

        let lenient = CompileOptions {
            strictness: KwargStrictness::Passthrough,
        };
        let compiled = compile(&job, &test_registry(), &lenient).unwrap();
        assert_eq!(compiled.units[0].kwargs["color"], json!("blue"));
    }

    #[test]
    fn unknown_function_fails_that_job_only() {
        let good = job_with_task([("source".to_string(), json!("upstream"))].into());
        let mut bad = good.clone();
        bad.job_id = "broken".to_string();
        bad.tasks.get_mut("copy_task").unwrap().function = "Ghost".to_string();

        let (compiled, failures) = compile_batch(
            &[bad, good],
            &test_registry(),
            &CompileOptions::default(),
        );
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].job_id, "demo");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(matches!(
            failures[0].1,
            JobdagError::FunctionNotFound { .. }
        ));
    }

    #[test]
    fn compilation_is_deterministic() {
        let job = job_with_task([("source".to_string(), json!("upstream"))].into());
        let registry = test_registry();
        let first = compile(&job, &registry, &CompileOptions::default()).unwrap();
        let second = compile(&job, &registry, &CompileOptions::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string_pretty(&first).unwrap(),
            serde_json::to_string_pretty(&second).unwrap()
        );
    }

    #[test]
    fn single_task_postgres_job_compiles_to_one_unit_no_edges() {
        let raw = RawJobSpec {
            job_id: "derived_dataset_materialize_sink".to_string(),
            description: String::new(),
            schedule: "@daily".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            catchup: false,
            tags: Vec::new(),
            tasks: [(
                "postgres_transformation_task".to_string(),
                RawTaskSpec {
                    function: "PostgreSQLFunction".to_string(),
                    task_id: None,
                    secret_key: Some("postgres_credentials".to_string()),
                    depends_on: Vec::new(),
                    kwargs: [(
                        "sql_file_path".to_string(),
                        json!("transform_source_to_sink.sql"),
                    )]
                    .into(),
                },
            )]
            .into_iter()
            .collect(),
        };
        let job = JobDefinition::try_from(raw).unwrap();
        let registry = builtin_registry(std::path::Path::new("sql"));

        let compiled = compile(&job, &registry, &CompileOptions::default()).unwrap();
        assert_eq!(compiled.units.len(), 1);
        assert!(compiled.edges.is_empty());

        let unit = &compiled.units[0];
        assert_eq!(
            unit.unit_id,
            "derived_dataset_materialize_sink.postgres_transformation_task"
        );
        assert_eq!(unit.secret_key.as_deref(), Some("postgres_credentials"));
        assert_eq!(
            unit.kwargs["sql_file_path"],
            json!("transform_source_to_sink.sql")
        );
    }

    #[test]
    fn edges_are_sorted_and_deduplicated() {
        let raw = RawJobSpec {
            job_id: "fanout".to_string(),
            description: String::new(),
            schedule: "@daily".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            catchup: false,
            tags: Vec::new(),
            tasks: [
                (
                    "a".to_string(),
                    RawTaskSpec {
                        function: "Copy".to_string(),
                        task_id: None,
                        secret_key: None,
                        depends_on: Vec::new(),
                        kwargs: [("source".to_string(), json!("s"))].into(),
                    },
                ),
                (
                    "b".to_string(),
                    RawTaskSpec {
                        function: "Copy".to_string(),
                        task_id: None,
                        secret_key: None,
                        depends_on: vec!["a".to_string(), "a".to_string()],
                        kwargs: [("source".to_string(), json!("s"))].into(),
                    },
                ),
                (
                    "c".to_string(),
                    RawTaskSpec {
                        function: "Copy".to_string(),
                        task_id: None,
                        secret_key: None,
                        depends_on: vec!["b".to_string(), "a".to_string()],
                        kwargs: [("source".to_string(), json!("s"))].into(),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        };
        let job = JobDefinition::try_from(raw).unwrap();
        let compiled = compile(&job, &test_registry(), &CompileOptions::default()).unwrap();

        let edges: Vec<(&str, &str)> = compiled
            .edges
            .iter()
            .map(|e| (e.upstream.as_str(), e.downstream.as_str()))
            .collect();
        assert_eq!(edges, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    }
}
