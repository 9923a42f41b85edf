// src/dag/graph.rs

//! Adjacency view over a compiled job's dependency edges.

use std::collections::BTreeMap;

use crate::compile::CompiledJob;

/// Dependency adjacency in both directions.
///
/// Built from a [`CompiledJob`], whose edges were validated acyclic at parse
/// time. Maps are ordered so iteration is deterministic.
#[derive(Debug, Clone)]
pub struct DagGraph {
    /// task_id -> upstream task_ids.
    dependencies: BTreeMap<String, Vec<String>>,
    /// task_id -> downstream task_ids.
    dependents: BTreeMap<String, Vec<String>>,
}

impl DagGraph {
    pub fn from_compiled(job: &CompiledJob) -> Self {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for unit in job.units.iter() {
            dependencies
                .entry(unit.task_id.clone())
                .or_default()
                .extend(unit.depends_on.iter().cloned());
            dependents.entry(unit.task_id.clone()).or_default();
        }

        for edge in job.edges.iter() {
            dependents
                .entry(edge.upstream.clone())
                .or_default()
                .push(edge.downstream.clone());
        }

        Self {
            dependencies,
            dependents,
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(|s| s.as_str())
    }

    pub fn dependencies_of(&self, task_id: &str) -> &[String] {
        self.dependencies
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, task_id: &str) -> &[String] {
        self.dependents
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
