// src/spec/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{JobdagError, Result};
use crate::spec::model::{JobDefinition, RawJobSpec, TaskDefinition};
use crate::spec::schedule::Schedule;

impl TryFrom<RawJobSpec> for JobDefinition {
    type Error = JobdagError;

    fn try_from(raw: RawJobSpec) -> std::result::Result<Self, Self::Error> {
        validate_raw_spec(&raw)
    }
}

fn validation_error(job_id: &str, reason: impl Into<String>) -> JobdagError {
    JobdagError::Validation {
        job_id: job_id.to_string(),
        reason: reason.into(),
    }
}

fn validate_raw_spec(raw: &RawJobSpec) -> Result<JobDefinition> {
    let job_id = raw.job_id.trim();
    if job_id.is_empty() {
        return Err(validation_error(&raw.job_id, "job_id must not be empty"));
    }

    let schedule =
        Schedule::parse(&raw.schedule).map_err(|reason| validation_error(job_id, reason))?;

    let tasks = validate_tasks(job_id, raw)?;
    validate_dependencies(job_id, &tasks)?;
    validate_acyclic(job_id, &tasks)?;

    Ok(JobDefinition::new_unchecked(
        job_id.to_string(),
        raw.description.clone(),
        schedule,
        raw.start_date,
        raw.catchup,
        raw.tags.clone(),
        tasks,
    ))
}

/// Resolve task_ids (explicit override or task key) and reject duplicates.
fn validate_tasks(job_id: &str, raw: &RawJobSpec) -> Result<BTreeMap<String, TaskDefinition>> {
    if raw.tasks.is_empty() {
        return Err(validation_error(
            job_id,
            "job must contain at least one [tasks.<name>] section",
        ));
    }

    let mut tasks = BTreeMap::new();

    for (name, spec) in raw.tasks.iter() {
        let task_id = spec.task_id.clone().unwrap_or_else(|| name.clone());
        if task_id.trim().is_empty() {
            return Err(validation_error(
                job_id,
                format!("task '{name}': task_id must not be empty"),
            ));
        }

        if spec.function.trim().is_empty() {
            return Err(validation_error(
                job_id,
                format!("task '{task_id}': function must not be empty"),
            ));
        }

        let task = TaskDefinition {
            task_id: task_id.clone(),
            function: spec.function.clone(),
            secret_key: spec.secret_key.clone(),
            depends_on: spec.depends_on.clone(),
            kwargs: spec.kwargs.clone(),
        };

        if tasks.insert(task_id.clone(), task).is_some() {
            return Err(validation_error(
                job_id,
                format!("duplicate task_id '{task_id}'"),
            ));
        }
    }

    Ok(tasks)
}

fn validate_dependencies(job_id: &str, tasks: &BTreeMap<String, TaskDefinition>) -> Result<()> {
    for task in tasks.values() {
        for dep in task.depends_on.iter() {
            if !tasks.contains_key(dep) {
                return Err(validation_error(
                    job_id,
                    format!(
                        "task '{}' has unknown dependency '{}' in `depends_on`",
                        task.task_id, dep
                    ),
                ));
            }
            if dep == &task.task_id {
                return Err(validation_error(
                    job_id,
                    format!(
                        "task '{}' cannot depend on itself in `depends_on`",
                        task.task_id
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(job_id: &str, tasks: &BTreeMap<String, TaskDefinition>) -> Result<()> {
    // Edge direction: dep -> task. For
    //   [tasks.b]
    //   depends_on = ["a"]
    // we add edge a -> b.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task_id in tasks.keys() {
        graph.add_node(task_id.as_str());
    }

    for task in tasks.values() {
        for dep in task.depends_on.iter() {
            graph.add_edge(dep.as_str(), task.task_id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let start = cycle.node_id();
            Err(JobdagError::Cycle {
                job_id: job_id.to_string(),
                path: cycle_path_from(&graph, start),
            })
        }
    }
}

/// Recover the full task_id sequence of a cycle through `start`.
///
/// `toposort` only reports one node on a cycle; errors should name the whole
/// path, so walk the graph until we come back around.
fn cycle_path_from(graph: &DiGraphMap<&str, ()>, start: &str) -> Vec<String> {
    let mut stack: Vec<(&str, Vec<String>)> = vec![(start, vec![start.to_string()])];

    while let Some((node, path)) = stack.pop() {
        for next in graph.neighbors(node) {
            if next == start {
                let mut full = path.clone();
                full.push(start.to_string());
                return full;
            }
            if path.iter().any(|seen| seen == next) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(next.to_string());
            stack.push((next, extended));
        }
    }

    // toposort may report a node that merely reaches a cycle; fall back to
    // naming that node alone.
    vec![start.to_string()]
}
