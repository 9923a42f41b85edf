// src/spec/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{JobdagError, Result};
use crate::spec::model::{JobDefinition, RawJobSpec};

/// Load a job specification from a path and return the raw `RawJobSpec`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependency resolution, cycle detection, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawJobSpec> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let spec: RawJobSpec = toml::from_str(&contents)?;

    Ok(spec)
}

/// Load a job specification from path and run semantic validation.
///
/// This is the recommended entry point for a single file:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks job_id, schedule syntax, dependency references, and acyclicity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobDefinition> {
    let raw = load_from_path(&path)?;
    let job = JobDefinition::try_from(raw)?;
    Ok(job)
}

/// Result of loading a directory of job specifications.
///
/// Per-file failures are collected instead of aborting the batch, so one
/// malformed definition never blocks its siblings from loading.
#[derive(Debug)]
pub struct BatchLoad {
    pub jobs: Vec<JobDefinition>,
    pub failures: Vec<(PathBuf, JobdagError)>,
}

impl BatchLoad {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load every `*.toml` file in a directory.
///
/// Fails outright only if the directory itself cannot be read. Within the
/// batch, `job_id` uniqueness is enforced: a file re-declaring an already
/// loaded job_id is recorded as a failure.
pub fn load_batch(dir: impl AsRef<Path>) -> Result<BatchLoad> {
    let dir = dir.as_ref();

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    // Deterministic load order regardless of directory iteration order.
    paths.sort();

    let mut jobs: Vec<JobDefinition> = Vec::new();
    let mut failures = Vec::new();

    for path in paths {
        match load_and_validate(&path) {
            Ok(job) => {
                if let Some(existing) = jobs.iter().find(|j| j.job_id == job.job_id) {
                    failures.push((
                        path,
                        JobdagError::Validation {
                            job_id: job.job_id.clone(),
                            reason: format!(
                                "job_id '{}' is already defined in this batch",
                                existing.job_id
                            ),
                        },
                    ));
                    continue;
                }
                debug!(job_id = %job.job_id, path = %path.display(), "loaded job definition");
                jobs.push(job);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load job definition");
                failures.push((path, err));
            }
        }
    }

    Ok(BatchLoad { jobs, failures })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const GOOD_JOB: &str = r#"
job_id = "derived_dataset_materialize_sink"
description = "Materialize the derived dataset into the sink table"
schedule = "@daily"
start_date = "2024-01-01"
catchup = false
tags = ["reporting"]

[tasks.postgres_transformation_task]
function = "PostgreSQLFunction"
secret_key = "postgres_credentials"

[tasks.postgres_transformation_task.kwargs]
sql_file_path = "transform_source_to_sink.sql"
"#;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_and_validates_a_job_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "sink.toml", GOOD_JOB);

        let job = load_and_validate(&path).unwrap();
        assert_eq!(job.job_id, "derived_dataset_materialize_sink");
        assert_eq!(job.tasks.len(), 1);

        let task = &job.tasks["postgres_transformation_task"];
        assert_eq!(task.function, "PostgreSQLFunction");
        assert_eq!(task.secret_key.as_deref(), Some("postgres_credentials"));
        assert_eq!(
            task.kwargs["sql_file_path"],
            serde_json::json!("transform_source_to_sink.sql")
        );
    }

    #[test]
    fn batch_isolates_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.toml", GOOD_JOB);
        write_file(dir.path(), "bad.toml", "job_id = 42\n");

        let batch = load_batch(dir.path()).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].0.ends_with("bad.toml"));
    }

    #[test]
    fn batch_rejects_duplicate_job_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.toml", GOOD_JOB);
        write_file(dir.path(), "b.toml", GOOD_JOB);

        let batch = load_batch(dir.path()).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].1.to_string().contains("already defined"));
    }

    #[test]
    fn non_toml_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.toml", GOOD_JOB);
        write_file(dir.path(), "notes.txt", "not a job");

        let batch = load_batch(dir.path()).unwrap();
        assert_eq!(batch.jobs.len(), 1);
        assert!(batch.is_clean());
    }
}
