// src/artifact/mod.rs

//! Engine artifact emission.
//!
//! Each compiled job is written as one JSON document,
//! `<out_dir>/<job_id>.json`, containing the job's unit definitions linked
//! by their dependency declarations. The target engine discovers artifacts
//! by scanning that directory.
//!
//! Regeneration is idempotent: a file is rewritten only when its content
//! differs from what compilation produced, so unchanged jobs keep their
//! mtimes and downstream artifact-watchers stay quiet. Foreign files in the
//! output directory are never touched.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::compile::CompiledJob;
use crate::errors::Result;

/// Outcome of one emission pass.
#[derive(Debug, Default)]
pub struct EmitSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

pub fn artifact_path(out_dir: &Path, job_id: &str) -> PathBuf {
    out_dir.join(format!("{job_id}.json"))
}

/// Serialize one compiled job to its canonical artifact form.
///
/// All maps in [`CompiledJob`] are ordered, so this is byte-deterministic.
pub fn render_artifact(job: &CompiledJob) -> Result<String> {
    let mut rendered = serde_json::to_string_pretty(job)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Write artifacts for the given jobs into `out_dir`, creating it if needed.
pub fn emit_artifacts(jobs: &[CompiledJob], out_dir: &Path) -> Result<EmitSummary> {
    fs::create_dir_all(out_dir)?;

    let mut summary = EmitSummary::default();

    for job in jobs {
        let path = artifact_path(out_dir, &job.job_id);
        let rendered = render_artifact(job)?;

        let existing = match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if existing.as_deref() == Some(rendered.as_str()) {
            debug!(job_id = %job.job_id, path = %path.display(), "artifact unchanged; skipping");
            summary.unchanged.push(path);
            continue;
        }

        fs::write(&path, rendered)?;
        info!(job_id = %job.job_id, path = %path.display(), "artifact written");
        summary.written.push(path);
    }

    Ok(summary)
}
