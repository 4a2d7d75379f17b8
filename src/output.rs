//! Output naming, batch statistics, and writing results to disk.

use crate::batch::{TaskSnapshot, TaskStatus};
use crate::error::OptimizeError;
use crate::settings::UserSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Derive the download name for an optimised file.
///
/// The trailing `.glb` (any case) is stripped, the base is cut to
/// `max_file_name_length` characters when shortening is on, and the suffix
/// plus `.glb` is appended.
///
/// ```rust
/// use glb_optimize::{output::format_file_name, UserSettings};
///
/// let user = UserSettings::default();
/// assert_eq!(format_file_name("chair.glb", &user), "chair_optimized.glb");
/// ```
pub fn format_file_name(name: &str, user: &UserSettings) -> String {
    let base = strip_glb(name);
    let base: String = if user.shorten_file_names && base.chars().count() > user.max_file_name_length
    {
        base.chars().take(user.max_file_name_length).collect()
    } else {
        base.to_string()
    };
    format!("{base}{}.glb", user.file_name_suffix)
}

fn strip_glb(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match (name.get(..split), name.get(split..)) {
        (Some(base), Some(ext)) if ext.eq_ignore_ascii_case(".glb") => base,
        _ => name,
    }
}

/// Percentage saved going from `original` to `output` bytes.
///
/// Negative when the output grew; `0.0` for an empty original.
pub fn reduction_percent(original: u64, output: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - output as f64) / original as f64 * 100.0
}

/// Aggregate outcome of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Files that reached a terminal state in this run.
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Sum of original sizes over completed files.
    pub original_bytes: u64,
    /// Sum of output sizes over completed files.
    pub output_bytes: u64,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn from_snapshots(tasks: &[TaskSnapshot], elapsed_ms: u64) -> Self {
        let mut summary = Self {
            elapsed_ms,
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Completed => {
                    summary.total += 1;
                    summary.completed += 1;
                    summary.original_bytes += task.original_size;
                    summary.output_bytes += task.output_size.unwrap_or(0);
                }
                TaskStatus::Error => {
                    summary.total += 1;
                    summary.failed += 1;
                }
                TaskStatus::Pending | TaskStatus::Processing => {}
            }
        }
        summary
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_bytes, self.output_bytes)
    }
}

/// A completed output ready to be written.
#[derive(Debug, Clone)]
pub struct CompletedOutput {
    pub task: TaskSnapshot,
    pub bytes: Arc<[u8]>,
}

/// Write every output into `dir` under its derived name.
///
/// Names that collide within one call get a `-2`, `-3`, ... counter before
/// the extension. Each file is written to a temporary name and renamed into
/// place so a crash never leaves a truncated model behind.
pub async fn write_outputs(
    dir: &Path,
    outputs: &[CompletedOutput],
    user: &UserSettings,
) -> Result<Vec<PathBuf>, OptimizeError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OptimizeError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let name = unique_name(&format_file_name(&output.task.name, user), &mut used);
        let path = dir.join(&name);
        write_atomic(&path, &output.bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), output.bytes.len());
        written.push(path);
    }
    info!("Wrote {} file(s) to {}", written.len(), dir.display());
    Ok(written)
}

fn unique_name(candidate: &str, used: &mut HashSet<String>) -> String {
    if used.insert(candidate.to_string()) {
        return candidate.to_string();
    }
    let base = strip_glb(candidate);
    let mut n = 2;
    loop {
        let name = format!("{base}-{n}.glb");
        if used.insert(name.clone()) {
            return name;
        }
        n += 1;
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OptimizeError> {
    let err = |source| OptimizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let tmp = path.with_extension("glb.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(err)?;
    tokio::fs::rename(&tmp, path).await.map_err(err)?;
    Ok(())
}
