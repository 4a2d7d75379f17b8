//! Queue entries and the views observers receive.

use super::outputs::OutputHandle;
use crate::error::FileError;
use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Identifies a task for the lifetime of its orchestrator. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `pending → processing → completed | error`. No other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        })
    }
}

/// Where a file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Already in memory (uploads, downloads, tests).
    Memory(Arc<[u8]>),
    /// Read lazily when the file is processed.
    Path(PathBuf),
}

impl FileSource {
    /// Size known without reading the content.
    ///
    /// `None` when a path cannot be inspected; the size is then taken from
    /// the loaded bytes once the file is processed.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            FileSource::Memory(bytes) => Some(bytes.len() as u64),
            FileSource::Path(path) => match std::fs::metadata(path) {
                Ok(meta) => Some(meta.len()),
                Err(e) => {
                    warn!("Cannot stat '{}': {}", path.display(), e);
                    None
                }
            },
        }
    }

    pub async fn load(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            FileSource::Memory(bytes) => Ok(Arc::clone(bytes)),
            FileSource::Path(path) => Ok(tokio::fs::read(path).await?.into()),
        }
    }
}

/// A named file handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub source: FileSource,
}

impl InputFile {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// Named after the path's final component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            source: FileSource::Path(path),
        }
    }
}

/// One queued file and everything known about it.
#[derive(Debug)]
pub(crate) struct FileTask {
    pub id: TaskId,
    pub input: InputFile,
    /// Set when the task was queued by a run with its own settings.
    /// Otherwise the run that picks it up supplies the pipeline.
    pub pipeline: Option<Arc<Pipeline>>,
    pub original_size: u64,
    pub status: TaskStatus,
    pub output: Option<OutputHandle>,
    pub output_size: Option<u64>,
    pub error: Option<FileError>,
}

impl FileTask {
    pub fn new(id: TaskId, input: InputFile) -> Self {
        let original_size = input.source.size_hint().unwrap_or(0);
        Self {
            id,
            input,
            pipeline: None,
            original_size,
            status: TaskStatus::Pending,
            output: None,
            output_size: None,
            error: None,
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.input.name.clone(),
            original_size: self.original_size,
            status: self.status,
            output_size: self.output_size,
            error: self.error.clone(),
        }
    }
}

/// Byte-free view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub original_size: u64,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<FileError>,
}

/// One task transition, delivered to every event subscriber.
///
/// Unlike the snapshot list, events are not coalesced: a subscriber that
/// keeps up sees `Pending`, `Processing` and the terminal status for every
/// task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum TaskEvent {
    Status { id: TaskId, status: TaskStatus },
    Removed { id: TaskId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending_with_size() {
        let task = FileTask::new(TaskId(1), InputFile::from_bytes("a.glb", vec![0u8; 64]));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.original_size, 64);
        assert!(task.output.is_none());
    }

    #[test]
    fn path_source_size_comes_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.glb");
        std::fs::write(&path, [1u8; 10]).unwrap();
        let input = InputFile::from_path(&path);
        assert_eq!(input.name, "m.glb");
        assert_eq!(input.source.size_hint(), Some(10));
    }

    #[tokio::test]
    async fn missing_path_fails_to_load() {
        let source = FileSource::Path(PathBuf::from("/definitely/not/here.glb"));
        assert_eq!(source.size_hint(), None);
        assert!(source.load().await.is_err());
    }

    #[test]
    fn snapshot_serialises_status_lowercase() {
        let task = FileTask::new(TaskId(7), InputFile::from_bytes("a.glb", vec![1u8]));
        let json = serde_json::to_value(task.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["id"], 7);
        assert!(json.get("outputSize").is_none());
    }

    #[test]
    fn event_serialises_with_tag() {
        let event = TaskEvent::Status {
            id: TaskId(3),
            status: TaskStatus::Processing,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["event"], "status");
        assert_eq!(json["status"], "processing");
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }
}
