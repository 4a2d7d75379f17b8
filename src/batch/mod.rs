//! Batch processing of queued files.
//!
//! 1. [`task`]         — queue entries, status, byte-free snapshots
//! 2. [`outputs`]      — one owned handle per produced buffer
//! 3. [`orchestrator`] — the sequential processing loop

pub mod orchestrator;
pub mod outputs;
pub mod task;

pub use orchestrator::BatchOrchestrator;
pub use outputs::{OutputHandle, OutputRegistry};
pub use task::{FileSource, InputFile, TaskEvent, TaskId, TaskSnapshot, TaskStatus};
