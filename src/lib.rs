//! # glb-optimize
//!
//! Sanitise optimisation settings and batch-run binary glTF (`.glb`) assets
//! through an ordered transform pipeline.
//!
//! ## Why this crate?
//!
//! Optimisation settings outlive the code that wrote them: they sit in a
//! config file across upgrades, get hand-edited, and get half-written by
//! older versions. This crate treats them as untrusted, merges them against
//! known-good defaults, and only ever hands a schema-conformant
//! configuration to the pipeline. The pipeline then works through a queue
//! of files one at a time, so one broken model never takes the rest of the
//! batch down with it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! settings.json
//!  │
//!  ├─ 1. Sanitize  merge untrusted settings over defaults (or fall back)
//!  ├─ 2. Build     enabled steps in fixed order + material edit
//!  ├─ 3. Queue     accept .glb files as pending tasks
//!  ├─ 4. Process   read → ready backend → edit → steps → write, one file at a time
//!  └─ 5. Output    per-file bytes, sizes, derived file names
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glb_optimize::{
//!     BatchOrchestrator, GltfTransformCli, InputFile, OrchestratorConfig, SettingsStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SettingsStore::open("settings.json")?;
//!     let orchestrator = BatchOrchestrator::new(
//!         Arc::new(GltfTransformCli::default()),
//!         OrchestratorConfig::default(),
//!     );
//!     let tasks = orchestrator
//!         .run([InputFile::from_path("chair.glb")], &store.get())
//!         .await;
//!     for task in tasks {
//!         println!("{} {} {:?}", task.name, task.status, task.output_size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `glbopt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! glb-optimize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{AssetBackend, CliBackendConfig, GlbContainer, GltfTransformCli, Readiness};
pub use batch::{
    BatchOrchestrator, InputFile, OutputHandle, OutputRegistry, TaskEvent, TaskId, TaskSnapshot,
    TaskStatus,
};
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::{BackendError, FileError, GlbError, OptimizeError, SanitizeError};
pub use output::{BatchSummary, CompletedOutput};
pub use pipeline::{build_steps, MaterialEdit, Pipeline, StepDescriptor, StepKind};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use settings::{
    sanitize, sanitize_json, try_sanitize, OptimizationSettings, SettingValue, SettingsStore,
    UserSettings,
};
pub use store::Store;
