//! Sequential, failure-isolating batch processing.
//!
//! ```text
//!  enqueue ──▶ [pending] ──▶ [processing] ──┬──▶ [completed]  (output registered)
//!                                           └──▶ [error]      (FileError recorded)
//! ```
//!
//! One file at a time, in enqueue order. A failure is recorded on its task
//! and the loop moves on. Files enqueued while a run is in flight are picked
//! up by that run. A file queued by [`BatchOrchestrator::run`] carries the
//! pipeline built from that call's settings, whichever loop processes it.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Observers get the latest task list through a watch channel,
//! and every single transition through a broadcast channel of
//! [`TaskEvent`]s.

use super::outputs::OutputRegistry;
use super::task::{FileTask, InputFile, TaskEvent, TaskId, TaskSnapshot, TaskStatus};
use crate::backend::{AssetBackend, Readiness};
use crate::config::OrchestratorConfig;
use crate::error::FileError;
use crate::output::{BatchSummary, CompletedOutput};
use crate::pipeline::Pipeline;
use crate::settings::OptimizationSettings;
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct BatchState {
    tasks: Vec<FileTask>,
    next_id: u64,
    selected: Option<TaskId>,
}

impl BatchState {
    fn find_mut(&mut self, id: TaskId) -> Option<&mut FileTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.tasks.iter().map(FileTask::snapshot).collect()
    }
}

/// Drives queued files through a [`Pipeline`] on an [`AssetBackend`].
pub struct BatchOrchestrator<B: AssetBackend> {
    backend: Arc<B>,
    config: OrchestratorConfig,
    registry: OutputRegistry,
    state: Mutex<BatchState>,
    snapshots: Store<Vec<TaskSnapshot>>,
    events: broadcast::Sender<TaskEvent>,
    running: AtomicBool,
}

/// Clears the in-flight flag even if processing panics or the run is
/// dropped, then publishes so `run` callers waiting on another loop wake up
/// and drain what is left.
struct RunGuard<'a, B: AssetBackend>(&'a BatchOrchestrator<B>);

impl<B: AssetBackend> Drop for RunGuard<'_, B> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
        let state = self.0.lock();
        self.0.publish(&state);
    }
}

/// Fails the task if processing stops before its outcome is recorded:
/// the run future was dropped mid-file, or the backend panicked.
struct InFlight<'a, B: AssetBackend> {
    orchestrator: &'a BatchOrchestrator<B>,
    id: TaskId,
    armed: bool,
}

impl<B: AssetBackend> Drop for InFlight<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator.abandon(self.id);
        }
    }
}

impl<B: AssetBackend> BatchOrchestrator<B> {
    pub fn new(backend: Arc<B>, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            config,
            registry: OutputRegistry::new(),
            state: Mutex::new(BatchState::default()),
            snapshots: Store::new(Vec::new()),
            events,
            running: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// `true` once backend initialisation has been attempted, by this
    /// orchestrator or any other sharing the backend.
    pub fn is_backend_settled(&self) -> bool {
        self.backend.readiness().is_settled()
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &BatchState) {
        self.snapshots.replace(state.snapshots());
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Queue ────────────────────────────────────────────────────────────

    /// Queue files as `pending`, returning the new task ids in order.
    ///
    /// Files without the accepted extension are logged and skipped.
    pub fn enqueue(&self, files: impl IntoIterator<Item = InputFile>) -> Vec<TaskId> {
        self.enqueue_with(files, None)
    }

    fn enqueue_with(
        &self,
        files: impl IntoIterator<Item = InputFile>,
        pipeline: Option<Arc<Pipeline>>,
    ) -> Vec<TaskId> {
        let mut state = self.lock();
        let mut ids = Vec::new();
        for file in files {
            if !self.config.accepts(&file.name) {
                warn!(
                    "Skipping '{}': not a .{} file",
                    file.name, self.config.accepted_extension
                );
                continue;
            }
            state.next_id += 1;
            let id = TaskId(state.next_id);
            let mut task = FileTask::new(id, file);
            task.pipeline = pipeline.clone();
            debug!("Queued {} '{}' ({} bytes)", id, task.input.name, task.original_size);
            state.tasks.push(task);
            ids.push(id);
        }
        if !ids.is_empty() {
            self.publish(&state);
            for &id in &ids {
                self.emit(TaskEvent::Status {
                    id,
                    status: TaskStatus::Pending,
                });
            }
        }
        ids
    }

    /// Process every pending task, including ones enqueued meanwhile.
    ///
    /// The pipeline is built once from `settings` at the start of the run
    /// and used for every task that was not queued with its own. If a run
    /// is already in flight this returns an empty summary at once; the
    /// running loop will pick up any pending tasks.
    pub async fn process_pending(&self, settings: &OptimizationSettings) -> BatchSummary {
        let pipeline = Arc::new(Pipeline::from_settings(settings));
        match self.drain(&pipeline).await {
            Some(summary) => summary,
            None => {
                debug!("A run is already in flight; it will pick up pending files");
                BatchSummary::default()
            }
        }
    }

    /// Enqueue `files` and wait until every one of them is terminal (or
    /// removed), returning this call's tasks in enqueue order.
    ///
    /// The files are processed with `settings` even when another run is
    /// already in flight and ends up processing them.
    pub async fn run(
        &self,
        files: impl IntoIterator<Item = InputFile>,
        settings: &OptimizationSettings,
    ) -> Vec<TaskSnapshot> {
        let pipeline = Arc::new(Pipeline::from_settings(settings));
        let mut changes = self.snapshots.subscribe();
        let ids = self.enqueue_with(files, Some(Arc::clone(&pipeline)));

        while !self.all_settled(&ids) {
            if self.drain(&pipeline).await.is_some() {
                continue;
            }
            // Another loop owns the queue. It publishes after every
            // transition and once more when it stops.
            if changes.changed().await.is_err() {
                break;
            }
        }

        let state = self.lock();
        ids.iter()
            .filter_map(|id| state.tasks.iter().find(|t| t.id == *id))
            .map(FileTask::snapshot)
            .collect()
    }

    /// Run the processing loop. `None` when another loop is already running.
    async fn drain(&self, default_pipeline: &Arc<Pipeline>) -> Option<BatchSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let _guard = RunGuard(self);

        let started = Instant::now();
        info!("Pipeline: {}", describe(default_pipeline));

        let progress = self.config.progress_callback.clone();
        let pending = self.count(TaskStatus::Pending);
        if let Some(ref cb) = progress {
            cb.on_batch_start(pending);
        }

        let mut processed: Vec<TaskId> = Vec::new();
        while let Some((id, input, own_pipeline)) = self.start_next() {
            let position = processed.len() + 1;
            let total = processed.len() + 1 + self.count(TaskStatus::Pending);
            info!("[{}/{}] Optimising '{}'", position, total, input.name);
            if let Some(ref cb) = progress {
                cb.on_file_start(position, total, &input.name);
            }
            let pipeline = match own_pipeline {
                Some(p) if !Arc::ptr_eq(&p, default_pipeline) => {
                    debug!("'{}' uses its own pipeline: {}", input.name, describe(&p));
                    p
                }
                _ => Arc::clone(default_pipeline),
            };

            let mut in_flight = InFlight {
                orchestrator: self,
                id,
                armed: true,
            };
            let outcome = self.process_one(id, &input, &pipeline).await;
            in_flight.armed = false;
            let finished = self.finish(id, outcome);
            processed.push(id);

            if let (Some(cb), Some(snap)) = (&progress, finished) {
                match snap.status {
                    TaskStatus::Completed => cb.on_file_complete(
                        position,
                        total,
                        &snap.name,
                        snap.original_size,
                        snap.output_size.unwrap_or(0),
                    ),
                    _ => {
                        let msg = snap.error.map(|e| e.to_string()).unwrap_or_default();
                        cb.on_file_error(position, total, &snap.name, &msg);
                    }
                }
            }
        }

        let snapshots: Vec<TaskSnapshot> = {
            let state = self.lock();
            state
                .tasks
                .iter()
                .filter(|t| processed.contains(&t.id))
                .map(FileTask::snapshot)
                .collect()
        };
        let summary = BatchSummary::from_snapshots(&snapshots, started.elapsed().as_millis() as u64);
        info!(
            "Batch done: {} completed, {} failed in {}ms",
            summary.completed, summary.failed, summary.elapsed_ms
        );
        if let Some(ref cb) = progress {
            cb.on_batch_complete(summary.total, summary.completed);
        }
        Some(summary)
    }

    /// Discard every task and output, then run the same sources again from
    /// scratch with `settings`.
    pub async fn reprocess_all(&self, settings: &OptimizationSettings) -> Vec<TaskSnapshot> {
        let inputs: Vec<InputFile> = {
            let mut state = self.lock();
            state.selected = None;
            let tasks = std::mem::take(&mut state.tasks);
            self.publish(&state);
            tasks
                .into_iter()
                .map(|t| {
                    self.emit(TaskEvent::Removed { id: t.id });
                    t.input
                })
                .collect()
        };
        info!("Reprocessing {} file(s)", inputs.len());
        self.run(inputs, settings).await
    }

    /// Drop one task and release its output. Returns `false` for an unknown id.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.lock();
        let Some(index) = state.tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        if state.selected == Some(id) {
            state.selected = None;
        }
        let task = state.tasks.remove(index);
        debug!("Removed {} '{}'", id, task.input.name);
        drop(task);
        self.publish(&state);
        self.emit(TaskEvent::Removed { id });
        true
    }

    /// Drop every task and release every output.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.selected = None;
        let removed: Vec<TaskId> = state.tasks.drain(..).map(|t| t.id).collect();
        debug!("Cleared {} task(s)", removed.len());
        self.publish(&state);
        for id in removed {
            self.emit(TaskEvent::Removed { id });
        }
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Select a completed task's output. Returns `false` if `id` is not a
    /// completed task.
    pub fn select(&self, id: TaskId) -> bool {
        let mut state = self.lock();
        let ok = state
            .tasks
            .iter()
            .any(|t| t.id == id && t.status == TaskStatus::Completed);
        if ok {
            state.selected = Some(id);
        }
        ok
    }

    pub fn selected(&self) -> Option<TaskId> {
        self.lock().selected
    }

    pub fn selected_output(&self) -> Option<Arc<[u8]>> {
        let id = self.selected()?;
        self.output(id)
    }

    // ── Outputs and observation ──────────────────────────────────────────

    pub fn output(&self, id: TaskId) -> Option<Arc<[u8]>> {
        let state = self.lock();
        let handle = state.tasks.iter().find(|t| t.id == id)?.output.as_ref()?;
        self.registry.get(handle)
    }

    /// Every completed task with its bytes, in enqueue order.
    pub fn completed_outputs(&self) -> Vec<CompletedOutput> {
        let state = self.lock();
        state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| {
                let bytes = self.registry.get(t.output.as_ref()?)?;
                Some(CompletedOutput {
                    task: t.snapshot(),
                    bytes,
                })
            })
            .collect()
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.snapshots.get()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.lock().tasks.iter().find(|t| t.id == id).map(FileTask::snapshot)
    }

    /// Receive the latest task list after every change. Intermediate
    /// states may be skipped by a slow reader; use [`Self::events`] to see
    /// each transition.
    pub fn subscribe(&self) -> watch::Receiver<Vec<TaskSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Receive every task transition from now on.
    ///
    /// A reader that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` and continues from the oldest retained event.
    pub fn events(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn count(&self, status: TaskStatus) -> usize {
        self.lock().tasks.iter().filter(|t| t.status == status).count()
    }

    /// Every id is terminal or no longer queued.
    fn all_settled(&self, ids: &[TaskId]) -> bool {
        let state = self.lock();
        ids.iter().all(|id| {
            state
                .tasks
                .iter()
                .find(|t| t.id == *id)
                .is_none_or(|t| t.status.is_terminal())
        })
    }

    /// Move the oldest pending task to `processing`.
    fn start_next(&self) -> Option<(TaskId, InputFile, Option<Arc<Pipeline>>)> {
        let mut state = self.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.status == TaskStatus::Pending)?;
        task.status = TaskStatus::Processing;
        let next = (task.id, task.input.clone(), task.pipeline.clone());
        self.publish(&state);
        self.emit(TaskEvent::Status {
            id: next.0,
            status: TaskStatus::Processing,
        });
        Some(next)
    }

    /// Fail a task left in `processing` by an interrupted pass.
    fn abandon(&self, id: TaskId) {
        let mut state = self.lock();
        let Some(task) = state.find_mut(id) else {
            return;
        };
        if task.status != TaskStatus::Processing {
            return;
        }
        warn!("Processing of '{}' was interrupted", task.input.name);
        task.error = Some(FileError::Other {
            name: task.input.name.clone(),
            detail: "processing was interrupted before it finished".to_string(),
        });
        task.status = TaskStatus::Error;
        self.publish(&state);
        self.emit(TaskEvent::Status {
            id,
            status: TaskStatus::Error,
        });
    }

    /// The hint taken at enqueue can be missing or stale for path sources.
    fn record_loaded_size(&self, id: TaskId, len: u64) {
        let mut state = self.lock();
        if let Some(task) = state.find_mut(id) {
            if task.original_size != len {
                debug!(
                    "'{}' is {} bytes (queued as {})",
                    task.input.name, len, task.original_size
                );
                task.original_size = len;
                self.publish(&state);
            }
        }
    }

    /// Record the outcome. A task removed while processing is gone; its
    /// bytes are dropped and nothing is registered.
    fn finish(&self, id: TaskId, outcome: Result<Vec<u8>, FileError>) -> Option<TaskSnapshot> {
        let mut state = self.lock();
        let Some(task) = state.find_mut(id) else {
            debug!("{} was removed while processing; discarding result", id);
            return None;
        };
        match outcome {
            Ok(bytes) => {
                let size = bytes.len() as u64;
                info!(
                    "'{}' optimised: {} → {} bytes",
                    task.input.name, task.original_size, size
                );
                task.output = Some(self.registry.register(bytes));
                task.output_size = Some(size);
                task.status = TaskStatus::Completed;
            }
            Err(e) => {
                warn!("{}", e);
                task.error = Some(e);
                task.status = TaskStatus::Error;
            }
        }
        let snap = task.snapshot();
        if snap.status == TaskStatus::Completed && state.selected.is_none() {
            state.selected = Some(id);
        }
        self.publish(&state);
        self.emit(TaskEvent::Status {
            id,
            status: snap.status,
        });
        Some(snap)
    }

    async fn process_one(
        &self,
        id: TaskId,
        input: &InputFile,
        pipeline: &Pipeline,
    ) -> Result<Vec<u8>, FileError> {
        let name = input.name.as_str();
        let transform_err = |step: &str, e: crate::error::BackendError| FileError::TransformFailed {
            name: name.to_string(),
            step: step.to_string(),
            detail: e.to_string(),
        };

        let bytes = input.source.load().await.map_err(|e| FileError::ReadFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
        self.record_loaded_size(id, bytes.len() as u64);

        Readiness::ensure_ready(self.backend.as_ref())
            .await
            .map_err(|detail| FileError::BackendUnavailable {
                name: name.to_string(),
                detail,
            })?;

        let mut doc = self
            .backend
            .read(&bytes)
            .await
            .map_err(|e| transform_err("read", e))?;

        if let Some(edit) = pipeline.material_edit {
            self.backend
                .set_double_sided(&mut doc, edit.double_sided)
                .await
                .map_err(|e| transform_err("materials", e))?;
        }

        for step in &pipeline.steps {
            debug!("'{}': {}", name, step);
            self.backend
                .apply(&mut doc, step)
                .await
                .map_err(|e| transform_err(step.kind().as_str(), e))?;
        }

        self.backend.write(doc).await.map_err(|e| FileError::WriteFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }
}

fn describe(pipeline: &Pipeline) -> String {
    if pipeline.steps.is_empty() {
        return "(no steps)".to_string();
    }
    pipeline
        .steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}
