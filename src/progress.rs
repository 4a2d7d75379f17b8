//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::OrchestratorConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the queue.
//!
//! Callbacks complement [`crate::batch::BatchOrchestrator::subscribe`]: the
//! watch channel always carries the latest full task list, while callbacks
//! see every individual transition, which is what a progress bar or a log
//! line wants.
//!
//! # Example
//!
//! ```rust
//! use glb_optimize::{BatchProgressCallback, OrchestratorConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, position: usize, total: usize, name: &str, _in: u64, out: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{position}/{total} {name}: {out} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = OrchestratorConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each file.
///
/// Files are processed one at a time, so calls never overlap for a single
/// orchestrator. Implementations must still be `Send + Sync` because the
/// orchestrator may be driven from any tokio worker. All methods have
/// default no-op implementations.
///
/// `total` is the number of files known to the current run at the time of
/// the call; it grows when files are enqueued mid-run.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first pending file is picked up.
    fn on_batch_start(&self, pending: usize) {
        let _ = pending;
    }

    /// Called when a file moves to `processing`.
    ///
    /// # Arguments
    /// * `position` — 1-indexed position within this run
    /// * `total`    — files known to this run so far
    /// * `name`     — the file's original name
    fn on_file_start(&self, position: usize, total: usize, name: &str) {
        let _ = (position, total, name);
    }

    /// Called when a file reaches `completed`.
    fn on_file_complete(
        &self,
        position: usize,
        total: usize,
        name: &str,
        original_size: u64,
        output_size: u64,
    ) {
        let _ = (position, total, name, original_size, output_size);
    }

    /// Called when a file reaches `error`.
    fn on_file_error(&self, position: usize, total: usize, name: &str, error: &str) {
        let _ = (position, total, name, error);
    }

    /// Called once after the queue has drained.
    ///
    /// # Arguments
    /// * `total`         — files processed by this run
    /// * `success_count` — files that completed without error
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OrchestratorConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<String>>,
        pending: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, pending: usize) {
            self.pending.store(pending, Ordering::SeqCst);
        }

        fn on_file_start(&self, _position: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _p: usize, _t: usize, _name: &str, _in: u64, _out: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _p: usize, _t: usize, name: &str, error: &str) {
            self.errors.lock().unwrap().push(format!("{name}: {error}"));
        }

        fn on_batch_complete(&self, _total: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, "a.glb");
        cb.on_file_complete(1, 2, "a.glb", 100, 40);
        cb.on_file_error(2, 2, "b.glb", "bad magic");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        tracker.on_file_start(1, 3, "a.glb");
        tracker.on_file_complete(1, 3, "a.glb", 1000, 400);
        tracker.on_file_start(2, 3, "b.glb");
        tracker.on_file_error(2, 3, "b.glb", "simplify failed");
        tracker.on_file_start(3, 3, "c.glb");
        tracker.on_file_complete(3, 3, "c.glb", 500, 500);
        tracker.on_batch_complete(3, 2);

        assert_eq!(tracker.pending.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(
            *tracker.errors.lock().unwrap(),
            vec!["b.glb: simplify failed".to_string()]
        );
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_file_start(1, 10, "x.glb");
    }
}
