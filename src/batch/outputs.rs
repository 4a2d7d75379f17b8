//! Ownership of produced output buffers.
//!
//! Every completed file owns exactly one [`OutputHandle`]. The handle is not
//! `Clone`, and dropping it removes the buffer from the registry, so a
//! buffer is released exactly once: when its task is removed, cleared, or
//! discarded by a reprocess. Readers get `Arc<[u8]>` clones that stay valid
//! after release.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    buffers: HashMap<u64, Arc<[u8]>>,
    next_id: u64,
    registered: u64,
    released: u64,
}

/// Shared table of live output buffers.
#[derive(Debug, Clone, Default)]
pub struct OutputRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of `bytes` and return the one handle for them.
    pub fn register(&self, bytes: Vec<u8>) -> OutputHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.registered += 1;
        let len = bytes.len();
        inner.buffers.insert(id, bytes.into());
        debug!("Registered output {} ({} bytes)", id, len);
        OutputHandle {
            id,
            len,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn get(&self, handle: &OutputHandle) -> Option<Arc<[u8]>> {
        self.lock().buffers.get(&handle.id).cloned()
    }

    /// Buffers currently held.
    pub fn live(&self) -> usize {
        self.lock().buffers.len()
    }

    pub fn registered(&self) -> u64 {
        self.lock().registered
    }

    pub fn released(&self) -> u64 {
        self.lock().released
    }
}

/// Owned token for one registered buffer. Releases it on drop.
pub struct OutputHandle {
    id: u64,
    len: usize,
    registry: Weak<Mutex<Inner>>,
}

impl OutputHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("id", &self.id)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.buffers.remove(&self.id).is_some() {
            inner.released += 1;
            debug!("Released output {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_releases_exactly_once() {
        let registry = OutputRegistry::new();
        let a = registry.register(vec![1, 2, 3]);
        let b = registry.register(vec![4]);
        assert_eq!(registry.live(), 2);
        assert_eq!(registry.get(&a).as_deref(), Some(&[1, 2, 3][..]));
        assert_eq!(a.len(), 3);

        drop(a);
        assert_eq!(registry.live(), 1);
        assert_eq!(registry.released(), 1);

        drop(b);
        assert_eq!(registry.live(), 0);
        assert_eq!(registry.released(), 2);
        assert_eq!(registry.registered(), 2);
    }

    #[test]
    fn readers_outlive_release() {
        let registry = OutputRegistry::new();
        let handle = registry.register(vec![9; 8]);
        let bytes = registry.get(&handle).unwrap();
        drop(handle);
        assert_eq!(bytes.len(), 8);
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let registry = OutputRegistry::new();
        let handle = registry.register(vec![1]);
        drop(registry);
        drop(handle);
    }

    #[test]
    fn ids_are_not_reused() {
        let registry = OutputRegistry::new();
        let a = registry.register(vec![]);
        let a_id = a.id();
        assert!(a.is_empty());
        drop(a);
        let b = registry.register(vec![]);
        assert_ne!(a_id, b.id());
    }
}
