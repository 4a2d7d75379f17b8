//! Observable state container.
//!
//! [`Store`] holds a value, hands out snapshots, applies in-place updates,
//! and notifies every subscriber after each change. It is backed by a
//! `tokio::sync::watch` channel, so subscribers see the latest state rather
//! than a backlog, which is what progress displays want.

use tokio::sync::watch;

/// A value with change notification.
#[derive(Debug)]
pub struct Store<T> {
    tx: watch::Sender<T>,
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Inspect the current value without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Replace the value and notify subscribers, returning the old value.
    pub fn replace(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// A receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T> Default for Store<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}
