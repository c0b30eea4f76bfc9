//! Registry of running format operations, keyed by request message id.
//!
//! An entry lives exactly as long as its [`InFlightGuard`]: the guard is
//! created when formatting starts and removes the entry when dropped, no
//! matter how the operation ends. `CancelFormat` fires the entry's token
//! and removes it early.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Entry {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<u32, Entry>,
    next_generation: u64,
}

/// Cancellation handles for in-flight `FormatText` operations.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl InFlightRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new operation for `message_id`.
    ///
    /// A second operation under the same id replaces the first record.
    pub fn begin(&self, message_id: u32) -> InFlightGuard {
        let token = CancellationToken::new();
        let mut inner = self.lock();
        let generation = inner.next_generation;
        inner.next_generation += 1;
        if let Some(previous) = inner.entries.insert(
            message_id,
            Entry {
                generation,
                token: token.clone(),
            },
        ) {
            tracing::warn!(message_id, "replacing in-flight record with a duplicate id");
            drop(previous);
        }

        InFlightGuard {
            registry: self.clone(),
            message_id,
            generation,
            token,
        }
    }

    /// Cancel and forget the operation for `message_id`.
    ///
    /// Returns `false` when there is no such operation.
    pub fn cancel(&self, message_id: u32) -> bool {
        match self.lock().entries.remove(&message_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether an operation is recorded for `message_id`.
    pub fn contains(&self, message_id: u32) -> bool {
        self.lock().entries.contains_key(&message_id)
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no operations are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, message_id: u32, generation: u64) {
        let mut inner = self.lock();
        if inner
            .entries
            .get(&message_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            inner.entries.remove(&message_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing panics while holding the lock; recover the data regardless.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps an operation's registry entry alive; removes it on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    message_id: u32,
    generation: u64,
    token: CancellationToken,
}

impl InFlightGuard {
    /// Message id of the guarded operation.
    #[inline]
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Token cancelled by `CancelFormat`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the operation has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.finish(self.message_id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_entry_on_drop() {
        let registry = InFlightRegistry::new();
        let guard = registry.begin(7);
        assert!(registry.contains(7));
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_signals_and_removes() {
        let registry = InFlightRegistry::new();
        let guard = registry.begin(7);

        assert!(registry.cancel(7));
        assert!(guard.is_cancelled());
        assert!(!registry.contains(7));

        // The guard dropping afterwards is harmless.
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_unknown_id_is_noop() {
        let registry = InFlightRegistry::new();
        let guard = registry.begin(1);

        assert!(!registry.cancel(99));
        assert!(!guard.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_guard_does_not_remove_replacement() {
        let registry = InFlightRegistry::new();
        let first = registry.begin(3);
        let second = registry.begin(3);

        drop(first);
        assert!(registry.contains(3));

        assert!(registry.cancel(3));
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_dropped_when_task_panics() {
        let registry = InFlightRegistry::new();
        let guard = registry.begin(5);

        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("handler blew up");
        });
        assert!(task.await.is_err());
        assert!(registry.is_empty());
    }
}
