//! Keyed single-flight serialization of async operations.
//!
//! Operations registered under the same key run one after another in the
//! order they arrived; operations under different keys run concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Serializes async operations per caller-chosen key.
///
/// A key is registered while at least one operation holds or waits for it
/// and is forgotten as soon as the last one settles.
#[derive(Debug, Default)]
pub struct OperationMutex {
    slots: Mutex<HashMap<String, Slot>>,
}

impl OperationMutex {
    /// Creates an empty mutex registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `operation` once every earlier operation under `key` has settled.
    ///
    /// The key is released whether `operation` succeeds, fails or panics.
    /// Dropping the returned future while it waits gives up its place in the
    /// queue without running `operation`.
    pub async fn with_mutex<F, Fut, T>(&self, key: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _lease = self.acquire(key).await;
        operation().await
    }

    /// Whether an operation is currently registered under `key`.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.slots().contains_key(key)
    }

    /// Number of keys with a registered operation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// Whether no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    async fn acquire(&self, key: &str) -> Lease<'_> {
        let slot = {
            let mut slots = self.slots();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        // Registered before awaiting so the slot survives while we queue.
        let mut lease = Lease {
            owner: self,
            key: key.to_string(),
            slot: Some(Arc::clone(&slot)),
            guard: None,
        };
        drop(slot);
        if let Some(slot) = lease.slot.as_ref() {
            lease.guard = Some(Arc::clone(slot).lock_owned().await);
        }
        lease
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Lease<'a> {
    owner: &'a OperationMutex,
    key: String,
    slot: Option<Slot>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        // Release the lock before checking for waiters.
        self.guard.take();
        let mut slots = self.owner.slots();
        if let Some(slot) = self.slot.take() {
            // One reference in the map plus ours means nobody is queued.
            if Arc::strong_count(&slot) == 2 {
                slots.remove(&self.key);
            }
        }
    }
}
