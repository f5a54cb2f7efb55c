//! Per-experiment mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per experiment id.
///
/// Holding the guard serializes every read-modify-write on that experiment.
/// Different ids never share a mutex, so they never contend.
#[derive(Debug, Default)]
pub(crate) struct ExperimentLocks {
    locks: DashMap<String, Arc<Mutex<()>>, FxBuildHasher>,
}

impl ExperimentLocks {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Wait for exclusive access to `id`.
    pub(crate) async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc so the shard lock is released before awaiting.
        let lock = Arc::clone(self.locks.entry(id.to_string()).or_default().value());
        lock.lock_owned().await
    }

    /// Drop the entry for `id` if no other task holds or awaits it.
    ///
    /// Call while holding the guard for `id`; the guard and the map each
    /// account for one strong reference.
    pub(crate) fn release(&self, id: &str) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) <= 2);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}
