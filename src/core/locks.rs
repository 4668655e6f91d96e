// Per-key async locks.
//
// Used to serialize read-modify-write sequences on one subject (find-or-create
// on enqueue, state transitions on a queue item, activity counters on a user)
// while unrelated keys proceed in parallel.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`. The lock is released when the guard drops.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard lock is not held across the await.
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop lock entries nobody is holding or waiting on. Returns how many remain.
    pub fn prune(&self) -> usize {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        self.locks.len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
