//! Per-user commit locks
//!
//! State commits for one user are serialized through an async mutex owned by
//! that user's entry; different users never contend. An entry lives only
//! while somebody holds or waits on it.

use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Registry of per-user async mutexes
#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    locks: LockMap,
}

/// Exclusive access to one user's commit path
///
/// Releasing the last interest in a user's lock removes its entry.
#[derive(Debug)]
pub struct UserGuard {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    user_id: String,
    locks: LockMap,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a user's commit path
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.clone().lock_owned().await;
        UserGuard {
            guard: Some(guard),
            lock,
            user_id: user_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Number of users with a held or awaited lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map entry and this handle are the only owners: nobody waits
        self.locks.remove_if(&self.user_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
