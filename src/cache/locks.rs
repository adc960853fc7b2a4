//! Named locks - per-key mutual exclusion
//!
//! Read-modify-write cycles on one cached series must not interleave, while
//! cycles on different series run freely. `NamedLocker` hands out one async
//! mutex per key on demand and forgets it once nobody holds or awaits it.

use crate::cache::error::{CacheError, CacheResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// Registry of per-key async mutexes
#[derive(Clone, Default)]
pub struct NamedLocker {
    locks: Arc<Mutex<LockTable>>,
}

impl NamedLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> CacheResult<NamedLockGuard> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| CacheError::Lock(e.to_string()))?;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = mutex.lock_owned().await;
        Ok(NamedLockGuard {
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
            _guard: guard,
        })
    }

    /// Number of keys currently held or awaited
    pub fn active(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for NamedLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLocker")
            .field("active", &self.active())
            .finish()
    }
}

/// Exclusive hold on one key; released on drop
pub struct NamedLockGuard {
    key: String,
    locks: Arc<Mutex<LockTable>>,
    _guard: OwnedMutexGuard<()>,
}

impl NamedLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.locks.lock() {
            // the table and this guard are the only owners: nobody is waiting
            let idle = locks
                .get(&self.key)
                .map(|m| Arc::strong_count(m) <= 2)
                .unwrap_or(false);
            if idle {
                locks.remove(&self.key);
            }
        }
    }
}
