//! In-process memory cache
//!
//! Entries live in a `HashMap` behind a tokio `RwLock`. Each entry carries
//! an expiry instant and an access tick; when a store pushes the cache past
//! its object or byte limit, the least recently accessed entries go first.

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::locks::NamedLocker;
use crate::cache::Cache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
    last_access: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    bytes: u64,
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn take(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.bytes = self.bytes.saturating_sub(entry.data.len() as u64);
        Some(entry)
    }

    /// Evict least recently accessed entries, never `keep`, until under limits
    fn enforce_limits(&mut self, max_objects: u64, max_bytes: u64, keep: &str) {
        let over = |inner: &Inner| {
            (max_objects > 0 && inner.entries.len() as u64 > max_objects)
                || (max_bytes > 0 && inner.bytes > max_bytes)
        };
        while over(self) {
            let victim = self
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != keep)
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    tracing::debug!(key = %key, "memory cache evict");
                    self.take(&key);
                }
                None => break,
            }
        }
    }
}

/// Memory-backed cache engine
pub struct MemoryCache {
    inner: RwLock<Inner>,
    locker: NamedLocker,
    max_objects: u64,
    max_bytes: u64,
}

impl MemoryCache {
    /// Create a cache; a zero limit means unbounded
    pub fn new(max_objects: u64, max_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            locker: NamedLocker::new(),
            max_objects,
            max_bytes,
        }
    }

    /// Number of stored objects, expired ones included until touched
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total stored payload bytes
    pub async fn size_bytes(&self) -> u64 {
        self.inner.read().await.bytes
    }
}

/// Expiry instant for `ttl` from now; TTLs past what `Instant` can hold
/// saturate to roughly a century out
fn expiry(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    fn locker(&self) -> &NamedLocker {
        &self.locker
    }

    async fn store(&self, key: &str, data: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        tracing::debug!(key = %key, bytes = data.len(), ttl_ms = ttl.as_millis() as u64, "memory cache store");

        let mut inner = self.inner.write().await;
        inner.take(key);
        let tick = inner.next_tick();
        inner.bytes += data.len() as u64;
        inner.entries.insert(
            key.to_string(),
            Entry {
                data,
                expires_at: expiry(ttl),
                last_access: tick,
            },
        );
        inner.enforce_limits(self.max_objects, self.max_bytes, key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> CacheResult<Vec<u8>> {
        let mut inner = self.inner.write().await;
        let expired = match inner.entries.get(key) {
            None => {
                tracing::debug!(key = %key, "memory cache miss");
                return Err(CacheError::KeyNotFound(key.to_string()));
            }
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            tracing::debug!(key = %key, "memory cache expired");
            inner.take(key);
            return Err(CacheError::KeyNotFound(key.to_string()));
        }

        let tick = inner.next_tick();
        let entry = inner
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::KeyNotFound(key.to_string()))?;
        entry.last_access = tick;
        Ok(entry.data.clone())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        tracing::debug!(key = %key, "memory cache remove");
        self.inner.write().await.take(key);
        Ok(())
    }

    async fn bulk_remove(&self, keys: &[String]) -> CacheResult<()> {
        let mut inner = self.inner.write().await;
        for key in keys {
            inner.take(key);
        }
        Ok(())
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        if let Some(entry) = self.inner.write().await.entries.get_mut(key) {
            entry.expires_at = expiry(ttl);
        }
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.bytes = 0;
        Ok(())
    }
}
