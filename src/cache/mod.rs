//! Cache Engines
//!
//! Byte-oriented key/value stores with per-object TTLs that hold the cached
//! series documents:
//!
//! - **memory**: In-process map with size limits and least-recently-accessed eviction
//! - **sqlite**: Embedded SQLite table, survives restarts
//! - **locks**: Per-key named locks shared by every user of an engine
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! DeltaProxyCache ──lock(key)──→ NamedLocker
//!        │
//!        └──store/retrieve──→ dyn Cache ──→ MemoryCache | SqliteCache
//! ```

pub mod error;
pub mod locks;
pub mod memory;
pub mod sqlite;

pub use error::{CacheError, CacheResult};
pub use locks::{NamedLockGuard, NamedLocker};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::CacheConfig;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Common trait for all cache engines
#[async_trait]
pub trait Cache: Send + Sync {
    /// Engine name, for logs
    fn name(&self) -> &str;

    /// Locker serializing read-modify-write cycles per key
    fn locker(&self) -> &NamedLocker;

    /// Store `data` under `key`, replacing any previous value
    async fn store(&self, key: &str, data: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Fetch the value under `key`; `CacheError::KeyNotFound` when absent or expired
    async fn retrieve(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Remove `key` if present
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Remove every key in `keys`
    async fn bulk_remove(&self, keys: &[String]) -> CacheResult<()>;

    /// Reset the expiry of an existing key; absent keys are ignored
    async fn set_ttl(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    /// Flush and release resources
    async fn close(&self) -> CacheResult<()>;
}

/// Supported cache engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheProvider {
    Memory,
    Sqlite,
}

impl FromStr for CacheProvider {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CacheProvider::Memory),
            "sqlite" => Ok(CacheProvider::Sqlite),
            other => Err(CacheError::Serialization(format!(
                "unknown cache provider '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CacheProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheProvider::Memory => write!(f, "memory"),
            CacheProvider::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Open the engine selected by `config`
pub fn open_cache(config: &CacheConfig) -> CacheResult<Arc<dyn Cache>> {
    let provider: CacheProvider = config.provider.parse()?;
    tracing::info!(provider = %provider, "Opening cache");

    let cache: Arc<dyn Cache> = match provider {
        CacheProvider::Memory => Arc::new(MemoryCache::new(
            config.max_size_objects,
            config.max_size_bytes,
        )),
        CacheProvider::Sqlite => Arc::new(SqliteCache::open(&config.sqlite_path)?),
    };
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_provider_parse() {
        assert_eq!("memory".parse::<CacheProvider>().unwrap(), CacheProvider::Memory);
        assert_eq!("SQLite".parse::<CacheProvider>().unwrap(), CacheProvider::Sqlite);
        assert!("redis".parse::<CacheProvider>().is_err());
        assert_eq!(CacheProvider::Sqlite.to_string(), "sqlite");
    }

    #[tokio::test]
    async fn test_open_cache_providers() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CacheConfig::default();

        config.provider = "memory".to_string();
        let cache = open_cache(&config).unwrap();
        assert_eq!(cache.name(), "memory");

        config.provider = "sqlite".to_string();
        config.sqlite_path = temp_dir.path().join("cache.db");
        let cache = open_cache(&config).unwrap();
        assert_eq!(cache.name(), "sqlite");
        cache.store("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.retrieve("k").await.unwrap(), b"v".to_vec());

        config.provider = "nope".to_string();
        assert!(open_cache(&config).is_err());
    }
}
