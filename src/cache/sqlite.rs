//! SQLite cache - a persistent key/value table
//!
//! One row per cache key with the payload and an absolute expiry in Unix
//! milliseconds. Expired rows read as misses and are deleted when touched;
//! `purge_expired` sweeps the rest (run once at open).

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::locks::NamedLocker;
use crate::cache::Cache;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed cache engine
pub struct SqliteCache {
    conn: Mutex<Connection>,
    path: PathBuf,
    locker: NamedLocker,
}

impl SqliteCache {
    /// Create or open the cache database at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_objects (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_expires_at ON cache_objects(expires_at)",
            [],
        )?;

        let cache = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            locker: NamedLocker::new(),
        };
        let purged = cache.purge_expired()?;
        tracing::info!(path = %cache.path.display(), purged, "SQLite cache opened");
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete every expired row, returning how many were removed
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_objects WHERE expires_at <= ?",
            params![now_millis()],
        )?;
        Ok(removed)
    }

    /// Number of rows, expired ones included
    pub fn len(&self) -> CacheResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_objects", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    fn conn(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Lock(e.to_string()))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl Cache for SqliteCache {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn locker(&self) -> &NamedLocker {
        &self.locker
    }

    async fn store(&self, key: &str, data: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        tracing::debug!(key = %key, bytes = data.len(), ttl_ms = ttl.as_millis() as u64, "sqlite cache store");
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_objects (key, value, expires_at) VALUES (?, ?, ?)",
            params![key, data, expiry_millis(ttl)],
        )?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> CacheResult<Vec<u8>> {
        let conn = self.conn()?;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM cache_objects WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((data, expires_at)) if expires_at > now_millis() => Ok(data),
            Some(_) => {
                tracing::debug!(key = %key, "sqlite cache expired");
                conn.execute("DELETE FROM cache_objects WHERE key = ?", params![key])?;
                Err(CacheError::KeyNotFound(key.to_string()))
            }
            None => {
                tracing::debug!(key = %key, "sqlite cache miss");
                Err(CacheError::KeyNotFound(key.to_string()))
            }
        }
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        tracing::debug!(key = %key, "sqlite cache remove");
        let conn = self.conn()?;
        conn.execute("DELETE FROM cache_objects WHERE key = ?", params![key])?;
        Ok(())
    }

    async fn bulk_remove(&self, keys: &[String]) -> CacheResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM cache_objects WHERE key = ?")?;
            for key in keys {
                stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE cache_objects SET expires_at = ? WHERE key = ?",
            params![expiry_millis(ttl), key],
        )?;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        tracing::info!(path = %self.path.display(), "SQLite cache closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn open(temp_dir: &TempDir) -> SqliteCache {
        SqliteCache::open(&temp_dir.path().join("cache.db")).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);

        cache.store("a", vec![1, 2, 3], TTL).await.unwrap();
        assert_eq!(cache.retrieve("a").await.unwrap(), vec![1, 2, 3]);

        cache.store("a", vec![4], TTL).await.unwrap();
        assert_eq!(cache.retrieve("a").await.unwrap(), vec![4]);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_miss_and_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);

        assert!(cache.retrieve("nope").await.unwrap_err().is_miss());

        cache.store("a", vec![1], Duration::ZERO).await.unwrap();
        assert!(cache.retrieve("a").await.unwrap_err().is_miss());
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_set_ttl_and_purge() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);

        cache.store("a", vec![1], TTL).await.unwrap();
        cache.store("b", vec![2], TTL).await.unwrap();
        cache.set_ttl("a", Duration::ZERO).await.unwrap();

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.retrieve("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_bulk_remove() {
        let temp_dir = TempDir::new().unwrap();
        let cache = open(&temp_dir);
        for key in ["a", "b", "c"] {
            cache.store(key, vec![1], TTL).await.unwrap();
        }
        cache.remove("c").await.unwrap();
        cache
            .bulk_remove(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_open() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = open(&temp_dir);
            cache.store("a", vec![7], TTL).await.unwrap();
            cache.close().await.unwrap();
        }
        let cache = open(&temp_dir);
        assert_eq!(cache.retrieve("a").await.unwrap(), vec![7]);
        assert_eq!(cache.path(), temp_dir.path().join("cache.db"));
    }
}
