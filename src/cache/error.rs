//! Cache error types

use thiserror::Error;

/// Errors that can occur in a cache engine
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent or its TTL has passed
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite engine failure
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes failed validation (checksum mismatch, truncated header)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl CacheError {
    /// True for the plain "not cached" case, as opposed to an engine failure
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::KeyNotFound(_))
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Sqlite(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::KeyNotFound("cpu|60000".to_string());
        assert_eq!(err.to_string(), "Key not found: cpu|60000");
        assert!(err.is_miss());

        let err = CacheError::Corruption("checksum mismatch".to_string());
        assert_eq!(err.to_string(), "Corrupt data: checksum mismatch");
        assert!(!err.is_miss());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cache_err: CacheError = io_err.into();
        assert!(matches!(cache_err, CacheError::Io(_)));
    }
}
