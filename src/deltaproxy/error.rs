//! Delta proxy error types

use crate::cache::CacheError;
use crate::timeseries::TimeseriesError;
use thiserror::Error;

/// Errors that can occur while serving a range query through the cache
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The upstream could not be reached or timed out
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The upstream answered with a non-success status
    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// The upstream body was not in the expected shape
    #[error("Upstream response could not be decoded: {0}")]
    UpstreamDecode(String),

    /// Cache engine failure other than a miss
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The request itself is unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<TimeseriesError> for ProxyError {
    fn from(err: TimeseriesError) -> Self {
        ProxyError::InvalidRequest(err.to_string())
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProxyError::UpstreamDecode(err.to_string())
        } else {
            ProxyError::Upstream(err.to_string())
        }
    }
}

/// Result type alias for delta proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::UpstreamStatus {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream returned status 502: bad gateway");

        let err: ProxyError = TimeseriesError::InvalidDuration("x".to_string()).into();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }
}
