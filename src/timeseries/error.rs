//! Timeseries error types
//!
//! The range algebra itself never fails; these errors come from parsing
//! textual timestamps, durations, extents and query directives.

use thiserror::Error;

/// Errors that can occur while parsing time-series request artifacts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeseriesError {
    /// Timestamp text is not in a supported format
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// Duration text could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Extent text is not `start-end` (or `start-end:lastUsed`)
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    /// A query directive carried an unusable value
    #[error("Invalid directive: {0}")]
    InvalidDirective(String),
}

/// Result type alias for timeseries parsing operations
pub type TimeseriesResult<T> = Result<T, TimeseriesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TimeseriesError::InvalidTimeFormat("yesterday".to_string());
        assert_eq!(err.to_string(), "Invalid time format: yesterday");

        let err = TimeseriesError::InvalidExtent("100".to_string());
        assert_eq!(err.to_string(), "Invalid extent: 100");
    }
}
