//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::deltaproxy::{DataPoint, LookupStatus};
use crate::timeseries::Extent;

// ============================================
// QUERY DTOs
// ============================================

/// Range query parameters
#[derive(Debug, Deserialize)]
pub struct RangeQueryParams {
    /// Query text; SQL comments may carry directives
    pub query: String,
    /// Start of the range (epoch seconds, epoch millis or SQL date/datetime)
    pub start: String,
    /// End of the range, same forms as `start`
    pub end: String,
    /// Sample interval, e.g. `60`, `60s`, `5m`
    pub step: String,
}

/// Range query response
#[derive(Debug, Serialize, Deserialize)]
pub struct RangeQueryResponse {
    pub status: String,
    /// Answered range after step alignment
    pub extent: ExtentDto,
    pub points: Vec<PointDto>,
    /// Ranges fetched from the upstream for this request
    pub fetched: Vec<ExtentDto>,
}

/// A sample, timestamp in ms since epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDto {
    pub timestamp: i64,
    pub value: f64,
}

impl From<&DataPoint> for PointDto {
    fn from(p: &DataPoint) -> Self {
        Self {
            timestamp: p.timestamp.unix_millis(),
            value: p.value,
        }
    }
}

/// A time range, bounds in ms since epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentDto {
    pub start: i64,
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
}

impl ExtentDto {
    /// Range without recency
    pub fn range(e: &Extent) -> Self {
        Self {
            start: e.start.unix_millis(),
            end: e.end.unix_millis(),
            last_used: None,
        }
    }

    /// Range with its last-used time
    pub fn with_recency(e: &Extent) -> Self {
        Self {
            last_used: Some(e.last_used.unix_millis()),
            ..Self::range(e)
        }
    }
}

/// Value of the `X-Cache-Status` response header
pub fn cache_status_header(status: LookupStatus, fetched: &[Extent]) -> String {
    let ranges: Vec<String> = fetched
        .iter()
        .map(|e| format!("{}-{}", e.start.unix_millis(), e.end.unix_millis()))
        .collect();
    format!(
        "engine=DeltaProxyCache; status={}; fetched=[{}]",
        status,
        ranges.join(",")
    )
}

// ============================================
// MANAGEMENT DTOs
// ============================================

/// Parameters identifying a cached series
#[derive(Debug, Deserialize)]
pub struct SeriesParams {
    pub query: String,
    pub step: String,
}

/// Coverage of one cached series
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtentsResponse {
    pub key: String,
    /// Compact `start-end:lastUsed` rendering, Unix seconds
    pub coverage: String,
    pub extents: Vec<ExtentDto>,
}

/// Purge response
#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub status: String,
    pub key: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded"
    pub status: String,
    /// Cache engine status: "ok" or "error"
    pub cache: String,
    pub cache_engine: String,
    pub backend: String,
    pub uptime_seconds: u64,
    pub version: String,
}
