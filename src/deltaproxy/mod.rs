//! Delta Proxy Cache
//!
//! Serves time-series range queries from cached series documents, fetching
//! only the missing sub-ranges from the upstream backend:
//!
//! - **engine**: The lookup / fetch / merge / store pipeline
//! - **document**: Cached coverage plus samples, and their storage encoding
//! - **upstream**: Backend trait and the HTTP JSON implementation
//! - **eviction**: Per-series retention (oldest or least recently used)
//! - **error**: Error types

pub mod document;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod upstream;

pub use document::{DataPoint, SeriesDocument};
pub use engine::{DeltaProxyCache, LookupStatus, ProxyOptions, ProxyResponse};
pub use error::{ProxyError, ProxyResult};
pub use eviction::{enforce_retention, EvictionMethod};
pub use upstream::{HttpUpstream, Upstream};
