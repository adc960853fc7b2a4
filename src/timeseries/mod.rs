//! Time-Range Coverage Algebra
//!
//! Describes which portions of a series are cached and computes what is
//! missing from a request:
//!
//! - **epoch**: Nanosecond timestamps, truncation and textual time parsing
//! - **extent**: A closed time interval with a recency tag
//! - **extent_list**: Coverage of one series (deltas, removal, splicing)
//! - **extent_list_lru**: The same coverage with split-aware recency
//! - **request**: Range queries and per-request options
//! - **sqlparser**: Directives carried in SQL comments
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Read Path:
//!   need → calculate_deltas(cached) → splice(shard limits) → upstream fetch
//!
//! Write Path:
//!   cached ∪ fetched → compress(step) → update_last_used(need) → store
//!
//! Eviction:
//!   sorted_by_recency → remove(victims, step)
//! ```
//!
//! # Example
//!
//! ```rust
//! use deltacache::timeseries::{Extent, ExtentList};
//! use chrono::Duration;
//!
//! let cached: ExtentList = "100-200".parse().unwrap();
//! let deltas = cached.calculate_deltas(&Extent::from_secs(100, 400), Duration::seconds(60));
//! assert_eq!(deltas.to_string(), "220-400");
//! ```

pub mod epoch;
pub mod error;
pub mod extent;
pub mod extent_list;
pub mod extent_list_lru;
pub mod request;
pub mod sqlparser;

// Re-export commonly used types
pub use epoch::{duration_nanos, parse_duration, parse_epoch, Epoch, EpochFormat};
pub use error::{TimeseriesError, TimeseriesResult};
pub use extent::Extent;
pub use extent_list::ExtentList;
pub use extent_list_lru::ExtentListLru;
pub use request::{RequestOptions, TimeRangeQuery};
pub use sqlparser::{apply_directives, extract_comments, normalize_statement};
