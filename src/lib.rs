//! # deltacache
//!
//! A caching reverse proxy for time-series backends. Range queries are
//! answered from cached series, and only the sub-ranges the cache lacks are
//! fetched from the upstream.
//!
//! ## Features
//!
//! - **Range algebra**: Extent lists with delta calculation, compression,
//!   cropping, removal and shard splicing
//! - **Recency tracking**: Extents tagged with when they last served a read,
//!   for LRU retention
//! - **Query directives**: Backfill tolerance and fast-forward toggles read
//!   from SQL comments
//! - **Cache engines**: In-memory or SQLite, with per-key locking
//!
//! ## Modules
//!
//! - [`timeseries`]: Epochs, extents and the range algebra
//! - [`cache`]: Byte-oriented cache engines
//! - [`deltaproxy`]: The delta proxy engine and upstream clients
//! - [`api`]: HTTP front with Axum
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use deltacache::timeseries::{Extent, ExtentList};
//! use chrono::Duration;
//!
//! let cached: ExtentList = "1577836800-1577840400".parse().unwrap();
//! let need = Extent::from_secs(1_577_836_800, 1_577_844_000);
//!
//! let missing = cached.calculate_deltas(&need, Duration::seconds(60));
//! assert_eq!(missing.len(), 1);
//! assert_eq!(missing[0].start, deltacache::timeseries::Epoch::from_secs(1_577_840_460));
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod deltaproxy;
pub mod timeseries;

// Re-export top-level types for convenience
pub use timeseries::{
    parse_duration, parse_epoch, Epoch, Extent, ExtentList, ExtentListLru, RequestOptions,
    TimeRangeQuery, TimeseriesError, TimeseriesResult,
};

pub use cache::{open_cache, Cache, CacheError, CacheProvider, CacheResult, MemoryCache, SqliteCache};

pub use deltaproxy::{
    DataPoint, DeltaProxyCache, EvictionMethod, HttpUpstream, LookupStatus, ProxyError,
    ProxyOptions, ProxyResponse, ProxyResult, SeriesDocument, Upstream,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{BackendConfig, CacheConfig, Config, ConfigError, LoggingConfig, ProxyConfig};
