//! Delta proxy engine
//!
//! Serves range queries from the cache, fetching only what is missing.
//!
//! # Request Flow
//!
//! ```text
//! normalize need ─→ lock(key) ─→ load document ─→ unlock
//!        │
//!        ├─ hide backfill-volatile window from coverage
//!        ├─ calculate_deltas(need) ─→ splice(shard limits)
//!        ├─ fetch chunks concurrently (no lock held)
//!        │
//!        └─ lock(key) ─→ reload ─→ merge ─→ compress ─→ update_last_used
//!                     ─→ retention ─→ store(ttl) ─→ unlock
//! ```
//!
//! The document is reloaded after the fetch because another request for the
//! same series may have committed while this one was waiting on upstream.

use crate::cache::Cache;
use crate::config::BackendConfig;
use crate::deltaproxy::document::{DataPoint, SeriesDocument};
use crate::deltaproxy::error::{ProxyError, ProxyResult};
use crate::deltaproxy::eviction::{enforce_retention, EvictionMethod};
use crate::deltaproxy::upstream::Upstream;
use crate::timeseries::{Epoch, Extent, ExtentList, ExtentListLru, RequestOptions, TimeRangeQuery};
use chrono::Duration;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// How much of a request the cache could answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupStatus {
    /// Fully served from cache
    Hit,
    /// Some ranges fetched from upstream
    #[serde(rename = "phit")]
    PartialHit,
    /// Series cached, but none of the requested range
    #[serde(rename = "rmiss")]
    RangeMiss,
    /// Series not cached at all
    #[serde(rename = "kmiss")]
    KeyMiss,
}

impl LookupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupStatus::Hit => "hit",
            LookupStatus::PartialHit => "phit",
            LookupStatus::RangeMiss => "rmiss",
            LookupStatus::KeyMiss => "kmiss",
        }
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-backend caching behavior
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Widest single upstream fetch (zero: unlimited)
    pub shard_max_size_time: Duration,
    /// Cadence shard boundaries align to (zero: unaligned)
    pub shard_step: Duration,
    /// Most samples per upstream fetch (zero: unlimited)
    pub shard_max_size_points: i64,
    /// Default volatile window before now
    pub backfill_tolerance: Duration,
    /// Default volatile window in steps
    pub backfill_tolerance_points: i64,
    /// Most samples retained per series (zero: unlimited)
    pub retention_factor: i64,
    pub eviction_method: EvictionMethod,
    /// Lifetime of a stored series document
    pub ttl: std::time::Duration,
    pub fast_forward_disable: bool,
    pub max_concurrent_fetches: usize,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            shard_max_size_time: Duration::zero(),
            shard_step: Duration::zero(),
            shard_max_size_points: 0,
            backfill_tolerance: Duration::zero(),
            backfill_tolerance_points: 0,
            retention_factor: 1024,
            eviction_method: EvictionMethod::Oldest,
            ttl: std::time::Duration::from_secs(21_600),
            fast_forward_disable: false,
            max_concurrent_fetches: 4,
        }
    }
}

impl From<&BackendConfig> for ProxyOptions {
    fn from(config: &BackendConfig) -> Self {
        Self {
            shard_max_size_time: millis(config.shard_max_size_time_ms),
            shard_step: millis(config.shard_step_ms),
            shard_max_size_points: saturating_i64(config.shard_max_size_points),
            backfill_tolerance: seconds(config.backfill_tolerance_secs),
            backfill_tolerance_points: saturating_i64(config.backfill_tolerance_points),
            retention_factor: saturating_i64(config.timeseries_retention_factor),
            eviction_method: config.eviction_method(),
            ttl: std::time::Duration::from_secs(config.timeseries_ttl_secs),
            fast_forward_disable: config.fast_forward_disable,
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
        }
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// durations stay within what i64 nanoseconds can hold
fn millis(ms: u64) -> Duration {
    Duration::milliseconds(saturating_i64(ms).min(i64::MAX / 1_000_000))
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(saturating_i64(secs).min(i64::MAX / 1_000_000_000))
}

/// Outcome of one range query
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: LookupStatus,
    /// Normalized range that was answered
    pub extent: Extent,
    /// Samples within `extent`, ascending (plus the fast-forward point)
    pub points: Vec<DataPoint>,
    /// Ranges fetched from upstream for this request
    pub fetched: ExtentList,
}

/// Caching front for one upstream backend
pub struct DeltaProxyCache {
    cache: Arc<dyn Cache>,
    upstream: Arc<dyn Upstream>,
    options: ProxyOptions,
}

impl DeltaProxyCache {
    pub fn new(cache: Arc<dyn Cache>, upstream: Arc<dyn Upstream>, options: ProxyOptions) -> Self {
        Self {
            cache,
            upstream,
            options,
        }
    }

    pub fn options(&self) -> &ProxyOptions {
        &self.options
    }

    /// Answer `trq`, fetching only the ranges the cache lacks
    pub async fn fetch_timeseries(
        &self,
        trq: TimeRangeQuery,
        ro: RequestOptions,
    ) -> ProxyResult<ProxyResponse> {
        self.fetch_timeseries_at(trq, ro, Epoch::now()).await
    }

    pub(crate) async fn fetch_timeseries_at(
        &self,
        mut trq: TimeRangeQuery,
        ro: RequestOptions,
        now: Epoch,
    ) -> ProxyResult<ProxyResponse> {
        if trq.step <= Duration::zero() {
            return Err(ProxyError::InvalidRequest("step must be positive".to_string()));
        }
        if trq.extent.end < trq.extent.start {
            return Err(ProxyError::InvalidRequest(format!(
                "range end precedes start: {}",
                trq.extent
            )));
        }

        trq.normalize_extent(now);
        let need = trq.extent;
        let step = trq.step;
        let key = trq.cache_key();

        let cached = {
            let _guard = self.cache.locker().lock(&key).await?;
            self.load(&key).await?
        };
        let key_miss = cached.is_none();
        let coverage = cached.map(|doc| doc.extents.to_extent_list()).unwrap_or_default();

        let tolerance = trq.effective_backfill_tolerance(
            self.options.backfill_tolerance,
            self.options.backfill_tolerance_points,
        );
        let visible = if tolerance > Duration::zero() && !coverage.is_empty() {
            let volatile = Extent::new(now - tolerance, Epoch::MAX);
            coverage.remove(&ExtentList::from(vec![volatile]), step)
        } else {
            coverage
        };

        let deltas = visible.calculate_deltas(&need, step);
        let status = if key_miss {
            LookupStatus::KeyMiss
        } else if deltas.is_empty() {
            LookupStatus::Hit
        } else if deltas.len() == 1 && deltas[0].start == need.start && deltas[0].end == need.end {
            LookupStatus::RangeMiss
        } else {
            LookupStatus::PartialHit
        };

        let chunks = deltas.splice(
            step,
            self.options.shard_max_size_time,
            self.options.shard_step,
            self.options.shard_max_size_points,
        );
        tracing::debug!(
            key = %key,
            status = %status,
            deltas = %deltas,
            chunks = chunks.len(),
            "delta proxy lookup"
        );

        let fetched = self.fetch_chunks(&trq.statement, &chunks, step).await?;

        let mut points = {
            let _guard = self.cache.locker().lock(&key).await?;
            let mut doc = self.load(&key).await?.unwrap_or_default();

            let fetched_list: ExtentList = fetched.iter().map(|(e, _)| *e).collect();
            let existing = doc.extents.to_extent_list();
            let mut merged = if existing.is_empty() || fetched_list.is_empty() {
                existing
            } else {
                existing.remove(&fetched_list, step)
            };
            merged.extend(fetched_list.iter().copied());

            for (extent, chunk_points) in &fetched {
                doc.clear_points(extent);
                doc.merge(chunk_points.iter().copied());
            }

            doc.extents = ExtentListLru::from(merged.compress(step))
                .update_last_used_at(&need, step, now.truncate(Duration::seconds(1)));
            doc.prune_uncovered();
            let points = doc.crop_points(&need);

            if enforce_retention(
                &mut doc,
                step,
                self.options.retention_factor,
                self.options.eviction_method,
            ) {
                tracing::debug!(key = %key, extents = %doc.extents, "retention enforced");
            }
            self.cache.store(&key, doc.encode()?, self.options.ttl).await?;
            points
        };

        if !ro.fast_forward_disable && !self.options.fast_forward_disable {
            self.fast_forward(&trq, now, &mut points).await;
        }

        Ok(ProxyResponse {
            status,
            extent: need,
            points,
            fetched: fetched.into_iter().map(|(e, _)| e).collect(),
        })
    }

    /// Current coverage of the series behind `key`, if cached
    pub async fn extents(&self, key: &str) -> ProxyResult<Option<ExtentListLru>> {
        Ok(self.load(key).await?.map(|doc| doc.extents))
    }

    /// Drop the series behind `key`
    pub async fn purge(&self, key: &str) -> ProxyResult<()> {
        let _guard = self.cache.locker().lock(key).await?;
        self.cache.remove(key).await?;
        tracing::info!(key = %key, "purged cached series");
        Ok(())
    }

    /// Load the document under `key`; absent or undecodable reads as `None`
    async fn load(&self, key: &str) -> ProxyResult<Option<SeriesDocument>> {
        let bytes = match self.cache.retrieve(key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_miss() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match SeriesDocument::decode(&bytes) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding undecodable cached series");
                Ok(None)
            }
        }
    }

    async fn fetch_chunks(
        &self,
        statement: &str,
        chunks: &ExtentList,
        step: Duration,
    ) -> ProxyResult<Vec<(Extent, Vec<DataPoint>)>> {
        let upstream = &self.upstream;
        stream::iter(chunks.iter().copied())
            .map(|chunk| async move {
                let points = upstream.fetch(statement, &chunk, step).await?;
                Ok::<_, ProxyError>((chunk, points))
            })
            .buffer_unordered(self.options.max_concurrent_fetches.max(1))
            .try_collect()
            .await
    }

    /// Append the instantaneous value when the request ends at the current step
    async fn fast_forward(&self, trq: &TimeRangeQuery, now: Epoch, points: &mut Vec<DataPoint>) {
        if trq.extent.end != now.truncate(trq.step) {
            return;
        }
        match self.upstream.fetch_instant(&trq.statement).await {
            Ok(Some(point)) => {
                let newer = points.last().map_or(true, |last| point.timestamp > last.timestamp);
                if newer {
                    points.push(point);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "fast forward fetch failed"),
        }
    }
}
