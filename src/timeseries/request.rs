//! Time range queries and per-request options
//!
//! A `TimeRangeQuery` is what the delta proxy works on: the query text that
//! identifies the series, the requested extent and the sample step. Query
//! text may carry directives in SQL comments (see `sqlparser`) that tune
//! how much of the most recent data is treated as volatile, or whether the
//! fast-forward point is appended.

use crate::timeseries::epoch::{duration_nanos, parse_duration, Epoch};
use crate::timeseries::error::{TimeseriesError, TimeseriesResult};
use crate::timeseries::extent::Extent;
use crate::timeseries::sqlparser::normalize_statement;
use chrono::Duration;

/// Directive setting the backfill tolerance: `<duration>` or `<n>pts`
pub const BACKFILL_TOLERANCE_FLAG: &str = "deltacache-backfill-tolerance:";

/// Directive disabling fast forward when its value is `off`
pub const FAST_FORWARD_FLAG: &str = "deltacache-fast-forward:";

/// A range query against one series
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRangeQuery {
    /// Query text, sans time range; identifies the cached series
    pub statement: String,
    /// Requested time range
    pub extent: Extent,
    /// Sample interval
    pub step: Duration,
    /// Window before now whose data may still change upstream
    pub backfill_tolerance: Duration,
    /// Same window, expressed as a number of steps
    pub backfill_tolerance_points: i64,
}

impl TimeRangeQuery {
    pub fn new(statement: impl Into<String>, extent: Extent, step: Duration) -> Self {
        Self {
            statement: statement.into(),
            extent,
            step,
            backfill_tolerance: Duration::zero(),
            backfill_tolerance_points: 0,
        }
    }

    /// Key under which the series document is cached. Comments and
    /// whitespace layout in the statement do not change the key.
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}",
            normalize_statement(&self.statement),
            duration_nanos(self.step) / 1_000_000
        )
    }

    /// Clamp the end of the extent to `now`, then align both bounds to the
    /// step. Does nothing when the step is not positive.
    pub fn normalize_extent(&mut self, now: Epoch) {
        if self.step <= Duration::zero() {
            return;
        }
        if self.extent.end > now {
            self.extent.end = now;
        }
        self.extent.start = self.extent.start.truncate(self.step);
        self.extent.end = self.extent.end.truncate(self.step);
    }

    /// Read a backfill tolerance directive out of a comment body, if present
    pub fn extract_backfill_tolerance(&mut self, comment: &str) -> TimeseriesResult<()> {
        let Some(value) = directive_value(comment, BACKFILL_TOLERANCE_FLAG) else {
            return Ok(());
        };

        if let Some(points) = value.strip_suffix("pts") {
            self.backfill_tolerance_points = points
                .parse::<i64>()
                .ok()
                .filter(|p| *p >= 0)
                .ok_or_else(|| TimeseriesError::InvalidDirective(value.to_string()))?;
            return Ok(());
        }

        self.backfill_tolerance = parse_duration(value)
            .map_err(|_| TimeseriesError::InvalidDirective(value.to_string()))?;
        Ok(())
    }

    /// The volatile window for this query: the larger of the duration and the
    /// point-count tolerances, each falling back to the given default when the
    /// query does not set one.
    pub fn effective_backfill_tolerance(
        &self,
        default: Duration,
        default_points: i64,
    ) -> Duration {
        let duration = if self.backfill_tolerance > Duration::zero() {
            self.backfill_tolerance
        } else {
            default
        };
        let points = if self.backfill_tolerance_points > 0 {
            self.backfill_tolerance_points
        } else {
            default_points
        };

        let by_points = Duration::nanoseconds(duration_nanos(self.step).saturating_mul(points.max(0)));
        duration.max(by_points).max(Duration::zero())
    }
}

/// Per-request behavior toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Skip appending the fast-forward (instantaneous) point
    pub fast_forward_disable: bool,
}

impl RequestOptions {
    /// Read a fast-forward directive out of a comment body, if present
    pub fn extract_fast_forward_disabled(&mut self, comment: &str) {
        if let Some(value) = directive_value(comment, FAST_FORWARD_FLAG) {
            if value.eq_ignore_ascii_case("off") {
                self.fast_forward_disable = true;
            }
        }
    }
}

/// Value following `flag` in `comment`, up to the next whitespace.
/// The flag match is ASCII case-insensitive.
fn directive_value<'a>(comment: &'a str, flag: &str) -> Option<&'a str> {
    let at = comment.to_ascii_lowercase().find(flag)?;
    let rest = &comment[at + flag.len()..];
    let value = rest.split_whitespace().next()?;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> TimeRangeQuery {
        TimeRangeQuery::new(
            "SELECT avg(cpu) FROM hosts",
            Extent::from_secs(1_000, 5_000),
            Duration::seconds(60),
        )
    }

    #[test]
    fn test_normalize_extent() {
        let mut trq = query();
        trq.extent = Extent::from_secs(1_010, 4_990);
        trq.normalize_extent(Epoch::from_secs(10_000));
        assert_eq!(trq.extent, Extent::from_secs(960, 4_980));
    }

    #[test]
    fn test_normalize_extent_clamps_future_end() {
        let mut trq = query();
        trq.normalize_extent(Epoch::from_secs(3_030));
        assert_eq!(trq.extent, Extent::from_secs(960, 3_000));
    }

    #[test]
    fn test_normalize_extent_without_step() {
        let mut trq = query();
        trq.step = Duration::zero();
        trq.normalize_extent(Epoch::from_secs(10));
        assert_eq!(trq.extent, Extent::from_secs(1_000, 5_000));
    }

    #[test]
    fn test_extract_backfill_tolerance() {
        let mut trq = query();
        trq.extract_backfill_tolerance("deltacache-backfill-tolerance:5m").unwrap();
        assert_eq!(trq.backfill_tolerance, Duration::minutes(5));

        trq.extract_backfill_tolerance(" Deltacache-Backfill-Tolerance:12pts trailing")
            .unwrap();
        assert_eq!(trq.backfill_tolerance_points, 12);

        trq.extract_backfill_tolerance("unrelated comment").unwrap();
        assert_eq!(trq.backfill_tolerance, Duration::minutes(5));

        assert!(matches!(
            trq.extract_backfill_tolerance("deltacache-backfill-tolerance:soon"),
            Err(TimeseriesError::InvalidDirective(_))
        ));
        assert!(trq
            .extract_backfill_tolerance("deltacache-backfill-tolerance:-3pts")
            .is_err());
    }

    #[test]
    fn test_effective_backfill_tolerance() {
        let mut trq = query();
        assert_eq!(
            trq.effective_backfill_tolerance(Duration::seconds(30), 0),
            Duration::seconds(30)
        );
        // three steps beat thirty seconds
        assert_eq!(
            trq.effective_backfill_tolerance(Duration::seconds(30), 3),
            Duration::seconds(180)
        );

        trq.backfill_tolerance = Duration::minutes(10);
        trq.backfill_tolerance_points = 2;
        assert_eq!(
            trq.effective_backfill_tolerance(Duration::seconds(30), 3),
            Duration::minutes(10)
        );
        assert_eq!(
            query().effective_backfill_tolerance(Duration::zero(), 0),
            Duration::zero()
        );
    }

    #[test]
    fn test_extract_fast_forward_disabled() {
        let mut ro = RequestOptions::default();
        ro.extract_fast_forward_disabled("deltacache-fast-forward:on");
        assert!(!ro.fast_forward_disable);
        ro.extract_fast_forward_disabled("deltacache-fast-forward:OFF");
        assert!(ro.fast_forward_disable);
    }

    #[test]
    fn test_cache_key() {
        let trq = query();
        assert_eq!(trq.cache_key(), "SELECT avg(cpu) FROM hosts|60000");

        let mut other = query();
        other.step = Duration::seconds(15);
        assert_ne!(trq.cache_key(), other.cache_key());
    }

    #[test]
    fn test_cache_key_ignores_directives() {
        let step = Duration::seconds(60);
        let range = Extent::from_secs(0, 600);
        let plain = TimeRangeQuery::new("up", range, step);
        let tuned = TimeRangeQuery::new("up /* deltacache-fast-forward: off */", range, step);
        let tolerant = TimeRangeQuery::new("up\n-- deltacache-backfill-tolerance:5m", range, step);

        assert_eq!(plain.cache_key(), "up|60000");
        assert_eq!(tuned.cache_key(), plain.cache_key());
        assert_eq!(tolerant.cache_key(), plain.cache_key());

        let literal = TimeRangeQuery::new("SELECT '--x' FROM t", range, step);
        assert_eq!(literal.cache_key(), "SELECT '--x' FROM t|60000");
    }
}
