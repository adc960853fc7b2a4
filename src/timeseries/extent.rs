//! Extent - a closed time interval with a recency tag

use crate::timeseries::epoch::Epoch;
use crate::timeseries::error::TimeseriesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A closed interval `[start, end]` of cached (or missing) timestamps.
///
/// `last_used` records the most recent read satisfied by this range and is
/// only meaningful to the LRU view. A zero `start` or `end` marks an
/// unbounded/unknown extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// First timestamp in the range (inclusive)
    pub start: Epoch,
    /// Last timestamp in the range (inclusive)
    pub end: Epoch,
    /// When this range last satisfied a read
    #[serde(default)]
    pub last_used: Epoch,
}

impl Extent {
    pub fn new(start: Epoch, end: Epoch) -> Self {
        Self {
            start,
            end,
            last_used: Epoch::ZERO,
        }
    }

    /// Convenience constructor from Unix seconds
    pub fn from_secs(start: i64, end: i64) -> Self {
        Self::new(Epoch::from_secs(start), Epoch::from_secs(end))
    }

    /// Builder: set the recency tag
    pub fn last_used(mut self, last_used: Epoch) -> Self {
        self.last_used = last_used;
        self
    }

    /// True if the extent starts after `t`
    pub fn after(&self, t: Epoch) -> bool {
        self.start > t
    }

    pub fn starts_at_or_before(&self, t: Epoch) -> bool {
        self.start <= t
    }

    pub fn ends_at_or_after(&self, t: Epoch) -> bool {
        self.end >= t
    }

    /// True if `t` lies within the closed interval
    pub fn includes(&self, t: Epoch) -> bool {
        self.start <= t && t <= self.end
    }

    /// True if either bound is the zero (unbounded) marker
    pub fn is_zero(&self) -> bool {
        self.start.is_zero() || self.end.is_zero()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.unix_secs(), self.end.unix_secs())
    }
}

impl FromStr for Extent {
    type Err = TimeseriesError;

    /// Parse `start-end` in Unix seconds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeseriesError::InvalidExtent(s.to_string());
        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start: i64 = start.trim().parse().map_err(|_| invalid())?;
        let end: i64 = end.trim().parse().map_err(|_| invalid())?;
        Ok(Extent::from_secs(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let e = Extent::from_secs(100, 200);

        assert!(e.includes(Epoch::from_secs(100)));
        assert!(e.includes(Epoch::from_secs(200)));
        assert!(!e.includes(Epoch::from_secs(201)));

        assert!(e.after(Epoch::from_secs(99)));
        assert!(!e.after(Epoch::from_secs(100)));

        assert!(e.starts_at_or_before(Epoch::from_secs(100)));
        assert!(e.ends_at_or_after(Epoch::from_secs(200)));
        assert!(!e.ends_at_or_after(Epoch::from_secs(201)));
    }

    #[test]
    fn test_zero_extent() {
        assert!(Extent::default().is_zero());
        assert!(Extent::new(Epoch::ZERO, Epoch::from_secs(10)).is_zero());
        assert!(!Extent::from_secs(1, 10).is_zero());
    }

    #[test]
    fn test_display_and_parse() {
        let e = Extent::from_secs(100, 400);
        assert_eq!(e.to_string(), "100-400");
        assert_eq!("100-400".parse::<Extent>().unwrap(), e);
        assert!("100".parse::<Extent>().is_err());
        assert!("a-b".parse::<Extent>().is_err());
    }
}
