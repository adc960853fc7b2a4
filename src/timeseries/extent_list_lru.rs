//! ExtentListLru - coverage viewed by recency
//!
//! Holds the same extents as an `ExtentList`, but every read stamps the
//! sub-range it touched with a `last_used` time. Extents that are only
//! partially read are split so that the read and unread portions carry
//! different stamps; `compress` refuses to merge across differing stamps,
//! so the split survives until the neighbours are read together again.
//!
//! ```text
//! before:  [0 ─────────────────────────── 1000]  lu=t0
//! read:            [200 ── 300]
//! after:   [0 ─ 140]  lu=t0
//!                  [200 ── 300]  lu=now
//!                               [360 ──── 1000]  lu=t0    (step = 60s)
//! ```

use crate::timeseries::epoch::Epoch;
use crate::timeseries::error::TimeseriesError;
use crate::timeseries::extent::Extent;
use crate::timeseries::extent_list::ExtentList;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Extents maintained with split-aware recency tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtentListLru(Vec<Extent>);

impl ExtentListLru {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Stamp the portion of the list overlapping `lur` with the current
    /// time, truncated to the second.
    pub fn update_last_used(&self, lur: &Extent, step: Duration) -> ExtentListLru {
        self.update_last_used_at(lur, step, Epoch::now_truncated())
    }

    /// Stamp the portion of the list overlapping `lur` with `now`.
    ///
    /// Extents entirely inside `lur` are stamped whole. Extents straddling
    /// a boundary of `lur` are split one `step` outside of it; the outer
    /// pieces keep their previous stamp. A read bound closer than one step
    /// to the extent bound leaves a single-instant outer piece. The result
    /// is compressed.
    pub fn update_last_used_at(&self, lur: &Extent, step: Duration, now: Epoch) -> ExtentListLru {
        if self.0.is_empty() {
            return ExtentListLru::new();
        }

        let mut out = ExtentList::with_capacity(self.0.len() + 2);
        for x in &self.0 {
            let mut x = *x;

            if lur.starts_at_or_before(x.start) && lur.ends_at_or_after(x.end) {
                x.last_used = now;
                out.push(x);
                continue;
            }

            if x.after(lur.end) || x.end < lur.start {
                out.push(x);
                continue;
            }

            // read starts inside x: break off the unread left portion
            if lur.start > x.start && lur.start <= x.end {
                out.push(Extent {
                    start: x.start,
                    end: (lur.start - step).max(x.start),
                    last_used: x.last_used,
                });
                x.start = lur.start;

                if lur.ends_at_or_after(x.end) {
                    x.last_used = now;
                    out.push(x);
                    continue;
                }
            }

            // read ends inside x: break off the unread right portion
            if lur.end < x.end && lur.end >= x.start {
                let right = Extent {
                    start: (lur.end + step).min(x.end),
                    end: x.end,
                    last_used: x.last_used,
                };
                x.end = lur.end;
                x.last_used = now;
                out.push(x);
                out.push(right);
            }
        }

        ExtentListLru::from(out.compress(step))
    }

    /// Copy of the list ordered by ascending `last_used`.
    ///
    /// The sort is stable, so extents with equal stamps keep their
    /// chronological order.
    pub fn sorted_by_recency(&self) -> ExtentListLru {
        let mut sorted = self.0.clone();
        sorted.sort_by_key(|e| e.last_used);
        ExtentListLru(sorted)
    }

    /// Iterate from least to most recently used
    pub fn iter_by_recency(&self) -> impl Iterator<Item = Extent> {
        self.sorted_by_recency().0.into_iter()
    }

    /// The extent that has gone unread the longest
    pub fn least_recently_used(&self) -> Option<&Extent> {
        self.0.iter().min_by_key(|e| e.last_used)
    }

    /// Plain coverage view, still in the current order
    pub fn to_extent_list(&self) -> ExtentList {
        ExtentList::from(self.0.clone())
    }
}

impl Deref for ExtentListLru {
    type Target = [Extent];

    fn deref(&self) -> &[Extent] {
        &self.0
    }
}

impl From<ExtentList> for ExtentListLru {
    fn from(list: ExtentList) -> Self {
        Self(list.into_inner())
    }
}

impl From<ExtentListLru> for ExtentList {
    fn from(list: ExtentListLru) -> Self {
        ExtentList::from(list.0)
    }
}

impl From<Vec<Extent>> for ExtentListLru {
    fn from(extents: Vec<Extent>) -> Self {
        Self(extents)
    }
}

impl fmt::Display for ExtentListLru {
    /// `start-end:lastUsed,...` in Unix seconds
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", e, e.last_used.unix_secs())?;
        }
        Ok(())
    }
}

impl FromStr for ExtentListLru {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(ExtentListLru::new());
        }
        let mut out = Vec::new();
        for part in s.split(',') {
            let (range, last_used) = part
                .split_once(':')
                .ok_or_else(|| TimeseriesError::InvalidExtent(part.to_string()))?;
            let last_used: i64 = last_used
                .trim()
                .parse()
                .map_err(|_| TimeseriesError::InvalidExtent(part.to_string()))?;
            let extent: Extent = range.parse()?;
            out.push(extent.last_used(Epoch::from_secs(last_used)));
        }
        Ok(ExtentListLru(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lru(s: &str) -> ExtentListLru {
        s.parse().unwrap()
    }

    const STEP: i64 = 60;

    fn step() -> Duration {
        Duration::seconds(STEP)
    }

    #[test]
    fn test_partial_read_splits() {
        let now = Epoch::from_secs(5_000);
        let el = lru("0-1000:10");
        let out = el.update_last_used_at(&Extent::from_secs(200, 300), step(), now);
        assert_eq!(out, lru("0-140:10,200-300:5000,360-1000:10"));
    }

    #[test]
    fn test_full_read_stamps_everything() {
        let now = Epoch::from_secs(5_000);
        let el = lru("100-200:10,300-400:20");
        let out = el.update_last_used_at(&Extent::from_secs(0, 1000), step(), now);
        assert_eq!(out, lru("100-200:5000,300-400:5000"));
    }

    #[test]
    fn test_read_over_left_edge() {
        let now = Epoch::from_secs(5_000);
        let el = lru("600-1200:10");
        let out = el.update_last_used_at(&Extent::from_secs(0, 900), step(), now);
        assert_eq!(out, lru("600-900:5000,960-1200:10"));
    }

    #[test]
    fn test_read_over_right_edge() {
        let now = Epoch::from_secs(5_000);
        let el = lru("600-1200:10");
        let out = el.update_last_used_at(&Extent::from_secs(900, 2000), step(), now);
        assert_eq!(out, lru("600-840:10,900-1200:5000"));
    }

    #[test]
    fn test_off_step_read_never_inverts() {
        let now = Epoch::from_secs(5_000);
        let el = lru("600-1200:10");

        let out = el.update_last_used_at(&Extent::from_secs(630, 900), step(), now);
        assert_eq!(out, lru("600-600:10,630-900:5000,960-1200:10"));

        let out = el.update_last_used_at(&Extent::from_secs(600, 1170), step(), now);
        assert_eq!(out, lru("600-1170:5000,1200-1200:10"));

        for e in out.iter() {
            assert!(e.start <= e.end);
        }
    }

    #[test]
    fn test_disjoint_read_keeps_stamps() {
        let now = Epoch::from_secs(5_000);
        let el = lru("600-1200:10,1800-2400:20");
        let out = el.update_last_used_at(&Extent::from_secs(1300, 1700), step(), now);
        assert_eq!(out, el);
    }

    #[test]
    fn test_sandwiched_extents_merge_after_stamp() {
        let now = Epoch::from_secs(5_000);
        let el = lru("0-100:1,160-200:2,260-300:3");
        let out = el.update_last_used_at(&Extent::from_secs(0, 300), step(), now);
        assert_eq!(out, lru("0-300:5000"));
    }

    #[test]
    fn test_update_empty() {
        let out = ExtentListLru::new().update_last_used(&Extent::from_secs(0, 10), step());
        assert!(out.is_empty());
    }

    #[test]
    fn test_update_uses_current_time() {
        let before = Epoch::now_truncated();
        let out = lru("0-1000:10").update_last_used(&Extent::from_secs(0, 1000), step());
        assert!(out[0].last_used >= before);
        assert_eq!(out[0].last_used, out[0].last_used.truncate(Duration::seconds(1)));
    }

    #[test]
    fn test_span_preserved_by_update() {
        let now = Epoch::from_secs(9_000);
        let el = lru("0-1200:1,1800-3000:2");
        for (s, e) in [(0, 0), (120, 480), (600, 2400), (2940, 5000)] {
            let out = el.update_last_used_at(&Extent::from_secs(s, e), step(), now);
            let plain: ExtentList = out.into();
            let merged = ExtentList::from(
                plain
                    .iter()
                    .map(|x| Extent::new(x.start, x.end))
                    .collect::<Vec<_>>(),
            )
            .compress(step());
            assert_eq!(merged.to_string(), "0-1200,1800-3000", "read {}-{}", s, e);
        }
    }

    #[test]
    fn test_sorted_by_recency_is_stable() {
        let el = lru("0-10:30,20-30:10,40-50:30,60-70:10");
        let sorted = el.sorted_by_recency();
        assert_eq!(sorted.to_string(), "20-30:10,60-70:10,0-10:30,40-50:30");

        let order: Vec<i64> = el.iter_by_recency().map(|e| e.start.unix_secs()).collect();
        assert_eq!(order, vec![20, 60, 0, 40]);

        assert_eq!(el.least_recently_used().map(|e| e.start.unix_secs()), Some(20));
        assert!(ExtentListLru::new().least_recently_used().is_none());
    }

    #[test]
    fn test_display_and_parse() {
        let el = lru("100-200:50,300-400:60");
        assert_eq!(el.to_string(), "100-200:50,300-400:60");
        assert_eq!(el.to_extent_list().to_string(), "100-200,300-400");
        assert!("100-200".parse::<ExtentListLru>().is_err());
        assert!("100-200:x".parse::<ExtentListLru>().is_err());
        assert!("".parse::<ExtentListLru>().unwrap().is_empty());
    }
}
