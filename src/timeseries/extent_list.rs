//! ExtentList - the coverage map of one cached series
//!
//! An `ExtentList` records which time ranges of a series are held in cache.
//! All operations return new lists; the receiver is never modified, so a
//! list loaded from storage can be shared freely while deltas are computed.
//!
//! # Canonical form
//!
//! After `compress`, a list is sorted ascending by `start` and no two entries
//! overlap or sit within one `step` of each other unless their `last_used`
//! tags differ. Lists straight out of a merge may be unsorted and overlapping.
//!
//! ```text
//! cached:   [100 ─── 200]          [400 ─── 600]
//! need:     [100 ──────────────────────────── 700]
//! deltas:                [220-340]              [620-700]   (step = 60s)
//! ```

use crate::timeseries::epoch::{duration_nanos, Epoch};
use crate::timeseries::error::TimeseriesError;
use crate::timeseries::extent::Extent;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Approximate bytes of memory held per extent
const EXTENT_SIZE_BYTES: usize = 72;

/// An ordered collection of extents describing cached coverage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtentList(Vec<Extent>);

impl ExtentList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, extent: Extent) {
        self.0.push(extent);
    }

    pub fn into_inner(self) -> Vec<Extent> {
        self.0
    }

    // ==================== Relational Predicates ====================

    /// True if `e` lies entirely within the span of the list
    pub fn encompasses(&self, e: &Extent) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => e.start >= first.start && e.end <= last.end,
            _ => false,
        }
    }

    /// True if the span of the list lies entirely within `e`
    pub fn encompassed_by(&self, e: &Extent) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => first.start >= e.start && last.end <= e.end,
            _ => false,
        }
    }

    /// True if `e` does not overlap the span of the list at all.
    /// An empty list is vacuously outside of everything.
    pub fn outside_of(&self, e: &Extent) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => e.after(last.end) || first.after(e.end),
            _ => true,
        }
    }

    /// Element-wise comparison against a possibly absent list.
    ///
    /// Comparing against `None` is always false, even for an empty subject.
    pub fn equal(&self, other: Option<&ExtentList>) -> bool {
        match other {
            Some(other) => self.0 == other.0,
            None => false,
        }
    }

    /// True if any extent includes `ts`
    pub fn covers(&self, ts: Epoch) -> bool {
        self.0.iter().any(|e| e.includes(ts))
    }

    // ==================== Canonicalization ====================

    /// Clip every extent to the window `ex`, dropping extents outside of it.
    ///
    /// When the window boundary coincides with an extent endpoint, the
    /// extent collapses to a zero-width marker at that point.
    pub fn crop(&self, ex: &Extent) -> ExtentList {
        let mut out = Vec::with_capacity(self.0.len());
        for e in &self.0 {
            if e.end < ex.start || e.start > ex.end {
                continue;
            }
            let mut start = e.start;
            let mut end = e.end;
            if ex.start > start && ex.start < end {
                start = ex.start;
            } else if ex.start == end {
                start = ex.start;
                end = ex.start;
            }
            if ex.end < end && ex.end > start {
                end = ex.end;
            } else if ex.end == start {
                start = ex.end;
                end = ex.end;
            }
            out.push(Extent {
                start,
                end,
                last_used: e.last_used,
            });
        }
        ExtentList(out)
    }

    /// Sort by start and merge extents that overlap or sit within one `step`
    /// of each other, provided their `last_used` tags match.
    pub fn compress(&self, step: Duration) -> ExtentList {
        let mut sorted = self.0.clone();
        sorted.sort_by_key(|e| e.start);

        let mut iter = sorted.into_iter();
        let Some(mut current) = iter.next() else {
            return ExtentList::new();
        };

        let mut out = Vec::new();
        for next in iter {
            if next.start <= current.end + step && next.last_used == current.last_used {
                if next.end > current.end {
                    current.end = next.end;
                }
                continue;
            }
            out.push(current);
            current = next;
        }
        out.push(current);
        ExtentList(out)
    }

    // ==================== Delta Algebra ====================

    /// Compute the sub-ranges of `need` that this list does not cover.
    ///
    /// Timestamps are sampled on the grid `need.start + k * step`. Runs of
    /// uncovered grid timestamps become one miss extent; a run still open at
    /// the end of the grid extends to `need.end`.
    ///
    /// The scan jumps from extent boundary to extent boundary instead of
    /// visiting every grid timestamp, so its cost is proportional to the
    /// number of extents rather than to `span / step`.
    pub fn calculate_deltas(&self, need: &Extent, step: Duration) -> ExtentList {
        let step = duration_nanos(step) as i128;
        if step <= 0 || need.end <= need.start {
            return ExtentList::new();
        }
        if self.0.is_empty() {
            return ExtentList(vec![*need]);
        }

        let mut el = self.0.clone();
        el.sort_by_key(|e| e.start);

        let origin = need.start.nanos() as i128;
        let stop = need.end.nanos() as i128;
        let to_epoch = |ns: i128| Epoch::from_nanos(ns as i64);

        let mut out = Vec::with_capacity(el.len() + 1);
        let mut miss_start: Option<i128> = None;
        let mut ts = origin;
        let mut j = 0;

        while ts <= stop {
            // advance to the first extent that could still contain ts
            while j < el.len() && ts > el[j].end.nanos() as i128 {
                j += 1;
            }

            let covering = el.get(j).filter(|e| e.start.nanos() as i128 <= ts);
            match covering {
                Some(e) => {
                    if let Some(ms) = miss_start.take() {
                        out.push(Extent::new(to_epoch(ms), to_epoch(ts - step)));
                    }
                    // first grid timestamp past the covering extent
                    let end = e.end.nanos() as i128;
                    ts = origin + ((end - origin).div_euclid(step) + 1) * step;
                }
                None => {
                    if miss_start.is_none() {
                        miss_start = Some(ts);
                    }
                    match el.get(j) {
                        // first grid timestamp at or after the next extent
                        Some(next) => {
                            let distance = next.start.nanos() as i128 - origin;
                            ts = origin + (distance + step - 1).div_euclid(step) * step;
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(ms) = miss_start {
            out.push(Extent::new(to_epoch(ms), need.end));
        }
        ExtentList(out)
    }

    /// Subtract the ranges in `r` from this list.
    ///
    /// A removal that swallows an extent deletes it, one strictly inside an
    /// extent splits it in two, and one overlapping a single side trims that
    /// side inward to one `step` beyond the removal.
    pub fn remove(&self, r: &ExtentList, step: Duration) -> ExtentList {
        if r.0.is_empty() {
            return self.clone();
        }
        if self.0.is_empty() {
            return r.clone();
        }

        // ascending removals keep earlier split-off left pieces out of reach
        let mut removals = r.0.clone();
        removals.sort_by_key(|e| e.start);

        let mut splices: HashSet<usize> = HashSet::new();
        let mut splice_ins: HashMap<usize, Vec<Extent>> = HashMap::new();
        let mut c = self.0.clone();

        for rem in &removals {
            for (i, ex) in c.iter_mut().enumerate() {
                if rem.end < ex.start || rem.start > ex.end {
                    continue;
                }

                if rem.starts_at_or_before(ex.start) && rem.ends_at_or_after(ex.end) {
                    splices.insert(i);
                    continue;
                }

                if rem.start > ex.start && rem.end < ex.end {
                    splice_ins.entry(i).or_default().push(Extent {
                        start: ex.start,
                        end: rem.start - step,
                        last_used: ex.last_used,
                    });
                    ex.start = rem.end + step;
                    continue;
                }

                if rem.start > ex.start {
                    ex.end = rem.start - step;
                } else if rem.end < ex.end {
                    ex.start = rem.end + step;
                }
            }
        }

        let mut out = Vec::with_capacity(c.len() * 2);
        for (i, ex) in c.into_iter().enumerate() {
            if let Some(left) = splice_ins.remove(&i) {
                out.extend(left);
            }
            if !splices.contains(&i) {
                out.push(ex);
            }
        }
        // a trim narrower than one step leaves nothing behind
        out.retain(|e| e.end >= e.start);
        ExtentList(out)
    }

    // ==================== Splicing ====================

    /// Break extents into bounded fetch chunks.
    ///
    /// Exactly one strategy applies: by point count when `max_points` is
    /// non-zero, otherwise epoch-aligned when `splice_step` is non-zero,
    /// otherwise by absolute duration. The list is expected to be compressed.
    pub fn splice(
        &self,
        step: Duration,
        max_range: Duration,
        splice_step: Duration,
        max_points: i64,
    ) -> ExtentList {
        if self.0.is_empty() {
            return ExtentList::new();
        }
        if max_points == 0 {
            if splice_step.is_zero() {
                return self.splice_by_time(step, max_range);
            }
            return self.splice_by_time_aligned(step, max_range, splice_step);
        }
        self.splice_by_points(step, max_points)
    }

    /// Cut any extent wider than `max_range` into consecutive `max_range`
    /// chunks aligned to `step`, clamping the last one to the true end.
    pub fn splice_by_time(&self, step: Duration, max_range: Duration) -> ExtentList {
        if !is_positive(step) || !is_positive(max_range) {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.0.len() + self.0.len() / 2);
        for e in &self.0 {
            if e.end - e.start <= max_range {
                out.push(*e);
                continue;
            }
            push_chunks(&mut out, e, step, |i| {
                (i + (max_range - step)).truncate(step)
            });
        }
        ExtentList(out)
    }

    /// Like `splice_by_time`, but chunk boundaries fall on multiples of
    /// `splice_step` measured from the Unix epoch. An extent that does not
    /// start on the cadence first yields a short leading chunk up to the
    /// next boundary. When that chunk cannot end on the step grid at or after
    /// the extent start, the extent is chunked from its own start instead.
    /// `max_range` should be a multiple of `splice_step`.
    pub fn splice_by_time_aligned(
        &self,
        step: Duration,
        max_range: Duration,
        splice_step: Duration,
    ) -> ExtentList {
        if !is_positive(step) || !is_positive(max_range) || !is_positive(splice_step) {
            return self.clone();
        }
        let fits = |e: &Extent| {
            e.end - e.start <= max_range
                && e.end.truncate(splice_step) == e.start.truncate(splice_step)
        };

        let mut out = Vec::with_capacity(self.0.len() + self.0.len() / 2);
        for e in &self.0 {
            if fits(e) {
                out.push(*e);
                continue;
            }

            let mut e = *e;
            let boundary = e.start.truncate(splice_step);
            if boundary < e.start {
                let next_boundary = boundary + splice_step;
                // last step strictly before the next boundary
                let mut left_end = next_boundary.truncate(step);
                if left_end >= next_boundary {
                    left_end = left_end - step;
                }
                // a cut before the extent start leaves the extent whole
                if left_end >= e.start {
                    out.push(Extent {
                        start: e.start,
                        end: left_end,
                        last_used: e.last_used,
                    });
                    e.start = left_end + step;
                    if e.start > e.end {
                        continue;
                    }
                }
            }

            if fits(&e) {
                out.push(e);
                continue;
            }
            push_chunks(&mut out, &e, step, |i| {
                (i + (max_range - step)).truncate(step)
            });
        }
        ExtentList(out)
    }

    /// Cut extents so each chunk holds at most `max_points` samples at `step`.
    /// Extents with a zero bound pass through untouched.
    pub fn splice_by_points(&self, step: Duration, max_points: i64) -> ExtentList {
        if max_points <= 0 || !is_positive(step) {
            return self.clone();
        }
        let step_ns = duration_nanos(step);
        let chunk_span = Duration::nanoseconds(step_ns.saturating_mul(max_points - 1));

        let mut out = Vec::with_capacity(self.0.len() + self.0.len() / 2);
        for e in &self.0 {
            let samples = duration_nanos(e.end - e.start) / step_ns;
            if max_points > samples || e.is_zero() {
                out.push(*e);
                continue;
            }
            push_chunks(&mut out, e, step, |i| i + chunk_span);
        }
        ExtentList(out)
    }

    // ==================== Copying ====================

    /// Copy the extents in `start..end`; `None` when the range is out of bounds
    pub fn clone_range(&self, start: usize, end: usize) -> Option<ExtentList> {
        if end < start {
            return None;
        }
        self.0.get(start..end).map(|s| ExtentList(s.to_vec()))
    }

    // ==================== Accounting ====================

    /// Number of samples at `step` across all bounded extents
    pub fn timestamp_count(&self, step: Duration) -> i64 {
        let step = duration_nanos(step);
        if step <= 0 {
            return 0;
        }
        self.0
            .iter()
            .filter(|e| !e.is_zero())
            .map(|e| duration_nanos(e.end - e.start) / step + 1)
            .sum()
    }

    /// Approximate memory footprint in bytes
    pub fn size(&self) -> usize {
        self.0.len() * EXTENT_SIZE_BYTES
    }
}

fn is_positive(d: Duration) -> bool {
    d > Duration::zero()
}

/// Emit consecutive chunks of `e`, where `chunk_end(i)` gives the nominal end
/// of the chunk starting at `i`. Chunks never invert and never pass `e.end`.
fn push_chunks(out: &mut Vec<Extent>, e: &Extent, step: Duration, chunk_end: impl Fn(Epoch) -> Epoch) {
    let mut i = e.start;
    while i <= e.end {
        let end = chunk_end(i).max(i).min(e.end);
        out.push(Extent {
            start: i,
            end,
            last_used: e.last_used,
        });
        let next = end + step;
        if next <= end {
            break;
        }
        i = next;
    }
}

impl Deref for ExtentList {
    type Target = [Extent];

    fn deref(&self) -> &[Extent] {
        &self.0
    }
}

impl From<Vec<Extent>> for ExtentList {
    fn from(extents: Vec<Extent>) -> Self {
        Self(extents)
    }
}

impl FromIterator<Extent> for ExtentList {
    fn from_iter<I: IntoIterator<Item = Extent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Extent> for ExtentList {
    fn extend<I: IntoIterator<Item = Extent>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ExtentList {
    type Item = Extent;
    type IntoIter = std::vec::IntoIter<Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ExtentList {
    type Item = &'a Extent;
    type IntoIter = std::slice::Iter<'a, Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ExtentList {
    /// `start1-end1,start2-end2,...` in Unix seconds
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl FromStr for ExtentList {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(ExtentList::new());
        }
        s.split(',').map(|part| part.parse::<Extent>()).collect()
    }
}
