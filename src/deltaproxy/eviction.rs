//! Per-series retention
//!
//! A cached series may hold at most `max_timestamps` samples at its step
//! (the backend's retention factor). When a merge pushes it over:
//!
//! - **oldest**: keep only the newest window of `max_timestamps` steps
//! - **lru**: drop whole extents, least recently read first, then fall back
//!   to **oldest** if the series is still too large

use crate::deltaproxy::document::SeriesDocument;
use crate::timeseries::{Extent, ExtentList, ExtentListLru};
use chrono::Duration;
use std::fmt;
use std::str::FromStr;

/// How a series sheds samples beyond its retention limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionMethod {
    #[default]
    Oldest,
    Lru,
}

impl FromStr for EvictionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oldest" => Ok(EvictionMethod::Oldest),
            "lru" => Ok(EvictionMethod::Lru),
            other => Err(format!("unknown eviction method '{}'", other)),
        }
    }
}

impl fmt::Display for EvictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionMethod::Oldest => write!(f, "oldest"),
            EvictionMethod::Lru => write!(f, "lru"),
        }
    }
}

/// Trim `doc` to at most `max_timestamps` samples at `step`.
///
/// Returns true if anything was evicted. A non-positive limit disables
/// retention.
pub fn enforce_retention(
    doc: &mut SeriesDocument,
    step: Duration,
    max_timestamps: i64,
    method: EvictionMethod,
) -> bool {
    if max_timestamps <= 0 || step <= Duration::zero() {
        return false;
    }
    let count = |doc: &SeriesDocument| doc.extents.to_extent_list().timestamp_count(step);
    if count(doc) <= max_timestamps {
        return false;
    }

    if method == EvictionMethod::Lru {
        while count(doc) > max_timestamps && evict_least_recent(doc, step) {}
    }
    if count(doc) > max_timestamps {
        evict_oldest(doc, step, max_timestamps);
    }

    doc.prune_uncovered();
    true
}

/// Remove the least recently used extent, unless it is as recent as the
/// newest one. Returns false when nothing could be removed.
fn evict_least_recent(doc: &mut SeriesDocument, step: Duration) -> bool {
    let newest = match doc.extents.iter().map(|e| e.last_used).max() {
        Some(newest) => newest,
        None => return false,
    };
    let victim = match doc.extents.least_recently_used() {
        Some(victim) if victim.last_used < newest => *victim,
        _ => return false,
    };

    tracing::debug!(victim = %victim, "evicting least recently used extent");
    let remaining = doc
        .extents
        .to_extent_list()
        .remove(&ExtentList::from(vec![victim]), step);
    doc.extents = ExtentListLru::from(remaining);
    true
}

/// Keep only the window of `max_timestamps` steps ending at the newest extent
fn evict_oldest(doc: &mut SeriesDocument, step: Duration, max_timestamps: i64) {
    let list = doc.extents.to_extent_list();
    let Some(latest) = list.iter().map(|e| e.end).max() else {
        return;
    };
    let span = Duration::nanoseconds(
        crate::timeseries::duration_nanos(step).saturating_mul(max_timestamps - 1),
    );
    let window = Extent::new(latest - span, latest);

    tracing::debug!(window = %window, "evicting oldest samples");
    doc.extents = ExtentListLru::from(list.crop(&window));
}
