//! Series documents - the cached value behind each key
//!
//! A document pairs the coverage of a series with its sample points.
//! Coverage may extend over grid timestamps that have no point (the
//! upstream simply had no data there); points never live outside coverage
//! once `prune_uncovered` has run.
//!
//! # Encoding
//!
//! ```text
//! [crc32 of payload: u32 LE][payload: lz4(size-prepended, bincode(document))]
//! ```

use crate::cache::{CacheError, CacheResult};
use crate::timeseries::{Epoch, Extent, ExtentList, ExtentListLru};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CHECKSUM_LEN: usize = 4;

/// A single sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: Epoch,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: Epoch, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Cached coverage and samples for one series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDocument {
    /// Which ranges are cached, with recency
    pub extents: ExtentListLru,
    /// Samples keyed by timestamp in nanoseconds
    points: BTreeMap<i64, f64>,
}

impl SeriesDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize, compress and checksum for storage
    pub fn encode(&self) -> CacheResult<Vec<u8>> {
        let serialized = bincode::serialize(self)?;
        let compressed = lz4_flex::compress_prepend_size(&serialized);

        let mut out = Vec::with_capacity(CHECKSUM_LEN + compressed.len());
        out.extend_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Verify, decompress and deserialize bytes produced by `encode`
    pub fn decode(data: &[u8]) -> CacheResult<Self> {
        if data.len() < CHECKSUM_LEN {
            return Err(CacheError::Corruption(format!(
                "document too short: {} bytes",
                data.len()
            )));
        }
        let (header, payload) = data.split_at(CHECKSUM_LEN);
        let stored = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(CacheError::Corruption(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        let decompressed = lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| CacheError::Corruption(format!("LZ4 decompression failed: {}", e)))?;
        Ok(bincode::deserialize(&decompressed)?)
    }

    /// Insert or overwrite samples
    pub fn merge(&mut self, points: impl IntoIterator<Item = DataPoint>) {
        for p in points {
            self.points.insert(p.timestamp.nanos(), p.value);
        }
    }

    /// Add fetched ranges to the coverage without compressing it
    pub fn add_extents(&mut self, extents: impl IntoIterator<Item = Extent>) {
        let mut list = ExtentList::from(std::mem::take(&mut self.extents));
        list.extend(extents);
        self.extents = ExtentListLru::from(list);
    }

    /// Drop samples within `extent`, ahead of merging a refetch of it
    pub fn clear_points(&mut self, extent: &Extent) {
        if extent.end < extent.start {
            return;
        }
        let doomed: Vec<i64> = self
            .points
            .range(extent.start.nanos()..=extent.end.nanos())
            .map(|(ts, _)| *ts)
            .collect();
        for ts in doomed {
            self.points.remove(&ts);
        }
    }

    /// Samples within `extent`, ascending
    pub fn crop_points(&self, extent: &Extent) -> Vec<DataPoint> {
        if extent.end < extent.start {
            return Vec::new();
        }
        self.points
            .range(extent.start.nanos()..=extent.end.nanos())
            .map(|(ts, v)| DataPoint::new(Epoch::from_nanos(*ts), *v))
            .collect()
    }

    /// Drop samples no longer covered by any extent
    pub fn prune_uncovered(&mut self) {
        let coverage = self.extents.to_extent_list();
        self.points
            .retain(|ts, _| coverage.covers(Epoch::from_nanos(*ts)));
    }

    /// Every sample, ascending
    pub fn points(&self) -> Vec<DataPoint> {
        self.points
            .iter()
            .map(|(ts, v)| DataPoint::new(Epoch::from_nanos(*ts), *v))
            .collect()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> SeriesDocument {
        let mut doc = SeriesDocument::new();
        doc.add_extents([Extent::from_secs(100, 400)]);
        doc.merge((100..=400).step_by(60).map(|s| DataPoint::new(Epoch::from_secs(s), s as f64)));
        doc
    }

    #[test]
    fn test_encode_decode() {
        let doc = doc();
        let bytes = doc.encode().unwrap();
        let decoded = SeriesDocument::decode(&bytes).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.point_count(), 6);
    }

    #[test]
    fn test_decode_detects_corruption() {
        let mut bytes = doc().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            SeriesDocument::decode(&bytes),
            Err(CacheError::Corruption(_))
        ));
        assert!(matches!(
            SeriesDocument::decode(&[1, 2]),
            Err(CacheError::Corruption(_))
        ));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut doc = doc();
        doc.merge([DataPoint::new(Epoch::from_secs(160), -1.0)]);
        let points = doc.crop_points(&Extent::from_secs(160, 160));
        assert_eq!(points, vec![DataPoint::new(Epoch::from_secs(160), -1.0)]);
        assert_eq!(doc.point_count(), 6);
    }

    #[test]
    fn test_crop_points() {
        let doc = doc();
        let points = doc.crop_points(&Extent::from_secs(150, 300));
        let secs: Vec<i64> = points.iter().map(|p| p.timestamp.unix_secs()).collect();
        assert_eq!(secs, vec![160, 220, 280]);
        assert!(doc.crop_points(&Extent::from_secs(300, 150)).is_empty());
    }

    #[test]
    fn test_clear_points() {
        let mut doc = doc();
        doc.clear_points(&Extent::from_secs(150, 300));
        let secs: Vec<i64> = doc.points().iter().map(|p| p.timestamp.unix_secs()).collect();
        assert_eq!(secs, vec![100, 340, 400]);
    }

    #[test]
    fn test_prune_uncovered() {
        let mut doc = doc();
        doc.extents = ExtentListLru::from(vec![Extent::from_secs(100, 200)]);
        doc.prune_uncovered();
        let secs: Vec<i64> = doc.points().iter().map(|p| p.timestamp.unix_secs()).collect();
        assert_eq!(secs, vec![100, 160]);
    }
}
