//! ESDR Ingest Pipeline
//!
//! Validates uploaded batches and applies them to the raw sample store, the
//! tile store, and the bounds ledger. A batch is checked in full before any
//! of it is applied, so a bad row leaves every store untouched.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::bounds::{BoundsLedger, FeedBounds};
use crate::samples::{ChannelDump, SampleStore};
use crate::tiles::{TileGeometry, TileStore};
use crate::types::{ChannelKey, Sample, SampleValue, Timestamp};
use esdr_common::{EsdrError, FeedId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

// =============================================================================
// Upload Request
// =============================================================================

/// Uploaded batch: column names, then rows of `[time, v1, v2, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub channel_names: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl UploadRequest {
    pub fn new(channel_names: Vec<String>, data: Vec<Vec<Value>>) -> Self {
        Self { channel_names, data }
    }

    /// Check every name and cell, returning the samples per channel. Times
    /// must land in a bin `geometry` can index.
    pub fn validate(&self, geometry: &TileGeometry) -> Result<ValidatedUpload> {
        let mut seen = HashSet::new();
        for (i, name) in self.channel_names.iter().enumerate() {
            validate_channel_name(name).map_err(|message| {
                EsdrError::validation(format!("channel_names[{}]", i), message)
            })?;
            if !seen.insert(name.as_str()) {
                return Err(EsdrError::validation(
                    format!("channel_names[{}]", i),
                    format!("duplicate channel '{}'", name),
                ));
            }
        }

        let width = self.channel_names.len() + 1;
        let mut columns: Vec<Vec<Sample>> = vec![Vec::new(); self.channel_names.len()];
        let mut rows = 0;

        for (r, row) in self.data.iter().enumerate() {
            if row.len() != width {
                return Err(EsdrError::validation(
                    format!("data[{}]", r),
                    format!("expected {} values, found {}", width, row.len()),
                ));
            }

            let time = row[0]
                .as_f64()
                .and_then(Timestamp::new)
                .ok_or_else(|| {
                    EsdrError::validation(
                        format!("data[{}][0]", r),
                        "time must be a finite number",
                    )
                })?;
            if !geometry.contains_time(time.secs()) {
                return Err(EsdrError::validation(
                    format!("data[{}][0]", r),
                    "time is outside the supported range",
                ));
            }

            for (c, cell) in row.iter().enumerate().skip(1) {
                let value = match cell {
                    Value::Null => continue,
                    Value::Number(n) => match n.as_f64().filter(|v| v.is_finite()) {
                        Some(v) => SampleValue::Number(v),
                        None => {
                            return Err(EsdrError::validation(
                                format!("data[{}][{}]", r, c),
                                "value must be a finite number",
                            ))
                        }
                    },
                    Value::String(s) => SampleValue::Text(s.clone()),
                    _ => {
                        return Err(EsdrError::validation(
                            format!("data[{}][{}]", r, c),
                            "value must be a number, a string, or null",
                        ))
                    }
                };
                columns[c - 1].push(Sample::new(time, value));
            }
            rows += 1;
        }

        Ok(ValidatedUpload {
            columns: self
                .channel_names
                .iter()
                .cloned()
                .zip(columns)
                .filter(|(_, samples)| !samples.is_empty())
                .collect(),
            rows,
        })
    }
}

fn validate_channel_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("channel name must not be empty".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(format!(
            "channel name '{}' may only contain letters, digits, '_', '-' and '.'",
            name
        ));
    }
    Ok(())
}

/// A batch that passed validation, grouped by channel in request order.
/// Channels whose every cell was null are left out.
#[derive(Debug, Clone, Default)]
pub struct ValidatedUpload {
    pub columns: Vec<(String, Vec<Sample>)>,
    pub rows: usize,
}

impl ValidatedUpload {
    pub fn sample_count(&self) -> usize {
        self.columns.iter().map(|(_, samples)| samples.len()).sum()
    }
}

/// Bounds returned from an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Cumulative bounds of the channels this upload touched.
    pub channel_bounds: FeedBounds,
    /// Bounds of this upload's data alone.
    pub imported_bounds: FeedBounds,
}

// =============================================================================
// Ingest Pipeline
// =============================================================================

/// Write path shared by uploads and snapshot replay.
pub struct IngestPipeline {
    samples: Arc<SampleStore>,
    tiles: Arc<TileStore>,
    bounds: Arc<BoundsLedger>,
}

impl IngestPipeline {
    pub fn new(
        samples: Arc<SampleStore>,
        tiles: Arc<TileStore>,
        bounds: Arc<BoundsLedger>,
    ) -> Self {
        Self {
            samples,
            tiles,
            bounds,
        }
    }

    /// Validate and apply an upload to a feed.
    pub fn upload(&self, feed_id: FeedId, request: &UploadRequest) -> Result<UploadResult> {
        let batch = request.validate(self.tiles.geometry())?;
        let result = self.apply(feed_id, &batch);
        tracing::debug!(
            feed = %feed_id,
            rows = batch.rows,
            samples = batch.sample_count(),
            "upload applied"
        );
        Ok(result)
    }

    /// Apply a validated batch.
    pub fn apply(&self, feed_id: FeedId, batch: &ValidatedUpload) -> UploadResult {
        let mut imported = FeedBounds::new();
        for (channel, samples) in &batch.columns {
            let key = ChannelKey::new(feed_id, channel.as_str());
            self.write_channel(&key, samples);
            for sample in samples {
                imported.merge_sample(channel, sample.time.secs(), &sample.value);
            }
        }

        if imported.is_empty() {
            return UploadResult::default();
        }

        let channel_bounds = self.bounds.merge_feed_bounds(feed_id, &imported);
        UploadResult {
            channel_bounds,
            imported_bounds: imported,
        }
    }

    /// Rebuild tiles and bounds of one channel from persisted samples.
    pub fn replay(&self, dump: &ChannelDump) {
        if dump.samples.is_empty() {
            return;
        }
        self.write_channel(&dump.key, &dump.samples);
        for sample in &dump.samples {
            self.bounds.merge(
                dump.key.feed_id,
                &dump.key.channel,
                sample.time.secs(),
                &sample.value,
            );
        }
    }

    /// Store samples and refresh the pyramid while the channel stays locked,
    /// so concurrent writers to one channel cannot interleave propagation.
    fn write_channel(&self, key: &ChannelKey, samples: &[Sample]) {
        let handle = self.samples.channel(key);
        let mut stored = handle.write();
        for sample in samples {
            stored.insert(sample.time, sample.value.clone());
        }
        self.tiles
            .insert_batch(key, samples.iter().map(|s| s.time), &stored);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::BinStats;
    use crate::tiles::TileAddress;
    use esdr_common::TileConfig;
    use serde_json::json;

    type Stores = (IngestPipeline, Arc<SampleStore>, Arc<TileStore>, Arc<BoundsLedger>);

    fn pipeline() -> Stores {
        pipeline_with(TileGeometry::default())
    }

    fn pipeline_with(geometry: TileGeometry) -> Stores {
        let samples = Arc::new(SampleStore::new());
        let tiles = Arc::new(TileStore::new(geometry));
        let bounds = Arc::new(BoundsLedger::new());
        let ingest = IngestPipeline::new(samples.clone(), tiles.clone(), bounds.clone());
        (ingest, samples, tiles, bounds)
    }

    fn request(value: serde_json::Value) -> UploadRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_imported_vs_cumulative_bounds() {
        let (ingest, _, _, _) = pipeline();
        let feed = FeedId(1);

        let first = json!({"channel_names": ["temp"], "data": [[1, 10], [2, 11], [3, 12]]});
        ingest.upload(feed, &request(first)).unwrap();
        let second = json!({"channel_names": ["temp"], "data": [[0, 5], [5, 20]]});
        let result = ingest.upload(feed, &request(second)).unwrap();

        let imported = result.imported_bounds.get("temp").unwrap();
        assert_eq!(imported.min_time_secs, 0.0);
        assert_eq!(imported.max_time_secs, 5.0);
        assert_eq!(imported.min_value, Some(5.0));

        let cumulative = result.channel_bounds.get("temp").unwrap();
        assert_eq!(cumulative.min_time_secs, 0.0);
        assert_eq!(cumulative.max_time_secs, 5.0);
        assert_eq!(cumulative.max_value, Some(20.0));
    }

    #[test]
    fn test_channel_bounds_limited_to_touched_channels() {
        let (ingest, _, _, _) = pipeline();
        let feed = FeedId(1);
        ingest
            .upload(feed, &request(json!({"channel_names": ["a"], "data": [[100, 1]]})))
            .unwrap();
        let result = ingest
            .upload(feed, &request(json!({"channel_names": ["b"], "data": [[1, 1]]})))
            .unwrap();
        assert!(result.channel_bounds.get("a").is_none());
        assert_eq!(result.channel_bounds.max_time_secs, Some(1.0));
    }

    #[test]
    fn test_null_cells_skip_only_their_channel() {
        let (ingest, samples, _, _) = pipeline();
        let feed = FeedId(2);
        let result = ingest
            .upload(
                feed,
                &request(json!({
                    "channel_names": ["a", "b"],
                    "data": [[1, 1.5, null], [2, null, "door open"], [3, null, null]]
                })),
            )
            .unwrap();

        assert_eq!(samples.sample_count(&ChannelKey::new(feed, "a")), 1);
        assert_eq!(samples.sample_count(&ChannelKey::new(feed, "b")), 1);
        let b = result.imported_bounds.get("b").unwrap();
        assert_eq!(b.min_time_secs, 2.0);
        assert_eq!(b.min_value, None);
        assert_eq!(result.imported_bounds.max_time_secs, Some(2.0));
    }

    #[test]
    fn test_empty_payload_yields_empty_bounds() {
        let (ingest, _, tiles, _) = pipeline();
        let result = ingest.upload(FeedId(1), &UploadRequest::default()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({"channelBounds": {}, "importedBounds": {}}));

        let result = ingest
            .upload(FeedId(1), &request(json!({"channel_names": ["a"], "data": [[1, null]]})))
            .unwrap();
        assert!(result.imported_bounds.is_empty());
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_bad_row_rejects_whole_batch() {
        let (ingest, samples, tiles, bounds) = pipeline();
        let err = ingest
            .upload(
                FeedId(1),
                &request(json!({"channel_names": ["a"], "data": [[1, 1], [2, 2], [3, true]]})),
            )
            .unwrap_err();
        assert_eq!(err.field(), Some("data[2][1]"));
        assert!(samples.is_empty());
        assert!(tiles.is_empty());
        assert!(bounds.channel_bounds(FeedId(1)).is_empty());
    }

    #[test]
    fn test_validation_names_offending_cell() {
        let cases = [
            (json!({"channel_names": ["a"], "data": [[1]]}), "data[0]"),
            (json!({"channel_names": ["a"], "data": [["x", 1]]}), "data[0][0]"),
            (json!({"channel_names": ["a", ""], "data": []}), "channel_names[1]"),
            (json!({"channel_names": ["a", "a"], "data": []}), "channel_names[1]"),
            (json!({"channel_names": ["a b"], "data": []}), "channel_names[0]"),
            (json!({"channel_names": ["a"], "data": [[1, 1], [2, {"v": 1}]]}), "data[1][1]"),
        ];
        for (body, field) in cases {
            let err = request(body).validate(&TileGeometry::default()).unwrap_err();
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn test_upload_reaches_tiles() {
        let (ingest, _, tiles, _) = pipeline();
        let feed = FeedId(3);
        ingest
            .upload(feed, &request(json!({"channel_names": ["t"], "data": [[0.5, 4], [0.7, 6]]})))
            .unwrap();
        let tile = tiles
            .get_tile(&ChannelKey::new(feed, "t"), TileAddress { level: 0, offset: 0 })
            .unwrap();
        assert_eq!(tile.points[0].count(), 2);
        assert_eq!(tile.points[0].stats.unwrap().mean, 5.0);
    }

    #[test]
    fn test_replay_restores_bounds_and_tiles() {
        let (ingest, samples, _, _) = pipeline();
        let feed = FeedId(4);
        ingest
            .upload(feed, &request(json!({"channel_names": ["t"], "data": [[1, 4], [9, 6]]})))
            .unwrap();

        let (fresh, _, fresh_tiles, fresh_bounds) = pipeline();
        for dump in samples.dump() {
            fresh.replay(&dump);
        }
        assert_eq!(fresh_bounds.channel_bounds(feed).max_time_secs, Some(9.0));
        let tile = fresh_tiles
            .get_tile(&ChannelKey::new(feed, "t"), TileAddress { level: 4, offset: 0 })
            .unwrap();
        assert_eq!(tile.points[0].count(), 2);
    }

    #[test]
    fn test_out_of_range_time_rejected_before_apply() {
        let (ingest, samples, tiles, bounds) = pipeline();
        for time in [-1e300, 1e300] {
            let body = json!({"channel_names": ["a"], "data": [[1, 1], [time, 1.0]]});
            let err = ingest.upload(FeedId(1), &request(body)).unwrap_err();
            assert_eq!(err.field(), Some("data[1][0]"));
        }
        assert!(samples.is_empty());
        assert!(tiles.is_empty());
        assert!(bounds.channel_bounds(FeedId(1)).is_empty());
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * (1.0 + a.abs().max(b.abs()))
    }

    fn assert_same(level: u32, index: i64, got: Option<&BinStats>, want: Option<BinStats>) {
        match (got, want) {
            (Some(a), Some(b)) => {
                assert_eq!(a.count, b.count, "level {} bin {}", level, index);
                assert!(close(a.mean, b.mean), "level {} bin {}", level, index);
                assert!(close(a.m2, b.m2), "level {} bin {}", level, index);
            }
            (None, None) => {}
            other => panic!("level {} bin {} mismatch: {:?}", level, index, other),
        }
    }

    #[test]
    fn test_concurrent_uploads_keep_pyramid_consistent() {
        let max_level = 6;
        let geo = TileGeometry::new(&TileConfig {
            points_per_tile: 4,
            base_bin_secs: 1.0,
            max_level,
        });
        let (ingest, samples, tiles, bounds) = pipeline_with(geo);
        let feed = FeedId(9);
        let writers = 8;
        let rows = 64;

        std::thread::scope(|scope| {
            for k in 0..writers {
                let ingest = &ingest;
                scope.spawn(move || {
                    for i in 0..rows {
                        let t = i as f64 + k as f64 * 0.1;
                        let v = (i * 7 + k * 3) as f64;
                        let shared = json!({"channel_names": ["shared"], "data": [[t, v]]});
                        ingest.upload(feed, &request(shared)).unwrap();
                        let own = format!("own{}", k);
                        let solo = json!({"channel_names": [own], "data": [[t, v]]});
                        ingest.upload(feed, &request(solo)).unwrap();
                    }
                });
            }
        });

        let key = ChannelKey::new(feed, "shared");
        assert_eq!(samples.sample_count(&key), writers * rows);
        for k in 0..writers {
            let own = ChannelKey::new(feed, format!("own{}", k));
            assert_eq!(samples.sample_count(&own), rows);
        }
        assert_eq!(bounds.channel_bounds(feed).channels.len(), writers + 1);

        let raw = samples.range(&key, None, None);
        let tiles_per_level = |level: u32| {
            let last = raw.last().map(|s| s.time.secs()).unwrap_or(0.0);
            geo.tile_offset(level, last) + 1
        };
        for level in 0..=max_level {
            let mut total = 0;
            for offset in 0..tiles_per_level(level) {
                let tile = tiles.get_tile(&key, TileAddress { level, offset }).unwrap();
                for (i, point) in tile.points.iter().enumerate() {
                    let index = offset * geo.points_per_tile() as i64 + i as i64;
                    let direct = BinStats::from_values(
                        raw.iter()
                            .filter(|s| geo.bin_index(level, s.time.secs()) == index)
                            .filter_map(|s| s.value.as_number()),
                    );
                    assert_same(level, index, point.stats.as_ref(), direct);
                    total += point.count();
                }
            }
            assert_eq!(total as usize, writers * rows, "level {}", level);
        }
    }

    #[test]
    fn test_parent_bins_combine_children_after_parallel_writes() {
        let geo = TileGeometry::new(&TileConfig {
            points_per_tile: 8,
            base_bin_secs: 0.5,
            max_level: 4,
        });
        let (ingest, _, tiles, _) = pipeline_with(geo);
        let feed = FeedId(10);

        std::thread::scope(|scope| {
            for k in 0..4 {
                let ingest = &ingest;
                scope.spawn(move || {
                    let data: Vec<_> = (0..32)
                        .map(|i| json!([i as f64 * 0.25 + k as f64 * 0.05, (i % 5 + k) as f64]))
                        .collect();
                    let body = json!({"channel_names": ["t"], "data": data});
                    ingest.upload(feed, &request(body)).unwrap();
                });
            }
        });

        let key = ChannelKey::new(feed, "t");
        for level in 1..=4u32 {
            let parents = tiles.get_tile(&key, TileAddress { level, offset: 0 }).unwrap();
            let children = tiles
                .get_tile(&key, TileAddress { level: level - 1, offset: 0 })
                .unwrap();
            let next = tiles
                .get_tile(&key, TileAddress { level: level - 1, offset: 1 })
                .unwrap();
            let below: Vec<Option<BinStats>> = children
                .points
                .iter()
                .chain(next.points.iter())
                .map(|p| p.stats)
                .collect();
            for (i, parent) in parents.points.iter().enumerate() {
                let combined = BinStats::combine(below[2 * i..2 * i + 2].iter().flatten());
                assert_same(level, i as i64, parent.stats.as_ref(), combined);
            }
        }
    }
}
