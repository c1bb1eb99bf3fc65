//! ESDR Tile Store
//!
//! Multi-resolution summaries of every numeric channel. Level 0 bins are
//! `base_bin_secs` wide and are summarised straight from the raw samples; each
//! level above combines pairs of bins from the level below, so a bin at level
//! `L` is `base_bin_secs * 2^L` wide. A tile is `points_per_tile` consecutive
//! bins of one level, which gives every tile at a level the same shape and the
//! same time grid no matter how sparse the data is.
//!
//! Key Features:
//! - Incremental updates: an insert touches one bin per level
//! - Pooled-variance combination, exact at every level
//! - Per-channel pyramids behind their own lock
//! - Empty bins reported with a fixed sentinel mean on the wire
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::aggregation::BinStats;
use crate::samples::{scan, ChannelSamples};
use crate::types::{ChannelKey, Timestamp};
use esdr_common::{EsdrError, Result, TileConfig};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Mean reported for a point whose bin holds no samples.
pub const NO_DATA_SENTINEL: f64 = -1e308;

/// Column names of a tile's `data` rows.
pub const TILE_FIELDS: [&str; 4] = ["time", "mean", "stddev", "count"];

/// Children combined into one parent bin.
const FAN_OUT: i64 = 2;

/// Largest level-0 bin index, in either direction, a sample may fall in.
const MAX_BIN_INDEX: i64 = 1 << 53;

// =============================================================================
// Tile Geometry
// =============================================================================

/// Fixed grid shared by every pyramid in a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGeometry {
    points_per_tile: usize,
    base_bin_secs: f64,
    max_level: u32,
}

impl TileGeometry {
    pub fn new(config: &TileConfig) -> Self {
        Self {
            points_per_tile: config.points_per_tile,
            base_bin_secs: config.base_bin_secs,
            max_level: config.max_level,
        }
    }

    pub fn points_per_tile(&self) -> usize {
        self.points_per_tile
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Width in seconds of one bin at `level`.
    pub fn bin_width(&self, level: u32) -> f64 {
        self.base_bin_secs * 2f64.powi(level as i32)
    }

    /// Seconds covered by one tile at `level`.
    pub fn tile_duration(&self, level: u32) -> f64 {
        self.bin_width(level) * self.points_per_tile as f64
    }

    /// Index of the bin containing `time` at `level`.
    pub fn bin_index(&self, level: u32, time: f64) -> i64 {
        (time / self.bin_width(level)).floor() as i64
    }

    /// Whether `time` falls in a level-0 bin the pyramid can index exactly.
    pub fn contains_time(&self, time: f64) -> bool {
        (time / self.bin_width(0)).floor().abs() <= MAX_BIN_INDEX as f64
    }

    /// Offset of the tile containing `time` at `level`.
    pub fn tile_offset(&self, level: u32, time: f64) -> i64 {
        self.bin_index(level, time)
            .div_euclid(self.points_per_tile as i64)
    }

    /// Reported time of a bin: the centre of its interval.
    pub fn bin_time(&self, level: u32, index: i64) -> f64 {
        (index as f64 + 0.5) * self.bin_width(level)
    }

    /// Check a numeric tile address.
    pub fn address(&self, level: i64, offset: i64) -> Result<TileAddress> {
        if level < 0 {
            return Err(EsdrError::validation("level", "must be a non-negative integer"));
        }
        if level > self.max_level as i64 {
            return Err(EsdrError::validation(
                "level",
                format!("must not exceed {}", self.max_level),
            ));
        }
        if offset < 0 {
            return Err(EsdrError::validation("offset", "must be a non-negative integer"));
        }
        let per_tile = self.points_per_tile as i64;
        let last_bin = offset
            .checked_mul(per_tile)
            .and_then(|first| first.checked_add(per_tile - 1));
        if last_bin.is_none() {
            return Err(EsdrError::validation("offset", "is out of range"));
        }
        Ok(TileAddress {
            level: level as u32,
            offset,
        })
    }

    /// Parse a tile address from request path segments.
    pub fn parse_address(&self, level: &str, offset: &str) -> Result<TileAddress> {
        let level: i64 = level
            .trim()
            .parse()
            .map_err(|_| EsdrError::validation("level", "must be a non-negative integer"))?;
        let offset: i64 = offset
            .trim()
            .parse()
            .map_err(|_| EsdrError::validation("offset", "must be a non-negative integer"))?;
        self.address(level, offset)
    }
}

impl Default for TileGeometry {
    fn default() -> Self {
        Self::new(&TileConfig::default())
    }
}

/// A validated (level, offset) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub level: u32,
    pub offset: i64,
}

// =============================================================================
// Tiles
// =============================================================================

/// One point of a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub time: f64,
    /// `None` when the bin holds no samples.
    pub stats: Option<BinStats>,
}

impl TilePoint {
    /// `[time, mean, stddev, count]` as sent on the wire.
    pub fn row(&self) -> (f64, f64, f64, u64) {
        match &self.stats {
            Some(stats) => (self.time, stats.mean, stats.stddev(), stats.count),
            None => (self.time, NO_DATA_SENTINEL, 0.0, 0),
        }
    }

    pub fn count(&self) -> u64 {
        self.stats.map(|s| s.count).unwrap_or(0)
    }
}

/// Fixed-length run of points at one level.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub level: u32,
    pub offset: i64,
    pub points: Vec<TilePoint>,
}

impl Tile {
    /// Wire rows of this tile.
    pub fn data(&self) -> Vec<(f64, f64, f64, u64)> {
        self.points.iter().map(TilePoint::row).collect()
    }

    /// True when no point holds data.
    pub fn is_empty(&self) -> bool {
        self.points.iter().all(|p| p.stats.is_none())
    }
}

#[derive(Serialize)]
struct TilePayload {
    data: Vec<(f64, f64, f64, u64)>,
    fields: [&'static str; 4],
    level: u32,
    offset: i64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TilePayload {
            data: self.data(),
            fields: TILE_FIELDS,
            level: self.level,
            offset: self.offset,
            kind: "value",
        }
        .serialize(serializer)
    }
}

// =============================================================================
// Channel Pyramid
// =============================================================================

/// All retained levels of one channel. Absent bins are empty.
#[derive(Debug, Clone)]
pub struct ChannelPyramid {
    levels: Vec<HashMap<i64, BinStats>>,
}

impl ChannelPyramid {
    fn new(geometry: &TileGeometry) -> Self {
        Self {
            levels: vec![HashMap::new(); geometry.max_level as usize + 1],
        }
    }

    /// Summary of one bin.
    pub fn bin(&self, level: u32, index: i64) -> Option<&BinStats> {
        self.levels.get(level as usize)?.get(&index)
    }

    fn set(&mut self, level: usize, index: i64, stats: Option<BinStats>) {
        match stats {
            Some(stats) => {
                self.levels[level].insert(index, stats);
            }
            None => {
                self.levels[level].remove(&index);
            }
        }
    }

    /// Recompute the given level-0 bins from raw samples, then every
    /// ancestor up to the top level.
    fn rebuild(&mut self, geometry: &TileGeometry, bins: BTreeSet<i64>, samples: &ChannelSamples) {
        let width = geometry.bin_width(0);
        for &bin in &bins {
            // widened scan, exact membership decided by bin_index
            let from = bin.saturating_sub(1) as f64 * width;
            let to = bin.saturating_add(2) as f64 * width;
            let stats = BinStats::from_values(
                scan(samples, Some(from), Some(to))
                    .filter(|(time, _)| geometry.bin_index(0, time.secs()) == bin)
                    .filter_map(|(_, value)| value.as_number()),
            );
            self.set(0, bin, stats);
        }

        let mut dirty = bins;
        for level in 1..self.levels.len() {
            let parents: BTreeSet<i64> = dirty.iter().map(|i| i.div_euclid(FAN_OUT)).collect();
            for &parent in &parents {
                let below = &self.levels[level - 1];
                let stats = BinStats::combine(
                    (0..FAN_OUT).filter_map(|k| below.get(&(parent * FAN_OUT + k))),
                );
                self.set(level, parent, stats);
            }
            dirty = parents;
        }
    }

    fn tile(&self, geometry: &TileGeometry, address: TileAddress) -> Tile {
        build_tile(geometry, address, |index| self.bin(address.level, index).copied())
    }
}

/// Lay out one tile, looking each bin up with `lookup`.
fn build_tile<F>(geometry: &TileGeometry, address: TileAddress, lookup: F) -> Tile
where
    F: Fn(i64) -> Option<BinStats>,
{
    let per_tile = geometry.points_per_tile as i64;
    let first = address.offset * per_tile;
    let points = (0..per_tile)
        .map(|i| {
            let index = first + i;
            TilePoint {
                time: geometry.bin_time(address.level, index),
                stats: lookup(index),
            }
        })
        .collect();
    Tile {
        level: address.level,
        offset: address.offset,
        points,
    }
}

// =============================================================================
// Tile Store
// =============================================================================

/// Pyramids of every channel, each behind its own lock.
pub struct TileStore {
    geometry: TileGeometry,
    channels: RwLock<HashMap<ChannelKey, Arc<RwLock<ChannelPyramid>>>>,
}

impl TileStore {
    pub fn new(geometry: TileGeometry) -> Self {
        Self {
            geometry,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    fn pyramid(&self, key: &ChannelKey) -> Arc<RwLock<ChannelPyramid>> {
        if let Some(pyramid) = self.channels.read().get(key) {
            return pyramid.clone();
        }
        let mut channels = self.channels.write();
        let pyramid = channels
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(ChannelPyramid::new(&self.geometry))))
            .clone();
        pyramid
    }

    /// Refresh the bins containing `time`. `samples` must already hold the
    /// new value and stay locked by the caller until this returns.
    pub fn insert(&self, key: &ChannelKey, time: Timestamp, samples: &ChannelSamples) {
        self.insert_batch(key, std::iter::once(time), samples);
    }

    /// Refresh the bins containing every time in `times`. The whole update is
    /// applied under the channel's pyramid lock, so readers see either none
    /// or all of it.
    pub fn insert_batch<I>(&self, key: &ChannelKey, times: I, samples: &ChannelSamples)
    where
        I: IntoIterator<Item = Timestamp>,
    {
        let bins: BTreeSet<i64> = times
            .into_iter()
            .map(|t| self.geometry.bin_index(0, t.secs()))
            .collect();
        if bins.is_empty() {
            return;
        }
        let pyramid = self.pyramid(key);
        let bin_count = bins.len();
        pyramid.write().rebuild(&self.geometry, bins, samples);
        tracing::trace!(channel = %key, bins = bin_count, "tiles updated");
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.channels.read().contains_key(key)
    }

    /// Tile of a channel that has a pyramid.
    pub fn get_tile(&self, key: &ChannelKey, address: TileAddress) -> Result<Tile> {
        let pyramid = self
            .channels
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("no tiles for channel {}", key)))?;
        let guard = pyramid.read();
        let tile = guard.tile(&self.geometry, address);
        Ok(tile)
    }

    /// Tile of any channel; channels without data yield an all-empty tile.
    pub fn tile_or_empty(&self, key: &ChannelKey, address: TileAddress) -> Tile {
        match self.get_tile(key, address) {
            Ok(tile) => tile,
            Err(_) => self.empty_tile(address),
        }
    }

    /// All-sentinel tile at an address.
    pub fn empty_tile(&self, address: TileAddress) -> Tile {
        build_tile(&self.geometry, address, |_| None)
    }

    /// Number of channels with a pyramid.
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
