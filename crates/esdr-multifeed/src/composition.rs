//! ESDR Multifeed Composition
//!
//! Resolves a multifeed against the feed directory and merges the tiles of
//! everything it resolves to. Resolution runs the same directory query an
//! ordinary feed search would, so a multifeed is a saved view rather than a
//! separate data path.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::Multifeed;
use esdr_common::{FeedId, Result};
use esdr_feeds::{Feed, FeedDirectory, Visibility};
use esdr_timeseries::{Datastore, TileAddress, TILE_FIELDS};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

// =============================================================================
// Resolution
// =============================================================================

/// One (feed, channel) pair a multifeed resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChannel {
    pub feed_id: FeedId,
    pub channel: String,
}

/// Resolution result: the pairs in clause order plus every feed the clause
/// selectors matched.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub pairs: Vec<ResolvedChannel>,
    pub feeds: Vec<Feed>,
}

// =============================================================================
// Multifeed Tiles
// =============================================================================

/// Tile rows of one contributing feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSeries {
    pub data: Vec<(f64, f64, f64, u64)>,
}

/// Tiles of every resolved pair at one address, grouped by channel name and
/// then by contributing feed.
#[derive(Debug, Clone, PartialEq)]
pub struct MultifeedTile {
    pub level: u32,
    pub offset: i64,
    pub channels: BTreeMap<String, BTreeMap<FeedId, FeedSeries>>,
}

impl MultifeedTile {
    pub fn series(&self, channel: &str, feed_id: FeedId) -> Option<&FeedSeries> {
        self.channels.get(channel)?.get(&feed_id)
    }

    /// Number of (feed, channel) series in the tile.
    pub fn series_count(&self) -> usize {
        self.channels.values().map(BTreeMap::len).sum()
    }
}

#[derive(Serialize)]
struct MultifeedTilePayload<'a> {
    channels: &'a BTreeMap<String, BTreeMap<FeedId, FeedSeries>>,
    fields: [&'static str; 4],
    level: u32,
    offset: i64,
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Serialize for MultifeedTile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        MultifeedTilePayload {
            channels: &self.channels,
            fields: TILE_FIELDS,
            level: self.level,
            offset: self.offset,
            kind: "value",
        }
        .serialize(serializer)
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Read path for multifeeds.
pub struct MultifeedComposer {
    directory: Arc<FeedDirectory>,
    datastore: Arc<Datastore>,
}

impl MultifeedComposer {
    pub fn new(directory: Arc<FeedDirectory>, datastore: Arc<Datastore>) -> Self {
        Self {
            directory,
            datastore,
        }
    }

    /// Resolve every clause in order. A (feed, channel) pair is emitted once,
    /// by the first clause that produces it; only channels a feed declares
    /// are emitted. Matched feeds are kept whether or not they declare any
    /// requested channel.
    pub fn resolve(&self, multifeed: &Multifeed, visibility: &Visibility) -> Result<Resolution> {
        let clauses = multifeed.compile()?;
        let mut seen_pairs = HashSet::new();
        let mut seen_feeds = HashSet::new();
        let mut resolution = Resolution::default();

        for clause in &clauses {
            for feed in self.directory.query(&clause.selector, visibility) {
                for channel in &clause.channels {
                    if !feed.has_channel(channel) {
                        continue;
                    }
                    let pair = ResolvedChannel {
                        feed_id: feed.id,
                        channel: channel.clone(),
                    };
                    if seen_pairs.insert(pair.clone()) {
                        resolution.pairs.push(pair);
                    }
                }
                if seen_feeds.insert(feed.id) {
                    resolution.feeds.push(feed);
                }
            }
        }

        tracing::debug!(
            multifeed = %multifeed.id,
            pairs = resolution.pairs.len(),
            feeds = resolution.feeds.len(),
            "multifeed resolved"
        );
        Ok(resolution)
    }

    /// The ordered, deduplicated pairs a multifeed resolves to.
    pub fn resolve_pairs(
        &self,
        multifeed: &Multifeed,
        visibility: &Visibility,
    ) -> Result<Vec<ResolvedChannel>> {
        Ok(self.resolve(multifeed, visibility)?.pairs)
    }

    /// The distinct feeds matched by a multifeed's clauses, in clause order.
    pub fn feeds(&self, multifeed: &Multifeed, visibility: &Visibility) -> Result<Vec<Feed>> {
        Ok(self.resolve(multifeed, visibility)?.feeds)
    }

    /// Merge the tiles of every resolved pair at one address. Pairs without
    /// data still contribute an all-empty series.
    pub fn tile(
        &self,
        multifeed: &Multifeed,
        address: TileAddress,
        visibility: &Visibility,
    ) -> Result<MultifeedTile> {
        let pairs = self.resolve_pairs(multifeed, visibility)?;
        let mut channels: BTreeMap<String, BTreeMap<FeedId, FeedSeries>> = BTreeMap::new();
        for pair in pairs {
            let tile = self
                .datastore
                .tile_or_empty(pair.feed_id, &pair.channel, address);
            channels
                .entry(pair.channel)
                .or_default()
                .insert(pair.feed_id, FeedSeries { data: tile.data() });
        }
        Ok(MultifeedTile {
            level: address.level,
            offset: address.offset,
            channels,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
