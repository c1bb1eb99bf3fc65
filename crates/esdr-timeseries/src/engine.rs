//! ESDR Datastore
//!
//! Coordinates the raw sample store, tile store, bounds ledger, ingest
//! pipeline, and export engine behind one handle.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::bounds::{BoundsLedger, FeedBounds};
use crate::export::{CsvExport, ExportEngine, TimeRange};
use crate::ingest::{IngestPipeline, UploadRequest, UploadResult};
use crate::samples::{ChannelDump, SampleStore};
use crate::tiles::{Tile, TileAddress, TileGeometry, TileStore};
use crate::types::ChannelKey;
use esdr_common::{FeedId, Result, TileConfig, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Datastore
// =============================================================================

/// Time series storage for every feed.
pub struct Datastore {
    samples: Arc<SampleStore>,
    tiles: Arc<TileStore>,
    bounds: Arc<BoundsLedger>,
    ingest: IngestPipeline,
    export: ExportEngine,
}

impl Datastore {
    pub fn new(config: &TileConfig) -> Self {
        let samples = Arc::new(SampleStore::new());
        let tiles = Arc::new(TileStore::new(TileGeometry::new(config)));
        let bounds = Arc::new(BoundsLedger::new());
        Self {
            ingest: IngestPipeline::new(samples.clone(), tiles.clone(), bounds.clone()),
            export: ExportEngine::new(samples.clone()),
            samples,
            tiles,
            bounds,
        }
    }

    pub fn geometry(&self) -> &TileGeometry {
        self.tiles.geometry()
    }

    // -------------------------------------------------------------------------
    // Write Path
    // -------------------------------------------------------------------------

    /// Validate and apply an upload.
    pub fn upload(&self, feed_id: FeedId, request: &UploadRequest) -> Result<UploadResult> {
        self.ingest.upload(feed_id, request)
    }

    // -------------------------------------------------------------------------
    // Read Path
    // -------------------------------------------------------------------------

    pub fn tile(&self, feed_id: FeedId, channel: &str, address: TileAddress) -> Result<Tile> {
        self.tiles.get_tile(&ChannelKey::new(feed_id, channel), address)
    }

    /// Tile of a channel, all-empty when the channel has no data.
    pub fn tile_or_empty(&self, feed_id: FeedId, channel: &str, address: TileAddress) -> Tile {
        self.tiles
            .tile_or_empty(&ChannelKey::new(feed_id, channel), address)
    }

    pub fn channel_bounds(&self, feed_id: FeedId) -> FeedBounds {
        self.bounds.channel_bounds(feed_id)
    }

    pub fn export<S: AsRef<str>>(
        &self,
        feed_id: FeedId,
        owner: UserId,
        channels: &[S],
        range: TimeRange,
    ) -> Result<CsvExport> {
        self.export.export(feed_id, owner, channels, range)
    }

    /// Channels of a feed that hold samples.
    pub fn channels_for(&self, feed_id: FeedId) -> Vec<String> {
        self.samples.channels_for(feed_id)
    }

    pub fn stats(&self) -> DatastoreStats {
        DatastoreStats {
            channels: self.samples.len(),
            tiled_channels: self.tiles.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Copy out every channel's raw samples.
    pub fn dump(&self) -> Vec<ChannelDump> {
        self.samples.dump()
    }

    /// Replay persisted samples, rebuilding tiles and bounds.
    pub fn restore(&self, dumps: &[ChannelDump]) {
        for dump in dumps {
            self.ingest.replay(dump);
        }
        tracing::info!(channels = dumps.len(), "datastore restored");
    }
}

/// Datastore counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreStats {
    pub channels: usize,
    pub tiled_channels: usize,
}

// =============================================================================
// Tests
// =============================================================================
