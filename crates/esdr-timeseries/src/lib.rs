//! ESDR Time Series - Feed Data Storage
//!
//! Storage for the samples uploaded to feeds and the summaries derived from
//! them: the raw sample store, the multi-resolution tile store, the bounds
//! ledger, the ingest pipeline that keeps them consistent, and the CSV export
//! engine.
//!
//! Key Features:
//! - Fixed-shape tiles at every level, updated incrementally on ingest
//! - Exact pooled-variance aggregation across levels
//! - Cumulative and per-upload bounds
//! - All-or-nothing batch validation
//! - Union-of-times CSV export
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod aggregation;
pub mod bounds;
pub mod engine;
pub mod export;
pub mod ingest;
pub mod samples;
pub mod tiles;
pub mod types;

pub use aggregation::{BinStats, StatsAccumulator};
pub use bounds::{BoundsLedger, ChannelBounds, FeedBounds};
pub use engine::{Datastore, DatastoreStats};
pub use export::{dedupe_channels, CsvExport, ExportEngine, ExportRow, TimeRange};
pub use ingest::{IngestPipeline, UploadRequest, UploadResult, ValidatedUpload};
pub use samples::{ChannelDump, SampleStore};
pub use tiles::{
    Tile, TileAddress, TileGeometry, TilePoint, TileStore, NO_DATA_SENTINEL, TILE_FIELDS,
};
pub use types::{ChannelKey, Sample, SampleValue, Timestamp};
