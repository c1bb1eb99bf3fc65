//! ESDR Multifeed - Virtual Feeds
//!
//! Named, saved views that aggregate channels across many feeds. A multifeed
//! is resolved against the feed directory on every read, so it always
//! reflects the feeds currently matching its selectors.
//!
//! Key Features:
//! - Globally unique names, generated when omitted
//! - Lookup by id or by name
//! - Ordered, deduplicated (feed, channel) resolution
//! - Merged tiles grouped by channel and contributing feed
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod composition;
pub mod store;
pub mod types;

pub use composition::{FeedSeries, MultifeedComposer, MultifeedTile, Resolution, ResolvedChannel};
pub use store::MultifeedStore;
pub use types::{compile_spec, CompiledClause, Multifeed, MultifeedClause, NewMultifeed};
