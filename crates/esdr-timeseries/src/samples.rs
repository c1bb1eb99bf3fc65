//! ESDR Raw Sample Store
//!
//! Per-channel ordered storage of raw samples. Each (feed, channel) pair has
//! its own lock, so writers to different channels never contend; writers to
//! the same channel are serialised by that channel's lock.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{ChannelKey, Sample, SampleValue, Timestamp};
use esdr_common::FeedId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// Raw samples of one channel, keyed by time. One value per time.
pub type ChannelSamples = BTreeMap<Timestamp, SampleValue>;

/// Shared handle to one channel's samples.
pub type ChannelHandle = Arc<RwLock<ChannelSamples>>;

// =============================================================================
// Sample Store
// =============================================================================

/// In-memory raw sample store.
pub struct SampleStore {
    channels: RwLock<HashMap<ChannelKey, ChannelHandle>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for a channel, creating an empty one if needed.
    pub fn channel(&self, key: &ChannelKey) -> ChannelHandle {
        if let Some(handle) = self.channels.read().get(key) {
            return handle.clone();
        }
        let mut channels = self.channels.write();
        let handle = channels.entry(key.clone()).or_default().clone();
        handle
    }

    /// Handle for an existing channel.
    pub fn get(&self, key: &ChannelKey) -> Option<ChannelHandle> {
        self.channels.read().get(key).cloned()
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.channels.read().contains_key(key)
    }

    /// Channel names holding data for a feed, sorted.
    pub fn channels_for(&self, feed_id: FeedId) -> Vec<String> {
        let channels = self.channels.read();
        let mut names: Vec<String> = channels
            .keys()
            .filter(|k| k.feed_id == feed_id)
            .map(|k| k.channel.clone())
            .collect();
        names.sort();
        names
    }

    /// Samples with `from <= time <= to`, in time order. Missing bounds are
    /// open.
    pub fn range(&self, key: &ChannelKey, from: Option<f64>, to: Option<f64>) -> Vec<Sample> {
        let Some(handle) = self.get(key) else {
            return Vec::new();
        };
        let samples = handle.read();
        let selected: Vec<Sample> = scan(&samples, from, to)
            .map(|(time, value)| Sample::new(*time, value.clone()))
            .collect();
        selected
    }

    /// Number of samples stored for a channel.
    pub fn sample_count(&self, key: &ChannelKey) -> usize {
        match self.get(key) {
            Some(handle) => {
                let count = handle.read().len();
                count
            }
            None => 0,
        }
    }

    /// Total number of channels with storage.
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every channel out for persistence, ordered by key.
    pub fn dump(&self) -> Vec<ChannelDump> {
        let handles: Vec<(ChannelKey, ChannelHandle)> = {
            let channels = self.channels.read();
            channels.iter().map(|(k, h)| (k.clone(), h.clone())).collect()
        };

        let mut dumps: Vec<ChannelDump> = handles
            .into_iter()
            .map(|(key, handle)| {
                let samples: Vec<Sample> = handle
                    .read()
                    .iter()
                    .map(|(time, value)| Sample::new(*time, value.clone()))
                    .collect();
                ChannelDump { key, samples }
            })
            .collect();
        dumps.sort_by(|a, b| a.key.cmp(&b.key));
        dumps
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterate samples in `[from, to]` of an already-locked channel.
pub fn scan(
    samples: &ChannelSamples,
    from: Option<f64>,
    to: Option<f64>,
) -> impl Iterator<Item = (&Timestamp, &SampleValue)> {
    let lower = match from.and_then(Timestamp::new) {
        Some(t) => Bound::Included(t),
        None => Bound::Unbounded,
    };
    let upper = match to.and_then(Timestamp::new) {
        Some(t) => Bound::Included(t),
        None => Bound::Unbounded,
    };
    let valid = match (lower, upper) {
        (Bound::Included(a), Bound::Included(b)) => a <= b,
        _ => true,
    };
    let range = if valid {
        Some(samples.range((lower, upper)))
    } else {
        None
    };
    range.into_iter().flatten()
}

// =============================================================================
// Persistence Format
// =============================================================================

/// All samples of one channel, as written to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDump {
    pub key: ChannelKey,
    pub samples: Vec<Sample>,
}

// =============================================================================
// Tests
// =============================================================================
