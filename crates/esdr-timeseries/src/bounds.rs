//! ESDR Bounds Ledger
//!
//! Running minimum and maximum of time and value for every channel of every
//! feed, plus the feed-wide time envelope across its channels. Merging is
//! idempotent: merging the same sample twice leaves the bounds unchanged.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::SampleValue;
use esdr_common::FeedId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// =============================================================================
// Channel Bounds
// =============================================================================

/// Bounds of one channel. Value bounds stay unset for text-only channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelBounds {
    pub min_time_secs: f64,
    pub max_time_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

impl ChannelBounds {
    /// Bounds covering a single sample.
    pub fn from_sample(time: f64, value: &SampleValue) -> Self {
        let number = value.as_number();
        Self {
            min_time_secs: time,
            max_time_secs: time,
            min_value: number,
            max_value: number,
        }
    }

    pub fn merge_sample(&mut self, time: f64, value: &SampleValue) {
        self.merge(&Self::from_sample(time, value));
    }

    /// Widen these bounds to also cover `other`.
    pub fn merge(&mut self, other: &ChannelBounds) {
        self.min_time_secs = self.min_time_secs.min(other.min_time_secs);
        self.max_time_secs = self.max_time_secs.max(other.max_time_secs);
        self.min_value = min_opt(self.min_value, other.min_value);
        self.max_value = max_opt(self.max_value, other.max_value);
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

// =============================================================================
// Feed Bounds
// =============================================================================

/// Per-channel bounds of one feed and their time envelope.
///
/// Serializes as `{}` when no channel has data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedBounds {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, ChannelBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_secs: Option<f64>,
}

impl FeedBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelBounds> {
        self.channels.get(channel)
    }

    /// Merge one sample into a channel's bounds.
    pub fn merge_sample(&mut self, channel: &str, time: f64, value: &SampleValue) {
        self.merge_bounds(channel, &ChannelBounds::from_sample(time, value));
    }

    /// Merge existing bounds into a channel's bounds.
    pub fn merge_bounds(&mut self, channel: &str, bounds: &ChannelBounds) {
        match self.channels.get_mut(channel) {
            Some(existing) => existing.merge(bounds),
            None => {
                self.channels.insert(channel.to_string(), *bounds);
            }
        }
        self.min_time_secs = min_opt(self.min_time_secs, Some(bounds.min_time_secs));
        self.max_time_secs = max_opt(self.max_time_secs, Some(bounds.max_time_secs));
    }

    /// Merge every channel of `other`.
    pub fn merge(&mut self, other: &FeedBounds) {
        for (channel, bounds) in &other.channels {
            self.merge_bounds(channel, bounds);
        }
    }

    /// Only the named channels, with the envelope recomputed over them.
    pub fn restrict<'a, I>(&self, channels: I) -> FeedBounds
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut restricted = FeedBounds::new();
        for channel in channels {
            if let Some(bounds) = self.channels.get(channel) {
                restricted.merge_bounds(channel, bounds);
            }
        }
        restricted
    }
}

// =============================================================================
// Bounds Ledger
// =============================================================================

/// Persistent bounds of every feed, one lock per feed.
pub struct BoundsLedger {
    feeds: RwLock<HashMap<FeedId, Arc<RwLock<FeedBounds>>>>,
}

impl BoundsLedger {
    pub fn new() -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, feed_id: FeedId) -> Arc<RwLock<FeedBounds>> {
        if let Some(bounds) = self.feeds.read().get(&feed_id) {
            return bounds.clone();
        }
        let mut feeds = self.feeds.write();
        let bounds = feeds.entry(feed_id).or_default().clone();
        bounds
    }

    /// Merge one sample into a channel's bounds.
    pub fn merge(&self, feed_id: FeedId, channel: &str, time: f64, value: &SampleValue) {
        self.entry(feed_id).write().merge_sample(channel, time, value);
    }

    /// Merge a batch of bounds in one step and return the updated state of
    /// the channels it touched.
    pub fn merge_feed_bounds(&self, feed_id: FeedId, batch: &FeedBounds) -> FeedBounds {
        let entry = self.entry(feed_id);
        let mut bounds = entry.write();
        bounds.merge(batch);
        bounds.restrict(batch.channels.keys())
    }

    /// Cumulative bounds of a feed; empty when it has no data.
    pub fn channel_bounds(&self, feed_id: FeedId) -> FeedBounds {
        match self.feeds.read().get(&feed_id) {
            Some(bounds) => bounds.read().clone(),
            None => FeedBounds::new(),
        }
    }

    /// Cumulative bounds of one channel.
    pub fn get_channel(&self, feed_id: FeedId, channel: &str) -> Option<ChannelBounds> {
        let bounds = self.channel_bounds(feed_id);
        bounds.get(channel).copied()
    }
}

impl Default for BoundsLedger {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> SampleValue {
        SampleValue::Number(v)
    }

    #[test]
    fn test_numeric_merge_updates_all_fields() {
        let mut bounds = ChannelBounds::from_sample(5.0, &num(3.0));
        bounds.merge_sample(2.0, &num(8.0));
        bounds.merge_sample(9.0, &num(-1.0));
        assert_eq!(bounds.min_time_secs, 2.0);
        assert_eq!(bounds.max_time_secs, 9.0);
        assert_eq!(bounds.min_value, Some(-1.0));
        assert_eq!(bounds.max_value, Some(8.0));
    }

    #[test]
    fn test_text_merge_updates_time_only() {
        let mut bounds = ChannelBounds::from_sample(5.0, &num(3.0));
        bounds.merge_sample(100.0, &SampleValue::Text("note".to_string()));
        assert_eq!(bounds.max_time_secs, 100.0);
        assert_eq!(bounds.max_value, Some(3.0));

        let text_only = ChannelBounds::from_sample(1.0, &SampleValue::Text("x".to_string()));
        let json = serde_json::to_value(text_only).unwrap();
        assert_eq!(json, serde_json::json!({"minTimeSecs": 1.0, "maxTimeSecs": 1.0}));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut bounds = FeedBounds::new();
        bounds.merge_sample("a", 1.0, &num(1.0));
        let once = bounds.clone();
        bounds.merge_sample("a", 1.0, &num(1.0));
        assert_eq!(bounds, once);
    }

    #[test]
    fn test_envelope_spans_channels() {
        let mut bounds = FeedBounds::new();
        bounds.merge_sample("a", 10.0, &num(1.0));
        bounds.merge_sample("b", 3.0, &num(1.0));
        bounds.merge_sample("b", 40.0, &num(1.0));
        assert_eq!(bounds.min_time_secs, Some(3.0));
        assert_eq!(bounds.max_time_secs, Some(40.0));

        let only_a = bounds.restrict(["a".to_string()].iter());
        assert_eq!(only_a.min_time_secs, Some(10.0));
        assert_eq!(only_a.max_time_secs, Some(10.0));
        assert_eq!(only_a.channels.len(), 1);
    }

    #[test]
    fn test_empty_serializes_as_empty_object() {
        let json = serde_json::to_string(&FeedBounds::new()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_ledger_reports_history() {
        let ledger = BoundsLedger::new();
        let feed = FeedId(1);

        let mut first = FeedBounds::new();
        for t in [1.0, 2.0, 3.0] {
            first.merge_sample("temp", t, &num(t));
        }
        ledger.merge_feed_bounds(feed, &first);

        let mut second = FeedBounds::new();
        for t in [0.0, 5.0] {
            second.merge_sample("temp", t, &num(t));
        }
        let after = ledger.merge_feed_bounds(feed, &second);

        assert_eq!(second.get("temp").unwrap().min_time_secs, 0.0);
        assert_eq!(after.get("temp").unwrap().min_time_secs, 0.0);
        assert_eq!(after.get("temp").unwrap().max_time_secs, 5.0);

        ledger.merge(feed, "other", 7.0, &num(2.0));
        let all = ledger.channel_bounds(feed);
        assert_eq!(all.channels.len(), 2);
        assert_eq!(all.max_time_secs, Some(7.0));
        assert!(ledger.channel_bounds(FeedId(99)).is_empty());
        assert_eq!(ledger.get_channel(feed, "other").unwrap().max_value, Some(2.0));
    }
}
