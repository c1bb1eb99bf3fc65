//! ESDR Time Series Types
//!
//! Core data types for raw samples: totally ordered timestamps, numeric or
//! text sample values, and the (feed, channel) key every store is indexed by.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use esdr_common::FeedId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// Timestamp
// =============================================================================

/// Sample time in seconds since the epoch, totally ordered.
///
/// Always finite; `-0.0` is normalised to `0.0` so equal instants share a key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Wrap a finite time. Returns `None` for NaN or infinities.
    pub fn new(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        Some(Self(if secs == 0.0 { 0.0 } else { secs }))
    }

    pub fn secs(self) -> f64 {
        self.0
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Sample Value
// =============================================================================

/// A stored observation: numeric for measurement channels, text for
/// annotation-style channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

// =============================================================================
// Channel Key
// =============================================================================

/// Identifies one channel of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub feed_id: FeedId,
    pub channel: String,
}

impl ChannelKey {
    pub fn new(feed_id: FeedId, channel: impl Into<String>) -> Self {
        Self {
            feed_id,
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feed_{}.{}", self.feed_id, self.channel)
    }
}

// =============================================================================
// Sample
// =============================================================================

/// A single timestamped observation for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: Timestamp,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(time: Timestamp, value: SampleValue) -> Self {
        Self { time, value }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_rejects_non_finite() {
        assert!(Timestamp::new(f64::NAN).is_none());
        assert!(Timestamp::new(f64::INFINITY).is_none());
        assert_eq!(Timestamp::new(12.5).map(Timestamp::secs), Some(12.5));
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::new(-1.0).unwrap();
        let b = Timestamp::new(-0.0).unwrap();
        let c = Timestamp::new(0.0).unwrap();
        let d = Timestamp::new(3.25).unwrap();
        assert!(a < b);
        assert_eq!(b, c);
        assert!(c < d);
    }

    #[test]
    fn test_sample_value_untagged() {
        let n: SampleValue = serde_json::from_str("4.5").unwrap();
        assert_eq!(n, SampleValue::Number(4.5));
        let t: SampleValue = serde_json::from_str("\"door opened\"").unwrap();
        assert!(t.is_text());
        assert_eq!(t.as_number(), None);
    }

    #[test]
    fn test_channel_key_display() {
        let key = ChannelKey::new(FeedId(9), "temperature");
        assert_eq!(key.to_string(), "feed_9.temperature");
    }
}
