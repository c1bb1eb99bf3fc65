//! ESDR Feed Types
//!
//! Records held by the feed directory: products with their default channel
//! specs, and feeds with their owner, visibility, credentials, and the bounds
//! derived from uploaded data.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use esdr_common::{Capability, DeviceId, EsdrError, FeedId, ProductId, Result, UserId};
use esdr_timeseries::FeedBounds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Channel Specs
// =============================================================================

/// Display metadata for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl ChannelSpec {
    pub fn new(pretty_name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            pretty_name: Some(pretty_name.into()),
            units: Some(units.into()),
        }
    }
}

/// Channel specs keyed by channel name.
pub type ChannelSpecs = BTreeMap<String, ChannelSpec>;

// =============================================================================
// Exposure
// =============================================================================

/// Where a feed's sensor is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Exposure {
    Indoor,
    #[default]
    Outdoor,
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exposure::Indoor => write!(f, "indoor"),
            Exposure::Outdoor => write!(f, "outdoor"),
        }
    }
}

impl FromStr for Exposure {
    type Err = EsdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "indoor" => Ok(Exposure::Indoor),
            "outdoor" => Ok(Exposure::Outdoor),
            other => Err(EsdrError::validation(
                "exposure",
                format!("'{}' is not one of indoor, outdoor", other),
            )),
        }
    }
}

// =============================================================================
// Products
// =============================================================================

/// A kind of device, shared by all feeds created for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub pretty_name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub description: String,
    pub creator_user_id: UserId,
    pub is_public: bool,
    #[serde(default)]
    pub default_channel_specs: ChannelSpecs,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Fields supplied when creating a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub pretty_name: Option<String>,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub default_channel_specs: ChannelSpecs,
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_public: true,
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>, spec: ChannelSpec) -> Self {
        self.default_channel_specs.insert(channel.into(), spec);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("name", &self.name)?;
        for channel in self.default_channel_specs.keys() {
            validate_name("defaultChannelSpecs", channel)?;
        }
        Ok(())
    }
}

/// Names are non-empty and limited to letters, digits, `_`, `-` and `.`.
pub(crate) fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EsdrError::validation(field, "must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(EsdrError::validation(
            field,
            format!("'{}' may only contain letters, digits, '_', '-' and '.'", name),
        ));
    }
    Ok(())
}

// =============================================================================
// Feeds
// =============================================================================

/// A feed and everything the directory knows about it.
///
/// Key fields are blank in views returned to callers without write access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: FeedId,
    pub name: String,
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub exposure: Exposure,
    pub is_public: bool,
    pub is_mobile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub channel_specs: ChannelSpecs,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key_read_only: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_upload: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_time_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_secs: Option<f64>,
    #[serde(default)]
    pub channel_bounds: FeedBounds,
}

impl Feed {
    /// Whether the feed declares a channel, either through its specs or by
    /// holding data for it.
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channel_specs.contains_key(channel)
            || self.channel_bounds.channels.contains_key(channel)
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Copy of this feed as shown to a caller holding `capability`.
    pub fn view(&self, capability: Capability) -> Feed {
        let mut view = self.clone();
        if !capability.can_write() {
            view.api_key.clear();
            view.api_key_read_only.clear();
        }
        view
    }

    /// Fold an upload's channel bounds into the derived views. The views
    /// only ever widen.
    pub fn apply_bounds(&mut self, bounds: &FeedBounds, uploaded_at: DateTime<Utc>) {
        self.channel_bounds.merge(bounds);
        self.min_time_secs = self.channel_bounds.min_time_secs;
        self.max_time_secs = self.channel_bounds.max_time_secs;
        self.last_upload = self.last_upload.max(Some(uploaded_at));
        self.modified = self.modified.max(uploaded_at);
    }
}

/// Fields supplied when creating a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeed {
    pub name: String,
    pub device_id: DeviceId,
    pub product_id: ProductId,
    #[serde(default)]
    pub exposure: Exposure,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_mobile: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Defaults to the product's channel specs when omitted.
    #[serde(default)]
    pub channel_specs: Option<ChannelSpecs>,
}

impl NewFeed {
    pub fn new(name: impl Into<String>, device_id: DeviceId, product_id: ProductId) -> Self {
        Self {
            name: name.into(),
            device_id,
            product_id,
            ..Default::default()
        }
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EsdrError::validation("name", "must not be empty"));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(EsdrError::validation("latitude", "must be within [-90, 90]"));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(EsdrError::validation("longitude", "must be within [-180, 180]"));
            }
        }
        if let Some(specs) = &self.channel_specs {
            for channel in specs.keys() {
                validate_name("channelSpecs", channel)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_round_trip() {
        assert_eq!("Indoor".parse::<Exposure>().unwrap(), Exposure::Indoor);
        assert_eq!(Exposure::Outdoor.to_string(), "outdoor");
        assert_eq!("garage".parse::<Exposure>().unwrap_err().field(), Some("exposure"));
        assert_eq!(serde_json::to_string(&Exposure::Indoor).unwrap(), "\"indoor\"");
    }

    #[test]
    fn test_new_feed_validation() {
        let ok = NewFeed::new("Backyard", DeviceId(1), ProductId(1)).with_location(40.4, -79.9);
        assert!(ok.validate().is_ok());

        let bad = NewFeed::new("Backyard", DeviceId(1), ProductId(1)).with_location(91.0, 0.0);
        assert_eq!(bad.validate().unwrap_err().field(), Some("latitude"));

        let unnamed = NewFeed::new(" ", DeviceId(1), ProductId(1));
        assert_eq!(unnamed.validate().unwrap_err().field(), Some("name"));
    }

    #[test]
    fn test_new_feed_defaults() {
        let blank = NewFeed::default();
        assert_eq!(blank.device_id, DeviceId(0));
        assert_eq!(blank.product_id, ProductId(0));

        let feed = NewFeed::new("porch", DeviceId(4), ProductId(2));
        assert_eq!(feed.exposure, Exposure::Outdoor);
        assert!(!feed.is_public);
        assert!(feed.channel_specs.is_none());

        let parsed: NewFeed =
            serde_json::from_str(r#"{"name": "porch", "deviceId": 4, "productId": 2}"#).unwrap();
        assert_eq!(parsed, feed);
    }

    #[test]
    fn test_new_product_defaults_public() {
        let product: NewProduct = serde_json::from_str(r#"{"name": "speck"}"#).unwrap();
        assert!(product.is_public);
        assert!(product.validate().is_ok());
        assert!(NewProduct::new("bad name").validate().is_err());
    }
}
