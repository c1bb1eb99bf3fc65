//! ESDR Feed Selectors
//!
//! Predicate trees used to pick feeds out of the directory. Selectors are
//! written in the feed query grammar:
//!
//! ```text
//! where=productId=8,isPublic=true&whereOr=deviceId=1,deviceId=2&whereJoin=OR
//! ```
//!
//! `where` and `whereAnd` clauses require every equality to hold, `whereOr`
//! clauses require any of them, and `whereJoin` (default `AND`) combines the
//! clauses. An empty selector matches every feed.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Exposure, Feed};
use esdr_common::{EsdrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Fields and Values
// =============================================================================

/// Feed attribute a selector can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorField {
    Id,
    Name,
    DeviceId,
    ProductId,
    UserId,
    Exposure,
    IsPublic,
    IsMobile,
    Latitude,
    Longitude,
    ChannelName,
}

impl SelectorField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "name" => Self::Name,
            "deviceId" => Self::DeviceId,
            "productId" => Self::ProductId,
            "userId" => Self::UserId,
            "exposure" => Self::Exposure,
            "isPublic" => Self::IsPublic,
            "isMobile" => Self::IsMobile,
            "latitude" => Self::Latitude,
            "longitude" => Self::Longitude,
            "channelName" => Self::ChannelName,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::DeviceId => "deviceId",
            Self::ProductId => "productId",
            Self::UserId => "userId",
            Self::Exposure => "exposure",
            Self::IsPublic => "isPublic",
            Self::IsMobile => "isMobile",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::ChannelName => "channelName",
        }
    }
}

/// Typed comparison value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectorValue {
    Int(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Exposure(Exposure),
}

impl fmt::Display for SelectorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Exposure(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Selector
// =============================================================================

/// Predicate over feeds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Selector {
    #[default]
    All,
    Eq {
        field: SelectorField,
        value: SelectorValue,
    },
    And(Vec<Selector>),
    Or(Vec<Selector>),
}

impl Selector {
    /// Check if a feed matches this selector.
    pub fn matches(&self, feed: &Feed) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => field_matches(feed, *field, value),
            Self::And(selectors) => selectors.iter().all(|s| s.matches(feed)),
            Self::Or(selectors) => selectors.iter().any(|s| s.matches(feed)),
        }
    }

    /// Parse the textual selector grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim().trim_start_matches('?');
        let mut clauses = Vec::new();
        let mut join_or = false;

        for part in input.split('&').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("clause '{}' has no value", part)))?;
            match key.trim() {
                "where" | "whereAnd" => clauses.push(Self::And(parse_equalities(value)?)),
                "whereOr" => clauses.push(Self::Or(parse_equalities(value)?)),
                "whereJoin" => {
                    join_or = match value.trim().to_ascii_uppercase().as_str() {
                        "AND" => false,
                        "OR" => true,
                        other => {
                            return Err(invalid(format!(
                                "whereJoin '{}' must be AND or OR",
                                other
                            )))
                        }
                    }
                }
                other => return Err(invalid(format!("unknown clause '{}'", other))),
            }
        }

        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.remove(0),
            _ if join_or => Self::Or(clauses),
            _ => Self::And(clauses),
        })
    }

    /// Equality on one field.
    pub fn field_eq(field: SelectorField, value: SelectorValue) -> Self {
        Self::Eq { field, value }
    }
}

fn invalid(message: String) -> EsdrError {
    EsdrError::validation("selector", message)
}

fn parse_equalities(list: &str) -> Result<Vec<Selector>> {
    let mut equalities = Vec::new();
    for pair in list.split(',').filter(|p| !p.trim().is_empty()) {
        let (name, raw) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("'{}' is not a field=value pair", pair)))?;
        let field = SelectorField::parse(name.trim())
            .ok_or_else(|| invalid(format!("unknown field '{}'", name.trim())))?;
        equalities.push(Selector::field_eq(field, parse_value(field, raw.trim())?));
    }
    if equalities.is_empty() {
        return Err(invalid("clause has no conditions".to_string()));
    }
    Ok(equalities)
}

fn parse_value(field: SelectorField, raw: &str) -> Result<SelectorValue> {
    let bad = || invalid(format!("'{}' is not a valid value for {}", raw, field.as_str()));
    match field {
        SelectorField::Id
        | SelectorField::DeviceId
        | SelectorField::ProductId
        | SelectorField::UserId => raw.parse().map(SelectorValue::Int).map_err(|_| bad()),
        SelectorField::Latitude | SelectorField::Longitude => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(SelectorValue::Float)
            .ok_or_else(bad),
        SelectorField::IsPublic | SelectorField::IsMobile => match raw {
            "true" | "1" => Ok(SelectorValue::Bool(true)),
            "false" | "0" => Ok(SelectorValue::Bool(false)),
            _ => Err(bad()),
        },
        SelectorField::Exposure => raw
            .parse::<Exposure>()
            .map(SelectorValue::Exposure)
            .map_err(|_| bad()),
        SelectorField::Name | SelectorField::ChannelName => {
            Ok(SelectorValue::Text(raw.to_string()))
        }
    }
}

fn field_matches(feed: &Feed, field: SelectorField, value: &SelectorValue) -> bool {
    match (field, value) {
        (SelectorField::Id, SelectorValue::Int(v)) => feed.id.0 == *v,
        (SelectorField::DeviceId, SelectorValue::Int(v)) => feed.device_id.0 == *v,
        (SelectorField::ProductId, SelectorValue::Int(v)) => feed.product_id.0 == *v,
        (SelectorField::UserId, SelectorValue::Int(v)) => feed.user_id.0 == *v,
        (SelectorField::Name, SelectorValue::Text(v)) => feed.name == *v,
        (SelectorField::Exposure, SelectorValue::Exposure(v)) => feed.exposure == *v,
        (SelectorField::IsPublic, SelectorValue::Bool(v)) => feed.is_public == *v,
        (SelectorField::IsMobile, SelectorValue::Bool(v)) => feed.is_mobile == *v,
        (SelectorField::Latitude, SelectorValue::Float(v)) => feed.latitude == Some(*v),
        (SelectorField::Longitude, SelectorValue::Float(v)) => feed.longitude == Some(*v),
        (SelectorField::ChannelName, SelectorValue::Text(v)) => feed.has_channel(v),
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
