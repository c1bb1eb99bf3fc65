//! ESDR Multifeed Types
//!
//! A multifeed is a saved view over the feed directory: an ordered list of
//! clauses, each pairing a feed selector with the channels to take from every
//! feed it matches.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use chrono::{DateTime, Utc};
use esdr_common::{EsdrError, MultifeedId, Result, UserId};
use esdr_feeds::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// =============================================================================
// Clauses
// =============================================================================

/// One clause of a multifeed spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultifeedClause {
    /// Feed selector in the feed query grammar.
    pub feeds: String,
    /// Channels to take from every matched feed.
    pub channels: Vec<String>,
}

impl MultifeedClause {
    pub fn new<S: Into<String>>(
        feeds: impl Into<String>,
        channels: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            feeds: feeds.into(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }
}

/// A clause whose selector has been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClause {
    pub selector: Selector,
    pub channels: Vec<String>,
}

/// Validate a spec and parse its selectors.
pub fn compile_spec(spec: &[MultifeedClause]) -> Result<Vec<CompiledClause>> {
    if spec.is_empty() {
        return Err(EsdrError::validation("spec", "must contain at least one clause"));
    }

    spec.iter()
        .enumerate()
        .map(|(i, clause)| {
            let selector = Selector::parse(&clause.feeds).map_err(|e| {
                EsdrError::validation(format!("spec[{}].feeds", i), e.to_string())
            })?;

            let field = format!("spec[{}].channels", i);
            if clause.channels.is_empty() {
                return Err(EsdrError::validation(field, "must name at least one channel"));
            }
            let mut seen = HashSet::new();
            for channel in &clause.channels {
                if channel.trim().is_empty() {
                    return Err(EsdrError::validation(field, "channel names must not be empty"));
                }
                if !seen.insert(channel.as_str()) {
                    return Err(EsdrError::validation(
                        field,
                        format!("duplicate channel '{}'", channel),
                    ));
                }
            }

            Ok(CompiledClause {
                selector,
                channels: clause.channels.clone(),
            })
        })
        .collect()
}

// =============================================================================
// Multifeeds
// =============================================================================

/// A stored multifeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Multifeed {
    pub id: MultifeedId,
    pub user_id: UserId,
    pub name: String,
    pub spec: Vec<MultifeedClause>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Multifeed {
    pub fn compile(&self) -> Result<Vec<CompiledClause>> {
        compile_spec(&self.spec)
    }
}

/// Fields supplied when creating a multifeed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMultifeed {
    /// Generated when omitted.
    #[serde(default)]
    pub name: Option<String>,
    pub spec: Vec<MultifeedClause>,
}

impl NewMultifeed {
    pub fn new(spec: Vec<MultifeedClause>) -> Self {
        Self { name: None, spec }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Check an explicit multifeed name. Purely numeric names are refused so a
/// name can never be mistaken for an id.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(EsdrError::validation("name", "must not be empty"));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(EsdrError::validation("name", "must not be purely numeric"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(EsdrError::validation(
            "name",
            "may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_valid_spec() {
        let spec = vec![
            MultifeedClause::new("whereOr=productId=8,productId=9", ["pm25", "humidity"]),
            MultifeedClause::new("where=userId=3", ["temp"]),
        ];
        let compiled = compile_spec(&spec).unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].channels, vec!["pm25", "humidity"]);
    }

    #[test]
    fn test_spec_errors_name_clause() {
        assert_eq!(compile_spec(&[]).unwrap_err().field(), Some("spec"));

        let empty_channels = [MultifeedClause::new("where=id=1", Vec::<String>::new())];
        assert_eq!(
            compile_spec(&empty_channels).unwrap_err().field(),
            Some("spec[0].channels")
        );

        let spec = [
            MultifeedClause::new("where=id=1", ["a"]),
            MultifeedClause::new("where=id=2", ["a", "a"]),
        ];
        assert_eq!(compile_spec(&spec).unwrap_err().field(), Some("spec[1].channels"));

        let bad_selector = [MultifeedClause::new("where=shape=round", ["a"])];
        assert_eq!(
            compile_spec(&bad_selector).unwrap_err().field(),
            Some("spec[0].feeds")
        );
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("air-quality.pgh").is_ok());
        assert!(validate_name("1234").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("with space").is_err());
    }

    #[test]
    fn test_new_multifeed_json() {
        let new: NewMultifeed = serde_json::from_str(
            r#"{"spec": [{"feeds": "where=id=1", "channels": ["a"]}]}"#,
        )
        .unwrap();
        assert!(new.name.is_none());
        assert_eq!(new.spec[0].channels, vec!["a"]);
    }
}
