//! ESDR Types - Core Identifiers
//!
//! Type-safe identifiers for the records the repository manages, plus the
//! capability level a request holds against a feed.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifier Types
// =============================================================================

/// Unique identifier for feeds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FeedId(pub u64);

/// Unique identifier for users.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Unique identifier for products.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProductId(pub u64);

/// Unique identifier for devices.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

/// Unique identifier for OAuth2 clients.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

/// Unique identifier for multifeeds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MultifeedId(pub u64);

macro_rules! display_as_inner {
    ($($id:ty),*) => {
        $(
            impl fmt::Display for $id {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_as_inner!(FeedId, UserId, ProductId, DeviceId, ClientId, MultifeedId);

// =============================================================================
// Capability
// =============================================================================

/// Access level a request holds against a single feed.
///
/// Ordered so that `ReadWrite > Read > None`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    None,
    Read,
    ReadWrite,
}

impl Capability {
    /// Whether this capability satisfies the required level.
    pub fn allows(self, required: Capability) -> bool {
        self >= required
    }

    pub fn can_read(self) -> bool {
        self.allows(Capability::Read)
    }

    pub fn can_write(self) -> bool {
        self == Capability::ReadWrite
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_ordering() {
        assert!(Capability::ReadWrite.allows(Capability::Read));
        assert!(Capability::Read.allows(Capability::Read));
        assert!(!Capability::Read.allows(Capability::ReadWrite));
        assert!(!Capability::None.can_read());
        assert!(Capability::ReadWrite.can_write());
    }

    #[test]
    fn test_identifier_serialization() {
        let json = serde_json::to_string(&FeedId(42)).unwrap();
        assert_eq!(json, "42");
        let id: UserId = serde_json::from_str("7").unwrap();
        assert_eq!(id, UserId(7));
        assert_eq!(MultifeedId(3).to_string(), "3");
    }

    #[test]
    fn test_capability_serialization() {
        let json = serde_json::to_string(&Capability::ReadWrite).unwrap();
        assert_eq!(json, "\"READ_WRITE\"");
    }
}
