//! ESDR Feeds - Feed Directory and Access Policy
//!
//! Products, feeds, and the rules deciding who may read or write them.
//!
//! Key Features:
//! - Feed creation with product-default channel specs
//! - Unique read-write and read-only API keys per feed
//! - Selector grammar for feed queries
//! - Capability decisions for user tokens, feed keys, and anonymous callers
//! - Access-token table with expiry
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod auth;
pub mod directory;
pub mod selector;
pub mod types;

pub use auth::{
    AccessPolicy, AccessToken, Authorized, Credential, KeyKind, Principal, RequestMode,
    TokenTable, Visibility,
};
pub use directory::{DirectorySnapshot, FeedDirectory};
pub use selector::{Selector, SelectorField, SelectorValue};
pub use types::{ChannelSpec, ChannelSpecs, Exposure, Feed, NewFeed, NewProduct, Product};
