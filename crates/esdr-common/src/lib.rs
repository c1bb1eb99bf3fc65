//! ESDR Common - Shared Types and Utilities
//!
//! Foundational types shared by every ESDR crate: the unified error type,
//! repository configuration, and type-safe identifiers.
//!
//! Key Features:
//! - Unified error taxonomy with field-level validation errors
//! - TOML configuration for tile geometry, credentials, and storage
//! - Identifier newtypes and the per-feed capability level
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;

pub use config::{EsdrConfig, SecurityConfig, StorageConfig, TileConfig};
pub use error::{EsdrError, Result};
pub use types::*;
