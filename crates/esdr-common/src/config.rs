//! ESDR Config - Configuration Structures
//!
//! Configuration for tile geometry, credential lifetimes, and snapshot
//! storage. Loaded from TOML files; every field has a default so a partial
//! file (or none at all) is valid.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{EsdrError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Tile Configuration
// =============================================================================

/// Shape of the multi-resolution tile pyramid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Number of points in every tile, at every level.
    pub points_per_tile: usize,
    /// Width in seconds of one level-0 point. Each level doubles it.
    pub base_bin_secs: f64,
    /// Highest level maintained by upward propagation.
    pub max_level: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            points_per_tile: 512,
            base_bin_secs: 1.0,
            max_level: 32,
        }
    }
}

impl TileConfig {
    /// Reject geometries that cannot produce a well-formed grid.
    pub fn validate(&self) -> Result<()> {
        if self.points_per_tile == 0 {
            return Err(EsdrError::Configuration(
                "tiles.points_per_tile must be at least 1".to_string(),
            ));
        }
        if !self.base_bin_secs.is_finite() || self.base_bin_secs <= 0.0 {
            return Err(EsdrError::Configuration(
                "tiles.base_bin_secs must be a positive number".to_string(),
            ));
        }
        if self.max_level > 60 {
            return Err(EsdrError::Configuration(
                "tiles.max_level must not exceed 60".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Security Configuration
// =============================================================================

/// Credential handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Lifetime of an OAuth2 access token, in seconds.
    pub token_life_secs: u64,
    /// Random bytes behind each generated feed API key.
    pub api_key_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_life_secs: 7 * 24 * 60 * 60, // 7 days
            api_key_bytes: 32,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Snapshot persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for JSON snapshots. In-memory only when unset.
    pub data_dir: Option<PathBuf>,
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Top-level repository configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EsdrConfig {
    pub tiles: TileConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

impl EsdrConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EsdrError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration with development defaults.
    pub fn development() -> Self {
        Self::default()
    }

    /// Set the snapshot directory.
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if data_dir.is_some() {
            self.storage.data_dir = data_dir;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.tiles.validate()?;
        if self.security.api_key_bytes < 16 {
            return Err(EsdrError::Configuration(
                "security.api_key_bytes must be at least 16".to_string(),
            ));
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
    fn test_defaults() {
        let config = EsdrConfig::development();
        assert_eq!(config.tiles.points_per_tile, 512);
        assert_eq!(config.tiles.base_bin_secs, 1.0);
        assert!(config.storage.data_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EsdrConfig::from_toml(
            r#"
            [tiles]
            points_per_tile = 2
            base_bin_secs = 8.0

            [storage]
            data_dir = "/var/lib/esdr"
            "#,
        )
        .unwrap();
        assert_eq!(config.tiles.points_per_tile, 2);
        assert_eq!(config.tiles.max_level, 32);
        assert_eq!(config.security.token_life_secs, 604_800);
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/var/lib/esdr")));
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let err = EsdrConfig::from_toml("[tiles]\npoints_per_tile = 0\n").unwrap_err();
        assert!(matches!(err, EsdrError::Configuration(_)));

        let err = EsdrConfig::from_toml("[tiles]\nbase_bin_secs = -1.0\n").unwrap_err();
        assert!(matches!(err, EsdrError::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esdr.toml");
        std::fs::write(&path, "[security]\ntoken_life_secs = 60\n").unwrap();
        let config = EsdrConfig::from_file(&path).unwrap();
        assert_eq!(config.security.token_life_secs, 60);
    }
}
