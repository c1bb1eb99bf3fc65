//! ESDR Server State
//!
//! Application state shared by every endpoint: the feed directory, token
//! table, access policy, datastore, and multifeed registry. When a data
//! directory is configured the state is loaded from and saved to JSON files
//! there.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use esdr_common::{EsdrConfig, EsdrError, Result};
use esdr_feeds::{AccessPolicy, DirectorySnapshot, FeedDirectory, TokenTable};
use esdr_multifeed::{Multifeed, MultifeedComposer, MultifeedStore};
use esdr_timeseries::{ChannelDump, Datastore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DIRECTORY_FILE: &str = "directory.json";
const MULTIFEEDS_FILE: &str = "multifeeds.json";
const SAMPLES_FILE: &str = "samples.json";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EsdrConfig>,
    pub directory: Arc<FeedDirectory>,
    pub tokens: Arc<TokenTable>,
    pub policy: Arc<AccessPolicy>,
    pub datastore: Arc<Datastore>,
    pub multifeeds: Arc<MultifeedStore>,
    pub composer: Arc<MultifeedComposer>,
    data_dir: Option<PathBuf>,
}

impl AppState {
    /// Create application state, loading any snapshot in the configured
    /// data directory.
    pub fn new(config: EsdrConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.storage.data_dir.clone();

        if let Some(ref dir) = data_dir {
            std::fs::create_dir_all(dir)?;
        }

        let directory = Arc::new(FeedDirectory::new(&config.security));
        let tokens = Arc::new(TokenTable::new(&config.security));
        let policy = Arc::new(AccessPolicy::new(directory.clone(), tokens.clone()));
        let datastore = Arc::new(Datastore::new(&config.tiles));
        let multifeeds = Arc::new(MultifeedStore::new());
        let composer = Arc::new(MultifeedComposer::new(directory.clone(), datastore.clone()));

        let state = Self {
            config: Arc::new(config),
            directory,
            tokens,
            policy,
            datastore,
            multifeeds,
            composer,
            data_dir,
        };
        state.load_from_disk()?;
        Ok(state)
    }

    /// In-memory state with development defaults.
    pub fn in_memory() -> Result<Self> {
        Self::new(EsdrConfig::development())
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn load_from_disk(&self) -> Result<()> {
        let Some(ref dir) = self.data_dir else {
            return Ok(());
        };

        if let Some(snapshot) = read_json::<DirectorySnapshot>(&dir.join(DIRECTORY_FILE))? {
            let feeds = snapshot.feeds.len();
            self.directory.restore(snapshot)?;
            tracing::info!("Loaded {} feeds from disk", feeds);
        }

        if let Some(multifeeds) = read_json::<Vec<Multifeed>>(&dir.join(MULTIFEEDS_FILE))? {
            tracing::info!("Loaded {} multifeeds from disk", multifeeds.len());
            self.multifeeds.restore(multifeeds);
        }

        if let Some(dumps) = read_json::<Vec<ChannelDump>>(&dir.join(SAMPLES_FILE))? {
            self.datastore.restore(&dumps);
            tracing::info!("Loaded {} channels of samples from disk", dumps.len());
        }

        Ok(())
    }

    /// Write the directory, multifeeds, and raw samples to the data
    /// directory. Tiles and bounds are rebuilt from the samples on load.
    pub fn save_to_disk(&self) -> Result<()> {
        let Some(ref dir) = self.data_dir else {
            return Ok(());
        };

        let snapshot = self.directory.snapshot();
        write_json(&dir.join(DIRECTORY_FILE), &snapshot)?;
        tracing::debug!("Saved {} feeds to disk", snapshot.feeds.len());

        let multifeeds = self.multifeeds.list();
        write_json(&dir.join(MULTIFEEDS_FILE), &multifeeds)?;
        tracing::debug!("Saved {} multifeeds to disk", multifeeds.len());

        let dumps = self.datastore.dump();
        write_json(&dir.join(SAMPLES_FILE), &dumps)?;
        tracing::debug!("Saved {} channels of samples to disk", dumps.len());

        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&data).map_err(|e| {
        EsdrError::Storage(format!("corrupt snapshot {}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// Written to a sibling temporary file, then renamed into place.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
