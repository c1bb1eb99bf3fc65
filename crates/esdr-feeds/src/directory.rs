//! ESDR Feed Directory
//!
//! In-memory registry of products and feeds. Owns feed API key generation:
//! every feed gets a read-write key and a read-only key, distinct from each
//! other and from every key of every other feed.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::auth::{KeyKind, Visibility};
use crate::selector::Selector;
use crate::types::{Feed, NewFeed, NewProduct, Product};
use chrono::Utc;
use esdr_common::{EsdrError, FeedId, ProductId, Result, SecurityConfig, UserId};
use esdr_timeseries::FeedBounds;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Feed Directory
// =============================================================================

/// Registry of products and feeds.
pub struct FeedDirectory {
    api_key_bytes: usize,
    products: RwLock<BTreeMap<ProductId, Product>>,
    feeds: RwLock<BTreeMap<FeedId, Feed>>,
    /// Every issued key, read-write and read-only alike.
    keys: RwLock<HashMap<String, (FeedId, KeyKind)>>,
    next_product_id: AtomicU64,
    next_feed_id: AtomicU64,
}

impl FeedDirectory {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            api_key_bytes: config.api_key_bytes,
            products: RwLock::new(BTreeMap::new()),
            feeds: RwLock::new(BTreeMap::new()),
            keys: RwLock::new(HashMap::new()),
            next_product_id: AtomicU64::new(1),
            next_feed_id: AtomicU64::new(1),
        }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Register a product. Product names are unique.
    pub fn create_product(&self, new: NewProduct, creator: UserId) -> Result<Product> {
        new.validate()?;
        let mut products = self.products.write();
        if products.values().any(|p| p.name == new.name) {
            return Err(EsdrError::Conflict(format!(
                "product name '{}' is already in use",
                new.name
            )));
        }

        let now = Utc::now();
        let id = ProductId(self.next_product_id.fetch_add(1, Ordering::SeqCst));
        let product = Product {
            id,
            pretty_name: new.pretty_name.unwrap_or_else(|| new.name.clone()),
            name: new.name,
            vendor: new.vendor,
            description: new.description,
            creator_user_id: creator,
            is_public: new.is_public,
            default_channel_specs: new.default_channel_specs,
            created: now,
            modified: now,
        };
        products.insert(id, product.clone());
        tracing::debug!(product = %id, name = %product.name, "product created");
        Ok(product)
    }

    pub fn product(&self, id: ProductId) -> Result<Product> {
        self.products
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("product {}", id)))
    }

    /// Look a product up by numeric id or by name.
    pub fn find_product(&self, id_or_name: &str) -> Result<Product> {
        if let Ok(id) = id_or_name.parse::<u64>() {
            if let Ok(product) = self.product(ProductId(id)) {
                return Ok(product);
            }
        }
        self.products
            .read()
            .values()
            .find(|p| p.name == id_or_name)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("product '{}'", id_or_name)))
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.read().values().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Feeds
    // -------------------------------------------------------------------------

    /// Create a feed owned by `owner`. Channel specs default to the product's.
    pub fn create_feed(&self, new: NewFeed, owner: UserId) -> Result<Feed> {
        new.validate()?;
        let product = self.product(new.product_id).map_err(|_| {
            EsdrError::validation("productId", format!("unknown product {}", new.product_id))
        })?;

        let mut feeds = self.feeds.write();
        let mut keys = self.keys.write();

        let api_key = self.unique_key(&keys);
        let api_key_read_only = loop {
            let key = self.unique_key(&keys);
            if key != api_key {
                break key;
            }
        };

        let now = Utc::now();
        let id = FeedId(self.next_feed_id.fetch_add(1, Ordering::SeqCst));
        keys.insert(api_key.clone(), (id, KeyKind::ReadWrite));
        keys.insert(api_key_read_only.clone(), (id, KeyKind::ReadOnly));

        let feed = Feed {
            id,
            name: new.name,
            device_id: new.device_id,
            user_id: owner,
            product_id: product.id,
            exposure: new.exposure,
            is_public: new.is_public,
            is_mobile: new.is_mobile,
            latitude: new.latitude,
            longitude: new.longitude,
            channel_specs: new
                .channel_specs
                .unwrap_or_else(|| product.default_channel_specs.clone()),
            api_key,
            api_key_read_only,
            created: now,
            modified: now,
            last_upload: None,
            min_time_secs: None,
            max_time_secs: None,
            channel_bounds: FeedBounds::new(),
        };
        feeds.insert(id, feed.clone());
        tracing::debug!(feed = %id, owner = %owner, product = %product.id, "feed created");
        Ok(feed)
    }

    fn unique_key(&self, keys: &HashMap<String, (FeedId, KeyKind)>) -> String {
        loop {
            let key = generate_key(self.api_key_bytes);
            if !keys.contains_key(&key) {
                return key;
            }
        }
    }

    pub fn feed(&self, id: FeedId) -> Result<Feed> {
        self.feeds
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("feed {}", id)))
    }

    pub fn contains_feed(&self, id: FeedId) -> bool {
        self.feeds.read().contains_key(&id)
    }

    /// Feed owning an API key, and which of its keys it is.
    pub fn feed_by_key(&self, api_key: &str) -> Option<(Feed, KeyKind)> {
        let (id, kind) = *self.keys.read().get(api_key)?;
        self.feeds.read().get(&id).cloned().map(|feed| (feed, kind))
    }

    /// Feeds matching a selector among those visible to the caller, by id.
    pub fn query(&self, selector: &Selector, visibility: &Visibility) -> Vec<Feed> {
        self.feeds
            .read()
            .values()
            .filter(|feed| visibility.can_see(feed) && selector.matches(feed))
            .cloned()
            .collect()
    }

    /// Record an upload: refresh the bounds views and the upload time.
    pub fn record_upload(&self, id: FeedId, bounds: &FeedBounds) -> Result<()> {
        let mut feeds = self.feeds.write();
        let feed = feeds
            .get_mut(&id)
            .ok_or_else(|| EsdrError::NotFound(format!("feed {}", id)))?;
        feed.apply_bounds(bounds, Utc::now());
        Ok(())
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.read().len()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            products: self.products(),
            feeds: self.feeds.read().values().cloned().collect(),
        }
    }

    /// Replace the directory's contents with a snapshot. Nothing changes
    /// when the snapshot is inconsistent.
    pub fn restore(&self, snapshot: DirectorySnapshot) -> Result<()> {
        let mut restored_keys = HashMap::new();
        for feed in &snapshot.feeds {
            for (key, kind) in [
                (&feed.api_key, KeyKind::ReadWrite),
                (&feed.api_key_read_only, KeyKind::ReadOnly),
            ] {
                if restored_keys.insert(key.clone(), (feed.id, kind)).is_some() {
                    return Err(EsdrError::Storage(format!(
                        "duplicate API key in snapshot for feed {}",
                        feed.id
                    )));
                }
            }
        }
        let restored_products: BTreeMap<ProductId, Product> =
            snapshot.products.into_iter().map(|p| (p.id, p)).collect();
        let restored_feeds: BTreeMap<FeedId, Feed> =
            snapshot.feeds.into_iter().map(|f| (f.id, f)).collect();

        let mut products = self.products.write();
        let mut feeds = self.feeds.write();
        let mut keys = self.keys.write();

        let next_product = restored_products.keys().next_back().map(|id| id.0 + 1).unwrap_or(1);
        let next_feed = restored_feeds.keys().next_back().map(|id| id.0 + 1).unwrap_or(1);
        self.next_product_id.store(next_product, Ordering::SeqCst);
        self.next_feed_id.store(next_feed, Ordering::SeqCst);

        *products = restored_products;
        *feeds = restored_feeds;
        *keys = restored_keys;

        tracing::info!(products = products.len(), feeds = feeds.len(), "feed directory restored");
        Ok(())
    }
}

/// Serializable copy of the directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub products: Vec<Product>,
    pub feeds: Vec<Feed>,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Random hex key from `bytes` bytes of entropy.
fn generate_key(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(&buf)
}

pub(crate) mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut result = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}

// =============================================================================
// Tests
// =============================================================================
