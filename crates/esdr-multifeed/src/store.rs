//! ESDR Multifeed Store
//!
//! Create and look up multifeeds. Names are unique across all owners; a
//! multifeed created without a name gets a fresh generated one, so identical
//! name-less creations always produce distinct records.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{compile_spec, validate_name, Multifeed, NewMultifeed};
use chrono::Utc;
use esdr_common::{EsdrError, MultifeedId, Result, UserId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Registry of multifeeds.
pub struct MultifeedStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<MultifeedId, Multifeed>,
    next_id: u64,
}

impl MultifeedStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                entries: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Create a multifeed owned by `owner`.
    pub fn create(&self, new: NewMultifeed, owner: UserId) -> Result<Multifeed> {
        compile_spec(&new.spec)?;
        if let Some(name) = &new.name {
            validate_name(name)?;
        }

        let mut inner = self.inner.write();
        let name = match new.name {
            Some(name) => {
                if inner.entries.values().any(|m| m.name == name) {
                    return Err(EsdrError::Conflict(format!(
                        "multifeed name '{}' is already in use",
                        name
                    )));
                }
                name
            }
            None => loop {
                let candidate = format!("multifeed-{}", Uuid::new_v4().simple());
                if !inner.entries.values().any(|m| m.name == candidate) {
                    break candidate;
                }
            },
        };

        let now = Utc::now();
        let id = MultifeedId(inner.next_id);
        inner.next_id += 1;
        let multifeed = Multifeed {
            id,
            user_id: owner,
            name,
            spec: new.spec,
            created: now,
            modified: now,
        };
        inner.entries.insert(id, multifeed.clone());
        tracing::debug!(
            multifeed = %id,
            name = %multifeed.name,
            owner = %owner,
            "multifeed created"
        );
        Ok(multifeed)
    }

    pub fn get(&self, id: MultifeedId) -> Result<Multifeed> {
        self.inner
            .read()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("multifeed {}", id)))
    }

    pub fn get_by_name(&self, name: &str) -> Result<Multifeed> {
        self.inner
            .read()
            .entries
            .values()
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| EsdrError::NotFound(format!("multifeed '{}'", name)))
    }

    /// Look a multifeed up by numeric id or by name.
    pub fn find(&self, id_or_name: &str) -> Result<Multifeed> {
        match id_or_name.parse::<u64>() {
            Ok(id) => self.get(MultifeedId(id)),
            Err(_) => self.get_by_name(id_or_name),
        }
    }

    pub fn list(&self) -> Vec<Multifeed> {
        self.inner.read().entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the store's contents with persisted multifeeds.
    pub fn restore(&self, multifeeds: Vec<Multifeed>) {
        let entries: BTreeMap<MultifeedId, Multifeed> =
            multifeeds.into_iter().map(|m| (m.id, m)).collect();
        let next_id = entries.keys().next_back().map(|id| id.0 + 1).unwrap_or(1);
        let mut inner = self.inner.write();
        inner.entries = entries;
        inner.next_id = next_id;
    }
}

impl Default for MultifeedStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
