/// The item store: records keyed by id with a unique content-hash index

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::StashError;
use crate::item::{Item, ItemPatch, ItemStatus, Timestamp};
use crate::lifespan::{DEFAULT_LIFESPAN_DAYS, calculate_expires_at, extend_lifespan};

/// Version written into every snapshot
pub const SCHEMA_VERSION: u32 = 3;

/// First schema version that carries `expiresAt` and `lifespanDays`
const EXPIRY_SCHEMA_VERSION: u32 = 2;

/// Default page size for listing and search
pub const DEFAULT_LIMIT: usize = 200;

/// Serialized form of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashSnapshot {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub items: Vec<Item>,
}

fn legacy_version() -> u32 {
    1
}

impl StashSnapshot {
    /// Bring rows from older schema versions up to date. Additive only.
    fn migrate(&mut self) {
        if self.version < EXPIRY_SCHEMA_VERSION {
            let mut backfilled = 0usize;
            for item in &mut self.items {
                if item.expires_at.is_none() {
                    let lifespan_days = item.lifespan_days.unwrap_or(DEFAULT_LIFESPAN_DAYS);
                    item.lifespan_days = Some(lifespan_days);
                    item.expires_at = Some(calculate_expires_at(item.created_at, lifespan_days));
                    backfilled += 1;
                }
            }
            debug!("Backfilled expiry on {} legacy items", backfilled);
        }
        self.version = SCHEMA_VERSION;
    }
}

/// In-memory item table with secondary indexes
///
/// - `by_hash`: unique, content hash -> id
/// - `by_status`: status -> ids
/// - `by_created` / `by_expiry`: ordered (timestamp, id) pairs
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    items: HashMap<String, Item>,
    by_hash: HashMap<String, String>,
    by_status: HashMap<ItemStatus, BTreeSet<String>>,
    by_created: BTreeSet<(Timestamp, String)>,
    by_expiry: BTreeSet<(Timestamp, String)>,
}

impl ItemStore {
    pub fn new() -> Self {
        ItemStore::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<&Item> {
        self.by_hash.get(hash).and_then(|id| self.items.get(id))
    }

    /// Bulk lookup; the result only holds hashes that exist in the store
    pub fn find_by_hashes<'a, I>(&self, hashes: I) -> HashMap<String, Item>
    where
        I: IntoIterator<Item = &'a String>,
    {
        hashes
            .into_iter()
            .filter_map(|hash| {
                self.find_by_hash(hash)
                    .map(|item| (hash.clone(), item.clone()))
            })
            .collect()
    }

    pub fn insert(&mut self, item: Item) -> Result<(), StashError> {
        if self.by_hash.contains_key(&item.content_hash) {
            return Err(StashError::DuplicateHash(item.content_hash));
        }
        if self.items.contains_key(&item.id) {
            return Err(StashError::Storage(format!("id {} already in use", item.id)));
        }
        self.index(&item);
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Insert a batch; each rejected row is returned alongside its error
    pub fn insert_many(&mut self, items: Vec<Item>) -> Vec<(Item, StashError)> {
        let mut rejected = Vec::new();
        for item in items {
            if let Err(err) = self.insert(item.clone()) {
                rejected.push((item, err));
            }
        }
        rejected
    }

    pub fn update(&mut self, id: &str, patch: &ItemPatch) -> Result<&Item, StashError> {
        self.modify(id, |item| item.apply_patch(patch))
    }

    pub fn extend_lifespan(&mut self, id: &str, extra_days: u32) -> Result<&Item, StashError> {
        self.modify(id, |item| extend_lifespan(item, extra_days))
    }

    /// Status write for the archive sweep, the one writer of `autoArchived`
    pub fn put_status(
        &mut self,
        id: &str,
        status: ItemStatus,
        automatic: bool,
    ) -> Result<(), StashError> {
        self.modify(id, |item| {
            item.status = status;
            item.auto_archived = automatic;
        })
        .map(|_| ())
    }

    /// Replace a stored row wholesale, keeping its id.
    /// The content hash may change only to one no other item holds.
    pub fn put(&mut self, item: Item) -> Result<(), StashError> {
        let Some(old) = self.items.get(&item.id) else {
            return Err(StashError::ItemNotFound(item.id));
        };
        if old.content_hash != item.content_hash {
            if let Some(owner) = self.by_hash.get(&item.content_hash) {
                if owner != &item.id {
                    return Err(StashError::DuplicateHash(item.content_hash));
                }
            }
        }
        let old = old.clone();
        self.unindex(&old);
        self.index(&item);
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Run `change` against one item and re-index it.
    /// Id and content hash are restored if `change` touched them.
    fn modify<F>(&mut self, id: &str, change: F) -> Result<&Item, StashError>
    where
        F: FnOnce(&mut Item),
    {
        let Some(old) = self.items.get(id).cloned() else {
            return Err(StashError::ItemNotFound(id.to_string()));
        };
        let mut next = old.clone();
        change(&mut next);
        next.id = old.id.clone();
        next.content_hash = old.content_hash.clone();

        self.unindex(&old);
        self.index(&next);
        self.items.insert(next.id.clone(), next);
        self.items
            .get(id)
            .ok_or_else(|| StashError::ItemNotFound(id.to_string()))
    }

    /// Hard delete. Returns whether anything was removed
    pub fn delete(&mut self, id: &str) -> bool {
        match self.items.remove(id) {
            Some(item) => {
                self.unindex(&item);
                true
            }
            None => false,
        }
    }

    pub fn query_by_status(&self, status: ItemStatus) -> Vec<&Item> {
        self.by_status
            .get(&status)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default()
    }

    /// Newest first by creation time
    pub fn list_recent(&self, limit: usize) -> Vec<&Item> {
        self.list_page(0, limit)
    }

    pub fn list_page(&self, offset: usize, limit: usize) -> Vec<&Item> {
        self.by_created
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|(_, id)| self.items.get(id))
            .collect()
    }

    /// Case-insensitive substring search over title, url and tags, newest first
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Item> {
        let needle = query.trim().to_lowercase();
        self.by_created
            .iter()
            .rev()
            .filter_map(|(_, id)| self.items.get(id))
            .filter(|item| item.matches(&needle))
            .take(limit)
            .collect()
    }

    /// Items whose expiry is at or before `cutoff`, soonest first
    pub fn expiring_before(&self, cutoff: Timestamp) -> Vec<&Item> {
        self.by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= cutoff)
            .filter_map(|(_, id)| self.items.get(id))
            .collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    fn index(&mut self, item: &Item) {
        self.by_hash.insert(item.content_hash.clone(), item.id.clone());
        self.by_status
            .entry(item.status)
            .or_default()
            .insert(item.id.clone());
        self.by_created.insert((item.created_at, item.id.clone()));
        if let Some(expires_at) = item.expires_at {
            self.by_expiry.insert((expires_at, item.id.clone()));
        }
    }

    fn unindex(&mut self, item: &Item) {
        if self.by_hash.get(&item.content_hash) == Some(&item.id) {
            self.by_hash.remove(&item.content_hash);
        }
        if let Some(ids) = self.by_status.get_mut(&item.status) {
            ids.remove(&item.id);
        }
        self.by_created.remove(&(item.created_at, item.id.clone()));
        if let Some(expires_at) = item.expires_at {
            self.by_expiry.remove(&(expires_at, item.id.clone()));
        }
    }

    pub fn snapshot(&self) -> StashSnapshot {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        StashSnapshot {
            version: SCHEMA_VERSION,
            items,
        }
    }

    /// Rebuild a store from a snapshot, migrating older versions.
    /// Rows that would break the unique hash index are dropped.
    pub fn from_snapshot(mut snapshot: StashSnapshot) -> ItemStore {
        snapshot.migrate();
        let mut store = ItemStore::new();
        for item in snapshot.items {
            let id = item.id.clone();
            if let Err(err) = store.insert(item) {
                warn!("Dropping item {} while loading snapshot: {}", id, err);
            }
        }
        store
    }

    pub fn to_json(&self) -> Result<String, StashError> {
        serde_json::to_string(&self.snapshot()).map_err(|e| StashError::Storage(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<ItemStore, StashError> {
        let snapshot: StashSnapshot =
            serde_json::from_str(json).map_err(|e| StashError::Storage(e.to_string()))?;
        Ok(ItemStore::from_snapshot(snapshot))
    }

    /// True when no two items share a hash and every index agrees with the table
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.items.values().all(|item| {
            seen.insert(item.content_hash.as_str())
                && self.by_hash.get(&item.content_hash) == Some(&item.id)
        }) && self.by_hash.len() == self.items.len()
            && self.by_created.len() == self.items.len()
    }
}
