/// Stash reconciliation: mapping incoming URLs onto new or existing items

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::canonical::is_http_url;
use crate::hash::url_hash;
use crate::item::{Item, IncomingItem, Timestamp, merge_tags};
use crate::settings::NormalizationPolicy;
use crate::storage::ItemStore;

/// Which caller is reconciling. Re-capturing a live tab counts as another
/// sighting; re-importing a row only refreshes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    Capture,
    Import,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub policy: NormalizationPolicy,
    pub lifespan_days: u32,
    pub now: Timestamp,
    pub mode: ReconcileMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    /// Inputs dropped for not being http(s)
    pub skipped: usize,
    /// Rows the store refused
    pub failed: usize,
    /// Hashes that now have a stored item as a result of this batch
    pub stored_hashes: HashSet<String>,
}

/// Merge a batch of incoming URLs into the store
///
/// Algorithm:
/// 1. Drop anything that is not http(s)
/// 2. Canonicalize and hash every input
/// 3. Coalesce inputs sharing a hash, in first-seen order
/// 4. One bulk lookup for all hashes
/// 5. Existing hash → merge into the stored item; new hash → fresh item
/// 6. Insert all new items, then write back updates one by one
///
/// Each row stands alone: a rejected write is logged and counted as
/// failed, and the rest of the batch carries on.
pub fn reconcile(
    store: &mut ItemStore,
    incoming: Vec<IncomingItem>,
    options: &ReconcileOptions,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let total = incoming.len();

    let candidates: Vec<IncomingItem> = incoming
        .into_iter()
        .filter(|entry| is_http_url(&entry.url))
        .collect();
    outcome.skipped = total - candidates.len();

    let batch = coalesce(candidates, &options.policy);
    let hashes: Vec<String> = batch.iter().map(|(hash, _)| hash.clone()).collect();
    let existing = store.find_by_hashes(&hashes);
    debug!(
        "Reconciling {} unique urls ({} already stashed)",
        batch.len(),
        existing.len()
    );

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for (hash, entry) in batch {
        match existing.get(&hash) {
            Some(current) => updates.push(merge_existing(current.clone(), entry, options)),
            None => inserts.push(create_item(hash, entry, options)),
        }
    }

    let attempted = inserts.len();
    let inserted_hashes: Vec<String> = inserts.iter().map(|i| i.content_hash.clone()).collect();
    let rejected = store.insert_many(inserts);
    let rejected_hashes: HashSet<String> = rejected
        .iter()
        .map(|(item, _)| item.content_hash.clone())
        .collect();
    for (item, err) in &rejected {
        warn!("Skipping new item {}: {}", item.id, err);
    }
    outcome.added = attempted - rejected.len();
    outcome.failed += rejected.len();
    outcome
        .stored_hashes
        .extend(inserted_hashes.into_iter().filter(|h| !rejected_hashes.contains(h)));

    for item in updates {
        let hash = item.content_hash.clone();
        let id = item.id.clone();
        match store.put(item) {
            Ok(()) => {
                outcome.updated += 1;
                outcome.stored_hashes.insert(hash);
            }
            Err(err) => {
                warn!("Skipping update of item {}: {}", id, err);
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Reconciled batch: {} added, {} updated, {} skipped, {} failed",
        outcome.added, outcome.updated, outcome.skipped, outcome.failed
    );
    outcome
}

/// Group inputs by content hash so one batch never collides with itself
fn coalesce(
    entries: Vec<IncomingItem>,
    policy: &NormalizationPolicy,
) -> Vec<(String, IncomingItem)> {
    let mut batch: Vec<(String, IncomingItem)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let hash = url_hash(&entry.url, policy);
        match positions.get(&hash) {
            Some(&pos) => absorb(&mut batch[pos].1, entry),
            None => {
                positions.insert(hash.clone(), batch.len());
                batch.push((hash, entry));
            }
        }
    }
    batch
}

/// Fold a duplicate input into the first one seen for the same hash
fn absorb(into: &mut IncomingItem, other: IncomingItem) {
    merge_tags(&mut into.tags, &other.tags);
    if let Some(title) = non_empty(other.title) {
        into.title = Some(title);
    }
    if let Some(favicon) = non_empty(other.favicon) {
        into.favicon = Some(favicon);
    }
    if other.status.is_some() {
        into.status = other.status;
    }
    into.created_at = match (into.created_at, other.created_at) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    if into.group.is_none() {
        into.group = other.group;
        into.group_created_at = other.group_created_at;
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn merge_existing(mut item: Item, entry: IncomingItem, options: &ReconcileOptions) -> Item {
    merge_tags(&mut item.tags, &entry.tags);
    if let Some(title) = non_empty(entry.title) {
        item.title = Some(title);
    }
    if let Some(favicon) = non_empty(entry.favicon) {
        item.favicon = Some(favicon);
    }
    if let Some(status) = entry.status {
        if status != item.status {
            item.auto_archived = false;
        }
        item.status = status;
    }
    item.last_seen_at = item.last_seen_at.max(options.now);
    if options.mode == ReconcileMode::Capture {
        item.times_added = item.times_added.saturating_add(1);
    }
    item
}

fn create_item(hash: String, entry: IncomingItem, options: &ReconcileOptions) -> Item {
    let created_at = entry.created_at.unwrap_or(options.now);
    let mut item = Item::new(entry.url, hash, created_at, options.lifespan_days);
    item.last_seen_at = created_at.max(options.now);
    item.title = non_empty(entry.title);
    item.favicon = non_empty(entry.favicon);
    item.status = entry.status.unwrap_or_default();
    merge_tags(&mut item.tags, &entry.tags);
    item.group = entry.group;
    item.group_created_at = entry.group_created_at;
    item
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RehashReport {
    pub rehashed: usize,
    pub merged: usize,
}

/// Recompute every content hash under `policy`
///
/// Items that collide under the new policy collapse into the oldest one:
/// tags unioned, sightings summed, latest `lastSeenAt` kept.
pub fn rebuild_hashes(store: &mut ItemStore, policy: &NormalizationPolicy) -> RehashReport {
    let mut report = RehashReport::default();
    let mut items: Vec<Item> = store.items().cloned().collect();
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut survivors: Vec<Item> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for mut item in items {
        let hash = url_hash(&item.url, policy);
        if hash != item.content_hash {
            report.rehashed += 1;
        }
        match positions.get(&hash) {
            Some(&pos) => {
                let survivor = &mut survivors[pos];
                merge_tags(&mut survivor.tags, &item.tags);
                survivor.times_added = survivor.times_added.saturating_add(item.times_added);
                survivor.last_seen_at = survivor.last_seen_at.max(item.last_seen_at);
                if survivor.title.is_none() {
                    survivor.title = item.title;
                }
                report.merged += 1;
            }
            None => {
                item.content_hash = hash.clone();
                positions.insert(hash, survivors.len());
                survivors.push(item);
            }
        }
    }

    let mut rebuilt = ItemStore::new();
    for item in survivors {
        if let Err(err) = rebuilt.insert(item) {
            warn!("Dropping item during hash rebuild: {}", err);
        }
    }
    *store = rebuilt;

    info!(
        "Rebuilt hashes: {} changed, {} merged",
        report.rehashed, report.merged
    );
    report
}
