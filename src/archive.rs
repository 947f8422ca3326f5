/// Auto-archival of expired to-read items
use log::{debug, info, warn};

use crate::item::{ItemStatus, Timestamp};
use crate::lifespan::is_expired;
use crate::storage::ItemStore;

/// How often the sweep runs after startup
pub const ARCHIVE_INTERVAL_MINUTES: u32 = 6 * 60;

pub const ARCHIVE_INTERVAL_MS: i64 = ARCHIVE_INTERVAL_MINUTES as i64 * 60 * 1000;

/// Told whenever a sweep actually changed something
pub trait ChangeObserver {
    fn items_changed(&mut self, archived_ids: &[String]);
}

impl<F> ChangeObserver for F
where
    F: FnMut(&[String]),
{
    fn items_changed(&mut self, archived_ids: &[String]) {
        self(archived_ids)
    }
}

/// Move every expired `to-read` item to `archived`, flagged as automatic.
/// Returns the ids that were archived. Running it again is a no-op.
pub fn sweep(store: &mut ItemStore, now: Timestamp) -> Vec<String> {
    let due: Vec<String> = store
        .query_by_status(ItemStatus::ToRead)
        .into_iter()
        .filter(|item| is_expired(item, now))
        .map(|item| item.id.clone())
        .collect();

    let mut archived = Vec::with_capacity(due.len());
    for id in due {
        let result = store.put_status(&id, ItemStatus::Archived, true);
        match result {
            Ok(()) => archived.push(id),
            Err(err) => warn!("Could not auto-archive {}: {}", id, err),
        }
    }

    if archived.is_empty() {
        debug!("Archive sweep found nothing to do");
    } else {
        info!("Auto-archived {} expired items", archived.len());
    }
    archived
}

/// Tracks when the recurring sweep last ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveScheduler {
    interval_ms: i64,
    last_run: Option<Timestamp>,
}

impl Default for ArchiveScheduler {
    fn default() -> Self {
        ArchiveScheduler::new(ARCHIVE_INTERVAL_MS)
    }
}

impl ArchiveScheduler {
    pub fn new(interval_ms: i64) -> Self {
        ArchiveScheduler {
            interval_ms,
            last_run: None,
        }
    }

    pub fn last_run(&self) -> Option<Timestamp> {
        self.last_run
    }

    /// Due on first call (process start), then once per interval
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Sweep unconditionally and notify the observer if anything moved
    pub fn run(
        &mut self,
        store: &mut ItemStore,
        now: Timestamp,
        observer: &mut dyn ChangeObserver,
    ) -> Vec<String> {
        self.last_run = Some(now);
        let archived = sweep(store, now);
        if !archived.is_empty() {
            observer.items_changed(&archived);
        }
        archived
    }

    pub fn run_if_due(
        &mut self,
        store: &mut ItemStore,
        now: Timestamp,
        observer: &mut dyn ChangeObserver,
    ) -> Option<Vec<String>> {
        if self.is_due(now) {
            Some(self.run(store, now, observer))
        } else {
            None
        }
    }
}
