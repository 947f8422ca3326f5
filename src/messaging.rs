/// Request/response contract between the UI and the background stash

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveScheduler, ChangeObserver};
use crate::canonical::{is_http_url, is_stashable_url};
use crate::csv_import;
use crate::error::StashError;
use crate::hash::url_hash;
use crate::item::{IncomingItem, Item, ItemPatch, ItemStatus, Timestamp};
use crate::lifespan::LifespanReport;
use crate::onetab;
use crate::operations::{
    ReconcileMode, ReconcileOptions, RehashReport, rebuild_hashes, reconcile,
};
use crate::settings::{SettingsPatch, StashSettings};
use crate::storage::{DEFAULT_LIMIT, ItemStore};
use crate::tab_data::{TabSummary, TabWithStatus};
use crate::tabs::{TabHost, TabScope};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    Ping,
    GetTabs {
        current_window: Option<bool>,
    },
    GetTabsStatus {
        current_window: Option<bool>,
    },
    #[serde(alias = "STASH_TABS")]
    CaptureTabs {
        tab_ids: Option<Vec<i32>>,
        #[serde(default)]
        tags: Vec<String>,
        close: Option<bool>,
        #[serde(default)]
        preserve_active: bool,
    },
    GetItems {
        limit: Option<usize>,
    },
    SearchItems {
        #[serde(alias = "q")]
        query: String,
    },
    UpdateItem {
        id: String,
        patch: ItemPatch,
    },
    DeleteItem {
        id: String,
    },
    ImportItems {
        items: Vec<IncomingItem>,
    },
    ImportOnetab {
        text: String,
    },
    ImportCsv {
        text: String,
    },
    ExtendLifespan {
        id: String,
        additional_days: u32,
    },
    GetLifespan {
        id: String,
    },
    CloseTabs {
        tab_ids: Vec<i32>,
        include_pinned: Option<bool>,
    },
    OpenOrFocusUrl {
        url: String,
    },
}

impl Request {
    pub fn from_json(json: &str) -> Result<Request, StashError> {
        serde_json::from_str(json).map_err(|e| StashError::InvalidMessage(e.to_string()))
    }

    /// Requests that read or act on browser tabs
    pub fn needs_tabs(&self) -> bool {
        matches!(
            self,
            Request::GetTabs { .. }
                | Request::GetTabsStatus { .. }
                | Request::CaptureTabs { .. }
                | Request::CloseTabs { .. }
                | Request::OpenOrFocusUrl { .. }
        )
    }

    /// Wire name of the request, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping => "PING",
            Request::GetTabs { .. } => "GET_TABS",
            Request::GetTabsStatus { .. } => "GET_TABS_STATUS",
            Request::CaptureTabs { .. } => "CAPTURE_TABS",
            Request::GetItems { .. } => "GET_ITEMS",
            Request::SearchItems { .. } => "SEARCH_ITEMS",
            Request::UpdateItem { .. } => "UPDATE_ITEM",
            Request::DeleteItem { .. } => "DELETE_ITEM",
            Request::ImportItems { .. } => "IMPORT_ITEMS",
            Request::ImportOnetab { .. } => "IMPORT_ONETAB",
            Request::ImportCsv { .. } => "IMPORT_CSV",
            Request::ExtendLifespan { .. } => "EXTEND_LIFESPAN",
            Request::GetLifespan { .. } => "GET_LIFESPAN",
            Request::CloseTabs { .. } => "CLOSE_TABS",
            Request::OpenOrFocusUrl { .. } => "OPEN_OR_FOCUS_URL",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StashCounts {
    pub added: usize,
    pub updated: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum Response {
    Pong { pong: bool },
    Tabs { tabs: Vec<TabSummary> },
    TabStatus { tab_status: Vec<TabWithStatus> },
    Stash { stash: StashCounts },
    Items { items: Vec<Item> },
    Updated { updated: bool },
    Deleted { deleted: bool },
    Imported { imported: usize, updated: usize },
    Extended { extended: bool },
    Lifespan { lifespan: LifespanReport },
    Closed { closed: usize },
    Focused { focused: bool },
    Opened { opened: bool },
}

/// What goes back over the wire: `{ ok: true, ...payload }` or
/// `{ ok: false, error, code }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(flatten)]
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Reply {
    pub fn success(response: Response) -> Reply {
        Reply {
            ok: true,
            response: Some(response),
            error: None,
            code: None,
        }
    }

    pub fn failure(err: &StashError) -> Reply {
        Reply {
            ok: false,
            response: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
        }
    }

    /// The browser refused to close the tabs this reply counted
    pub fn clear_closed(&mut self) {
        match &mut self.response {
            Some(Response::Stash { stash }) => stash.closed = 0,
            Some(Response::Closed { closed }) => *closed = 0,
            _ => {}
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"ok":false,"error":"reply could not be encoded"}"#.to_string())
    }
}

/// Result of handling one request
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub reply: Reply,
    /// The store was modified and should be persisted and broadcast
    pub changed: bool,
}

/// Owns the stash and answers requests one at a time
///
/// Every mutating handler takes `&mut self`, so a check-then-insert on a
/// hash can never interleave with another writer.
#[derive(Debug, Clone, Default)]
pub struct StashService {
    store: ItemStore,
    settings: StashSettings,
    scheduler: ArchiveScheduler,
}

impl StashService {
    pub fn new(store: ItemStore, settings: StashSettings) -> Self {
        StashService {
            store,
            settings,
            scheduler: ArchiveScheduler::default(),
        }
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn settings(&self) -> &StashSettings {
        &self.settings
    }

    /// Swap in new settings. A changed normalization policy rehashes the
    /// whole stash so identity keeps following the active policy.
    pub fn set_settings(&mut self, settings: StashSettings) -> Result<Option<RehashReport>, StashError> {
        settings.validate()?;
        let policy_changed = settings.policy() != self.settings.policy();
        self.settings = settings;
        if policy_changed {
            Ok(Some(rebuild_hashes(&mut self.store, &self.settings.policy())))
        } else {
            Ok(None)
        }
    }

    pub fn patch_settings(&mut self, patch: &SettingsPatch) -> Result<Option<RehashReport>, StashError> {
        let next = self.settings.patched(patch)?;
        self.set_settings(next)
    }

    /// Archive sweep on the recurring schedule (due immediately after start)
    pub fn tick(&mut self, now: Timestamp, observer: &mut dyn ChangeObserver) -> Vec<String> {
        self.scheduler
            .run_if_due(&mut self.store, now, observer)
            .unwrap_or_default()
    }

    /// Archive sweep regardless of schedule
    pub fn run_archive_sweep(&mut self, now: Timestamp, observer: &mut dyn ChangeObserver) -> Vec<String> {
        self.scheduler.run(&mut self.store, now, observer)
    }

    pub fn handle_json(&mut self, json: &str, host: &mut dyn TabHost, now: Timestamp) -> Dispatch {
        match Request::from_json(json) {
            Ok(request) => self.handle(request, host, now),
            Err(err) => Dispatch {
                reply: Reply::failure(&err),
                changed: false,
            },
        }
    }

    pub fn handle(&mut self, request: Request, host: &mut dyn TabHost, now: Timestamp) -> Dispatch {
        let kind = request.kind();
        debug!("Handling {}", kind);
        match self.execute(request, host, now) {
            Ok((response, changed)) => Dispatch {
                reply: Reply::success(response),
                changed,
            },
            Err(err) => {
                warn!("{} failed: {}", kind, err);
                Dispatch {
                    reply: Reply::failure(&err),
                    changed: false,
                }
            }
        }
    }

    fn execute(
        &mut self,
        request: Request,
        host: &mut dyn TabHost,
        now: Timestamp,
    ) -> Result<(Response, bool), StashError> {
        match request {
            Request::Ping => Ok((Response::Pong { pong: true }, false)),
            Request::GetTabs { current_window } => {
                let tabs = host.list_tabs(scope(current_window))?;
                Ok((Response::Tabs { tabs }, false))
            }
            Request::GetTabsStatus { current_window } => {
                let tab_status = self.tabs_with_status(host, scope(current_window))?;
                Ok((Response::TabStatus { tab_status }, false))
            }
            Request::CaptureTabs {
                tab_ids,
                tags,
                close,
                preserve_active,
            } => {
                let stash = self.capture_tabs(host, tab_ids, tags, close, preserve_active, now)?;
                let changed = stash.added + stash.updated > 0;
                Ok((Response::Stash { stash }, changed))
            }
            Request::GetItems { limit } => {
                let items = self
                    .store
                    .list_recent(limit.unwrap_or(DEFAULT_LIMIT))
                    .into_iter()
                    .cloned()
                    .collect();
                Ok((Response::Items { items }, false))
            }
            Request::SearchItems { query } => {
                let items = self
                    .store
                    .search(&query, DEFAULT_LIMIT)
                    .into_iter()
                    .cloned()
                    .collect();
                Ok((Response::Items { items }, false))
            }
            Request::UpdateItem { id, patch } => {
                self.store.update(&id, &patch)?;
                Ok((Response::Updated { updated: true }, true))
            }
            Request::DeleteItem { id } => {
                let removed = self.store.delete(&id);
                Ok((Response::Deleted { deleted: true }, removed))
            }
            Request::ImportItems { items } => Ok(self.import(items, now)),
            Request::ImportOnetab { text } => {
                let rows = onetab::parse_export(&text, now)
                    .map(|group| onetab::to_incoming(&group))
                    .unwrap_or_default();
                Ok(self.import(rows, now))
            }
            Request::ImportCsv { text } => {
                let rows = csv_import::parse_csv(&text)?;
                Ok(self.import(rows, now))
            }
            Request::ExtendLifespan {
                id,
                additional_days,
            } => {
                self.store.extend_lifespan(&id, additional_days)?;
                Ok((Response::Extended { extended: true }, true))
            }
            Request::GetLifespan { id } => {
                let item = self
                    .store
                    .get(&id)
                    .ok_or_else(|| StashError::ItemNotFound(id.clone()))?;
                let lifespan = LifespanReport::for_item(item, now);
                Ok((Response::Lifespan { lifespan }, false))
            }
            Request::CloseTabs {
                tab_ids,
                include_pinned,
            } => {
                let include_pinned = include_pinned.unwrap_or(self.settings.close_pinned);
                let ids: Vec<i32> = host
                    .list_tabs(TabScope::AllWindows)?
                    .iter()
                    .filter(|tab| tab_ids.contains(&tab.id))
                    .filter(|tab| include_pinned || !tab.pinned)
                    .map(|tab| tab.id)
                    .collect();
                let closed = host.close_tabs(&ids)?;
                Ok((Response::Closed { closed }, false))
            }
            Request::OpenOrFocusUrl { url } => Ok((self.open_or_focus(host, &url)?, false)),
        }
    }

    fn reconcile_options(&self, mode: ReconcileMode, now: Timestamp) -> ReconcileOptions {
        ReconcileOptions {
            policy: self.settings.policy(),
            lifespan_days: self.settings.stale_days,
            now,
            mode,
        }
    }

    fn capture_tabs(
        &mut self,
        host: &mut dyn TabHost,
        tab_ids: Option<Vec<i32>>,
        tags: Vec<String>,
        close: Option<bool>,
        preserve_active: bool,
        now: Timestamp,
    ) -> Result<StashCounts, StashError> {
        let tabs: Vec<TabSummary> = match tab_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => host
                .list_tabs(TabScope::AllWindows)?
                .into_iter()
                .filter(|tab| ids.contains(&tab.id))
                .collect(),
            None => host.list_tabs(TabScope::CurrentWindow)?,
        };

        let incoming = tabs
            .iter()
            .map(|tab| IncomingItem {
                title: tab.title.clone(),
                favicon: tab.fav_icon_url.clone(),
                tags: tags.clone(),
                ..IncomingItem::from_url(&tab.url)
            })
            .collect();
        let options = self.reconcile_options(ReconcileMode::Capture, now);
        let outcome = reconcile(&mut self.store, incoming, &options);

        let mut counts = StashCounts {
            added: outcome.added,
            updated: outcome.updated,
            closed: 0,
        };

        if close.unwrap_or(self.settings.close_after_stash) {
            let keep = if preserve_active { host.active_tab_id() } else { None };
            let policy = self.settings.policy();
            // Only tabs whose URL made it into the store get closed
            let to_close: Vec<i32> = tabs
                .iter()
                .filter(|tab| self.settings.close_pinned || !tab.pinned)
                .filter(|tab| Some(tab.id) != keep)
                .filter(|tab| is_http_url(&tab.url))
                .filter(|tab| outcome.stored_hashes.contains(&url_hash(&tab.url, &policy)))
                .map(|tab| tab.id)
                .collect();
            counts.closed = match host.close_tabs(&to_close) {
                Ok(closed) => closed,
                Err(err) => {
                    warn!("Stashed tabs could not be closed: {}", err);
                    0
                }
            };
        }

        Ok(counts)
    }

    fn import(&mut self, rows: Vec<IncomingItem>, now: Timestamp) -> (Response, bool) {
        let options = self.reconcile_options(ReconcileMode::Import, now);
        let outcome = reconcile(&mut self.store, rows, &options);
        let changed = outcome.added + outcome.updated > 0;
        (
            Response::Imported {
                imported: outcome.added,
                updated: outcome.updated,
            },
            changed,
        )
    }

    fn tabs_with_status(
        &self,
        host: &dyn TabHost,
        scope: TabScope,
    ) -> Result<Vec<TabWithStatus>, StashError> {
        let policy = self.settings.policy();
        let tabs = host.list_tabs(scope)?;
        Ok(tabs
            .into_iter()
            .map(|tab| {
                let stashable = is_stashable_url(&tab.url);
                let content_hash = if stashable {
                    url_hash(&tab.url, &policy)
                } else {
                    String::new()
                };
                let existing = stashable
                    .then(|| self.store.find_by_hash(&content_hash))
                    .flatten();
                TabWithStatus {
                    stashed: existing.is_some_and(|item| item.status != ItemStatus::Trashed),
                    item_id: existing.map(|item| item.id.clone()),
                    item_status: existing.map(|item| item.status),
                    content_hash,
                    stashable,
                    tab,
                }
            })
            .collect())
    }

    fn open_or_focus(&self, host: &mut dyn TabHost, url: &str) -> Result<Response, StashError> {
        let policy = self.settings.policy();
        let target = url_hash(url, &policy);
        let open = host
            .list_tabs(TabScope::AllWindows)?
            .into_iter()
            .find(|tab| is_http_url(&tab.url) && url_hash(&tab.url, &policy) == target);

        match open {
            Some(tab) => {
                host.focus_tab(&tab)?;
                Ok(Response::Focused { focused: true })
            }
            None => {
                host.create_tab(url)?;
                Ok(Response::Opened { opened: true })
            }
        }
    }
}

fn scope(current_window: Option<bool>) -> TabScope {
    if current_window == Some(false) {
        TabScope::AllWindows
    } else {
        TabScope::CurrentWindow
    }
}
