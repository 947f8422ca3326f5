/// Tab Stash - capture open tabs into a deduplicated, self-expiring stash
/// Built with Rust + WASM

pub mod archive;
pub mod canonical;
pub mod csv_import;
pub mod error;
pub mod hash;
pub mod item;
pub mod lifespan;
pub mod messaging;
pub mod onetab;
pub mod operations;
pub mod settings;
pub mod storage;
pub mod tab_data;
pub mod tabs;

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Object, Promise, Reflect};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};

use crate::error::StashError;
use crate::item::Timestamp;
use crate::messaging::{Reply, Request, StashService};
use crate::settings::{NormalizationPolicy, SettingsPatch, StashSettings};
use crate::storage::ItemStore;
use crate::tab_data::TabSummary;
use crate::tabs::{RecordingTabHost, TabCommand};

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

impl From<StashError> for JsValue {
    fn from(err: StashError) -> JsValue {
        JsValue::from_str(&err.to_string())
    }
}

// Re-export the canonicalizer for JavaScript access
#[wasm_bindgen]
pub fn canonical_url(url: &str, strip_all_params: bool, strip_tracking_params: bool) -> String {
    let policy = NormalizationPolicy {
        strip_all_params,
        strip_tracking_params,
    };
    canonical::canonicalize(url, &policy)
}

// Minutes between archive sweeps, for chrome.alarms
#[wasm_bindgen]
pub fn archive_interval_minutes() -> u32 {
    archive::ARCHIVE_INTERVAL_MINUTES
}

/// Tabs as reported by the JS bridge's `snapshotTabs()`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TabSnapshot {
    tabs: Vec<TabSummary>,
    current_window_id: Option<i32>,
    active_tab_id: Option<i32>,
}

/// The background-side stash
///
/// `bridge` is a JS object providing:
/// - `snapshotTabs()` → `{ tabs, currentWindowId, activeTabId }`
/// - `closeTabs(ids)`, `createTab(url)`, `focusTab(tabId, windowId)`
/// - `persist(json)` → saves the store snapshot
/// - `notifyChanged()` → broadcasts that items changed
///
/// Any of them may return a Promise.
#[wasm_bindgen]
pub struct BackgroundStash {
    service: Rc<RefCell<StashService>>,
    bridge: Object,
}

#[wasm_bindgen]
impl BackgroundStash {
    #[wasm_bindgen(constructor)]
    pub fn new(
        snapshot_json: Option<String>,
        settings_json: Option<String>,
        bridge: Object,
    ) -> Result<BackgroundStash, JsValue> {
        let store = match snapshot_json {
            Some(json) => ItemStore::from_json(&json)?,
            None => ItemStore::new(),
        };
        let settings = match settings_json {
            Some(json) => StashSettings::from_json(&json)?,
            None => StashSettings::default(),
        };
        info!("Loaded stash with {} items", store.len());
        Ok(BackgroundStash {
            service: Rc::new(RefCell::new(StashService::new(store, settings))),
            bridge,
        })
    }

    /// Answer one UI message; resolves to `{ ok, ... }`
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Promise {
        let service = Rc::clone(&self.service);
        let bridge = self.bridge.clone();
        future_to_promise(async move { Ok(dispatch(service, bridge, message).await) })
    }

    /// Archive sweep if one is due. Call at startup and from the alarm.
    /// Resolves to the number of items archived.
    pub fn tick(&self) -> Promise {
        let service = Rc::clone(&self.service);
        let bridge = self.bridge.clone();
        future_to_promise(async move {
            let mut archived: Vec<String> = Vec::new();
            {
                let mut observer = |ids: &[String]| archived.extend_from_slice(ids);
                service.borrow_mut().tick(now(), &mut observer);
            }
            if !archived.is_empty() {
                persist(&service, &bridge).await?;
                notify_changed(&bridge);
            }
            Ok(JsValue::from(archived.len() as u32))
        })
    }

    #[wasm_bindgen(js_name = settingsJson)]
    pub fn settings_json(&self) -> Result<String, JsValue> {
        Ok(self.service.borrow().settings().to_json()?)
    }

    /// Apply a partial settings update; rehashes and persists the stash if
    /// the normalization policy changed
    #[wasm_bindgen(js_name = setSettings)]
    pub fn set_settings(&self, patch_json: String) -> Promise {
        let service = Rc::clone(&self.service);
        let bridge = self.bridge.clone();
        future_to_promise(async move {
            let patch = SettingsPatch::from_json(&patch_json)?;
            let rehashed = service.borrow_mut().patch_settings(&patch)?;
            if rehashed.is_some() {
                persist(&service, &bridge).await?;
                notify_changed(&bridge);
            }
            Ok(JsValue::from(rehashed.is_some()))
        })
    }
}

fn now() -> Timestamp {
    js_sys::Date::now() as Timestamp
}

async fn dispatch(service: Rc<RefCell<StashService>>, bridge: Object, message: JsValue) -> JsValue {
    let request: Request = match serde_wasm_bindgen::from_value(message) {
        Ok(request) => request,
        Err(err) => return to_js(&Reply::failure(&StashError::InvalidMessage(err.to_string()))),
    };

    let mut host = if request.needs_tabs() {
        match snapshot_tabs(&bridge).await {
            Ok(snapshot) => RecordingTabHost::new(
                snapshot.tabs,
                snapshot.current_window_id,
                snapshot.active_tab_id,
            ),
            Err(err) => return to_js(&Reply::failure(&err)),
        }
    } else {
        RecordingTabHost::default()
    };

    // The request runs to completion before anything else is awaited
    let outcome = service.borrow_mut().handle(request, &mut host, now());

    // Tabs are only touched once the stash holding them is saved
    if outcome.changed {
        if let Err(err) = persist(&service, &bridge).await {
            warn!("Dropping {} tab commands, save failed", host.commands().len());
            return to_js(&Reply::failure(&err));
        }
        notify_changed(&bridge);
    }

    let mut reply = outcome.reply;
    for command in host.take_commands() {
        let closing = matches!(command, TabCommand::Close(_));
        if let Err(err) = run_command(&bridge, command).await {
            warn!("Tab command failed: {:?}", err);
            if closing {
                reply.clear_closed();
            } else {
                reply = Reply::failure(&StashError::TabHost(format!("{:?}", err)));
            }
        }
    }
    to_js(&reply)
}

fn to_js<T: Serialize>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or_else(|err| JsValue::from_str(&err.to_string()))
}

async fn snapshot_tabs(bridge: &Object) -> Result<TabSnapshot, StashError> {
    let value = call(bridge, "snapshotTabs", &[])
        .await
        .map_err(|err| StashError::TabHost(format!("{:?}", err)))?;
    serde_wasm_bindgen::from_value(value).map_err(|err| StashError::TabHost(err.to_string()))
}

async fn run_command(bridge: &Object, command: TabCommand) -> Result<JsValue, JsValue> {
    match command {
        TabCommand::Close(ids) => {
            let ids: Array = ids.into_iter().map(JsValue::from).collect();
            call(bridge, "closeTabs", &[ids.into()]).await
        }
        TabCommand::Create(url) => call(bridge, "createTab", &[JsValue::from_str(&url)]).await,
        TabCommand::Focus { tab_id, window_id } => {
            let window = window_id.map(JsValue::from).unwrap_or(JsValue::UNDEFINED);
            call(bridge, "focusTab", &[JsValue::from(tab_id), window]).await
        }
    }
}

async fn persist(service: &Rc<RefCell<StashService>>, bridge: &Object) -> Result<(), StashError> {
    let json = service.borrow().store().to_json()?;
    call(bridge, "persist", &[JsValue::from_str(&json)])
        .await
        .map(|_| ())
        .map_err(|err| StashError::Storage(format!("{:?}", err)))
}

fn notify_changed(bridge: &Object) {
    if let Ok(notify) = bridge_fn(bridge, "notifyChanged") {
        if let Err(err) = notify.call0(bridge) {
            warn!("notifyChanged failed: {:?}", err);
        }
    }
}

fn bridge_fn(bridge: &Object, name: &str) -> Result<Function, JsValue> {
    Reflect::get(bridge, &JsValue::from_str(name))?
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("bridge.{} is not a function", name)))
}

/// Call a bridge method and await its result whether or not it returns a Promise
async fn call(bridge: &Object, name: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let function = bridge_fn(bridge, name)?;
    let args: Array = args.iter().cloned().collect();
    let result = function.apply(bridge, &args)?;
    JsFuture::from(Promise::resolve(&result)).await
}
