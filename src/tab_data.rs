/// Browser tab data as seen by the stash
use serde::{Deserialize, Serialize};

use crate::item::ItemStatus;

/// Information about a browser tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSummary {
    pub id: i32,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i32>,
}

impl TabSummary {
    pub fn new(id: i32, url: String, title: Option<String>) -> TabSummary {
        TabSummary {
            id,
            url,
            title,
            fav_icon_url: None,
            pinned: false,
            index: 0,
            window_id: None,
            group_id: None,
        }
    }
}

/// A tab annotated with whether the stash already holds its URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabWithStatus {
    #[serde(flatten)]
    pub tab: TabSummary,
    /// Empty for tabs that cannot be stashed
    pub content_hash: String,
    /// An item exists for this URL and is not trashed
    pub stashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_status: Option<ItemStatus>,
    pub stashable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_summary_creation() {
        let tab = TabSummary::new(1, "https://google.com".to_string(), Some("Google".to_string()));

        assert_eq!(tab.id, 1);
        assert_eq!(tab.url, "https://google.com");
        assert_eq!(tab.title.as_deref(), Some("Google"));
        assert!(!tab.pinned);
        assert_eq!(tab.index, 0);
    }

    #[test]
    fn test_deserialize_from_chrome_shape() {
        let json = r#"{"id": 7, "url": "https://a.com", "favIconUrl": "https://a.com/f.ico",
                       "pinned": true, "windowId": 3, "active": true}"#;
        let tab: TabSummary = serde_json::from_str(json).unwrap();

        assert_eq!(tab.id, 7);
        assert!(tab.pinned);
        assert_eq!(tab.window_id, Some(3));
        assert_eq!(tab.fav_icon_url.as_deref(), Some("https://a.com/f.ico"));
    }

    #[test]
    fn test_status_serialization_is_flat() {
        let status = TabWithStatus {
            tab: TabSummary::new(1, "https://a.com".to_string(), None),
            content_hash: "abc".to_string(),
            stashed: true,
            item_id: Some("item-1".to_string()),
            item_status: Some(ItemStatus::Read),
            stashable: true,
        };

        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["contentHash"], "abc");
        assert_eq!(value["itemStatus"], "read");
    }
}
