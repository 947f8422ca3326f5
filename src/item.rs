/// Stash records and the shapes that feed them
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StashError;
use crate::lifespan::calculate_expires_at;

/// Milliseconds since the Unix epoch, as handed out by `Date.now()`
pub type Timestamp = i64;

/// Lifecycle state of a stashed item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    #[default]
    #[serde(alias = "stashed")]
    ToRead,
    Read,
    Archived,
    Trashed,
}

/// Accepts the wire names plus the legacy `stashed`, in any case
impl FromStr for ItemStatus {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "to-read" | "stashed" => Ok(ItemStatus::ToRead),
            "read" => Ok(ItemStatus::Read),
            "archived" => Ok(ItemStatus::Archived),
            "trashed" => Ok(ItemStatus::Trashed),
            other => Err(StashError::InvalidMessage(format!("unknown status: {}", other))),
        }
    }
}

/// A stashed URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub url: String,
    #[serde(alias = "urlHash")]
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    pub created_at: Timestamp,
    pub last_seen_at: Timestamp,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default = "default_times_added")]
    pub times_added: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifespan_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    #[serde(default)]
    pub auto_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_created_at: Option<Timestamp>,
}

fn default_times_added() -> u32 {
    1
}

impl Item {
    /// A fresh `to-read` item with a new id and its expiry already computed
    pub fn new(url: String, content_hash: String, created_at: Timestamp, lifespan_days: u32) -> Item {
        Item {
            id: Uuid::new_v4().to_string(),
            url,
            content_hash,
            title: None,
            favicon: None,
            created_at,
            last_seen_at: created_at,
            status: ItemStatus::ToRead,
            times_added: 1,
            notes: None,
            tags: Vec::new(),
            lifespan_days: Some(lifespan_days),
            expires_at: Some(calculate_expires_at(created_at, lifespan_days)),
            auto_archived: false,
            group: None,
            group_created_at: None,
        }
    }

    /// Case-insensitive substring match over title, url and tags.
    /// `needle` must already be lower-cased.
    pub fn matches(&self, needle: &str) -> bool {
        self.title
            .as_deref()
            .is_some_and(|title| title.to_lowercase().contains(needle))
            || self.url.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(favicon) = &patch.favicon {
            self.favicon = Some(favicon.clone());
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(tags) = &patch.tags {
            self.tags = Vec::new();
            merge_tags(&mut self.tags, tags);
        }
        if let Some(group) = &patch.group {
            self.group = Some(group.clone());
        }
        if let Some(status) = patch.status {
            // A manual status change takes ownership away from the sweeper
            if status != self.status {
                self.auto_archived = false;
            }
            self.status = status;
        }
    }
}

/// Union `incoming` into `tags`, keeping first-seen order and dropping blanks
pub fn merge_tags(tags: &mut Vec<String>, incoming: &[String]) {
    for tag in incoming {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
}

/// Explicit edit from the UI. Identity, hash and timestamps are not editable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub favicon: Option<String>,
    pub status: Option<ItemStatus>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub group: Option<String>,
}

/// One URL arriving from a tab capture or an import row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomingItem {
    pub url: String,
    pub title: Option<String>,
    pub favicon: Option<String>,
    pub status: Option<ItemStatus>,
    pub tags: Vec<String>,
    pub created_at: Option<Timestamp>,
    pub group: Option<String>,
    pub group_created_at: Option<Timestamp>,
}

impl IncomingItem {
    pub fn from_url(url: &str) -> IncomingItem {
        IncomingItem {
            url: url.to_string(),
            ..IncomingItem::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_item_defaults() {
        let item = Item::new("https://a.com".to_string(), "h".to_string(), 1_000, 30);
        assert_eq!(item.status, ItemStatus::ToRead);
        assert_eq!(item.times_added, 1);
        assert_eq!(item.last_seen_at, 1_000);
        assert_eq!(item.expires_at, Some(1_000 + 30 * 86_400_000));
        assert!(!item.auto_archived);
        assert!(Uuid::parse_str(&item.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Item::new("https://a.com".to_string(), "h".to_string(), 0, 30);
        let b = Item::new("https://a.com".to_string(), "h".to_string(), 0, 30);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&ItemStatus::ToRead).unwrap(), "\"to-read\"");
        assert_eq!(serde_json::to_string(&ItemStatus::Trashed).unwrap(), "\"trashed\"");
        let legacy: ItemStatus = serde_json::from_str("\"stashed\"").unwrap();
        assert_eq!(legacy, ItemStatus::ToRead);
        assert_eq!("Stashed".parse::<ItemStatus>().unwrap(), ItemStatus::ToRead);
        assert_eq!(" archived ".parse::<ItemStatus>().unwrap(), ItemStatus::Archived);
        assert!("later".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_legacy_row_deserializes() {
        let json = r#"{
            "id": "old-1",
            "url": "https://a.com",
            "urlHash": "abc",
            "createdAt": 5,
            "lastSeenAt": 6,
            "status": "stashed"
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.content_hash, "abc");
        assert_eq!(item.status, ItemStatus::ToRead);
        assert_eq!(item.times_added, 1);
        assert_eq!(item.expires_at, None);
        assert!(item.tags.is_empty());
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let mut item = Item::new("https://docs.rs/Serde".to_string(), "h".to_string(), 0, 30);
        item.title = Some("Serde Guide".to_string());
        item.tags = vec!["Rust".to_string()];
        assert!(item.matches("guide"));
        assert!(item.matches("docs.rs/serde"));
        assert!(item.matches("rust"));
        assert!(!item.matches("python"));
    }

    #[test]
    fn test_merge_tags_is_a_union() {
        let mut tags = vec!["a".to_string(), "b".to_string()];
        merge_tags(&mut tags, &["b".to_string(), " c ".to_string(), "".to_string()]);
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_apply_patch() {
        let mut item = Item::new("https://a.com".to_string(), "h".to_string(), 0, 30);
        item.status = ItemStatus::Archived;
        item.auto_archived = true;
        item.apply_patch(&ItemPatch {
            status: Some(ItemStatus::Read),
            tags: Some(vec!["x".to_string(), "x".to_string()]),
            notes: Some("later".to_string()),
            ..ItemPatch::default()
        });
        assert_eq!(item.status, ItemStatus::Read);
        assert!(!item.auto_archived);
        assert_eq!(item.tags, vec!["x"]);
        assert_eq!(item.notes.as_deref(), Some("later"));
        assert_eq!(item.title, None);
    }
}
