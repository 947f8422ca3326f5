/// Parsing for OneTab's "Export URLs" text format
///
/// Each line is either `https://example.com | Page Title` or a bare URL.
/// Blank lines and anything that is not http(s) are ignored.
use crate::item::{IncomingItem, ItemStatus, Timestamp};

pub const ONETAB_TAG: &str = "imported-from-onetab";

const TITLE_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTabLine {
    pub url: String,
    pub title: Option<String>,
}

/// One import batch. OneTab's flat export carries no session boundaries,
/// so every paste becomes a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTabGroup {
    pub name: String,
    pub created_at: Timestamp,
    pub tabs: Vec<OneTabLine>,
}

pub fn parse_line(line: &str) -> Option<OneTabLine> {
    let trimmed = line.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return None;
    }

    match trimmed.split_once(TITLE_SEPARATOR) {
        Some((url, title)) => {
            let title = title.trim();
            Some(OneTabLine {
                url: url.trim().to_string(),
                title: (!title.is_empty()).then(|| title.to_string()),
            })
        }
        None => Some(OneTabLine {
            url: trimmed.to_string(),
            title: None,
        }),
    }
}

/// Parse an export into its single group, or `None` if no URLs were found
pub fn parse_export(text: &str, now: Timestamp) -> Option<OneTabGroup> {
    let tabs: Vec<OneTabLine> = text.lines().filter_map(parse_line).collect();
    if tabs.is_empty() {
        return None;
    }
    Some(OneTabGroup {
        name: format!("Import #{}", now),
        created_at: now,
        tabs,
    })
}

/// Rows ready for the import path, tagged and grouped
pub fn to_incoming(group: &OneTabGroup) -> Vec<IncomingItem> {
    group
        .tabs
        .iter()
        .map(|tab| IncomingItem {
            url: tab.url.clone(),
            title: tab.title.clone(),
            status: Some(ItemStatus::ToRead),
            tags: vec![ONETAB_TAG.to_string()],
            group: Some(group.name.clone()),
            group_created_at: Some(group.created_at),
            ..IncomingItem::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_line_with_title() {
        assert_eq!(
            parse_line("  https://a.com/x | A | B  "),
            Some(OneTabLine {
                url: "https://a.com/x".to_string(),
                title: Some("A | B".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_line_bare_url() {
        assert_eq!(
            parse_line("http://a.com"),
            Some(OneTabLine {
                url: "http://a.com".to_string(),
                title: None,
            })
        );
    }

    #[test]
    fn test_parse_line_rejects_non_http() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("chrome://newtab | New Tab"), None);
        assert_eq!(parse_line("just some text"), None);
    }

    #[test]
    fn test_parse_export() {
        let text = "https://a.com | A\r\n\r\nnoise\nhttps://b.com\n";
        let group = parse_export(text, 42).unwrap();

        assert_eq!(group.name, "Import #42");
        assert_eq!(group.created_at, 42);
        assert_eq!(group.tabs.len(), 2);
        assert_eq!(group.tabs[0].title.as_deref(), Some("A"));
        assert_eq!(group.tabs[1].url, "https://b.com");
    }

    #[test]
    fn test_parse_export_empty() {
        assert_eq!(parse_export("\n\nnothing here\n", 1), None);
    }

    #[test]
    fn test_to_incoming() {
        let group = parse_export("https://a.com | A", 7).unwrap();
        let rows = to_incoming(&group);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tags, vec![ONETAB_TAG]);
        assert_eq!(rows[0].status, Some(ItemStatus::ToRead));
        assert_eq!(rows[0].group.as_deref(), Some("Import #7"));
        assert_eq!(rows[0].group_created_at, Some(7));
    }
}
