/// Import of the dashboard's CSV export
///
/// Columns are located by header name (`title`, `url`, `status`, `tags`,
/// `createdAt`) in any order and case. Rows without a url are skipped.
use chrono::{DateTime, NaiveDate};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;

use crate::error::StashError;
use crate::item::{IncomingItem, Timestamp, merge_tags};

#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    url: Option<usize>,
    title: Option<usize>,
    status: Option<usize>,
    tags: Option<usize>,
    created_at: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Columns {
        let find = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
        Columns {
            url: find("url"),
            title: find("title"),
            status: find("status"),
            tags: find("tags"),
            created_at: find("createdat"),
        }
    }
}

fn field(record: &StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|i| record.get(i))
        .filter(|value| !value.is_empty())
}

/// Tags are separated by whitespace or commas
fn parse_tags(value: &str) -> Vec<String> {
    let parts: Vec<String> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(str::to_string)
        .collect();
    let mut tags = Vec::new();
    merge_tags(&mut tags, &parts);
    tags
}

/// Epoch milliseconds, RFC 3339 (what the export writes) or a bare date at
/// UTC midnight
fn parse_timestamp(value: &str) -> Option<Timestamp> {
    if let Ok(millis) = value.parse::<i64>() {
        return Some(millis);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp_millis())
}

/// Parse CSV text into rows for the import path. Unknown statuses and
/// unreadable dates are dropped from their row, not the whole file.
pub fn parse_csv(text: &str) -> Result<Vec<IncomingItem>, StashError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let columns = Columns::from_header(
        reader
            .headers()
            .map_err(|e| StashError::InvalidMessage(e.to_string()))?,
    );
    if columns.url.is_none() {
        debug!("CSV has no url column");
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StashError::InvalidMessage(e.to_string()))?;
        let Some(url) = field(&record, columns.url) else {
            continue;
        };
        rows.push(IncomingItem {
            url: url.to_string(),
            title: field(&record, columns.title).map(str::to_string),
            status: field(&record, columns.status).and_then(|s| s.parse().ok()),
            tags: field(&record, columns.tags).map(parse_tags).unwrap_or_default(),
            created_at: field(&record, columns.created_at).and_then(parse_timestamp),
            ..IncomingItem::default()
        });
    }
    debug!("Parsed {} CSV rows", rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_export_format() {
        let text = "title,url,status,tags,createdAt\n\
                    \"Rust Book\",\"https://doc.rust-lang.org/book\",\"read\",\"rust docs\",\"2023-11-14T22:13:20.000Z\"\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(
            rows,
            vec![IncomingItem {
                url: "https://doc.rust-lang.org/book".to_string(),
                title: Some("Rust Book".to_string()),
                status: Some(ItemStatus::Read),
                tags: vec!["rust".to_string(), "docs".to_string()],
                created_at: Some(1_700_000_000_000),
                ..IncomingItem::default()
            }]
        );
    }

    #[test]
    fn test_quoted_commas() {
        let text = "url,title\n\"https://a.com/?q=1,2\",\"Hello, world\"\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://a.com/?q=1,2");
        assert_eq!(rows[0].title.as_deref(), Some("Hello, world"));
    }

    #[test]
    fn test_escaped_quotes() {
        let text = "url,title\nhttps://a.com,\"She said \"\"hi\"\"\"\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows[0].title.as_deref(), Some("She said \"hi\""));
    }

    #[test]
    fn test_quoted_newline() {
        let text = "url,title\r\nhttps://a.com,\"two\nlines\"\r\nhttps://b.com,B\r\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title.as_deref(), Some("two\nlines"));
        assert_eq!(rows[1].url, "https://b.com");
    }

    #[test]
    fn test_header_order_and_case() {
        let text = "Tags,URL,CreatedAt\n\"a, b a\",https://a.com,2024-01-02\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows[0].tags, vec!["a", "b"]);
        assert_eq!(rows[0].created_at, Some(1_704_153_600_000));
        assert_eq!(rows[0].title, None);
    }

    #[test]
    fn test_skips_rows_without_url() {
        let text = "title,url\nNo link,\n\nOnly title\nLinked,https://a.com\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title.as_deref(), Some("Linked"));
    }

    #[test]
    fn test_bad_cells_are_dropped() {
        let text = "url,status,createdAt\nhttps://a.com,someday,yesterday\nhttps://b.com,stashed,1700000000000\n";
        let rows = parse_csv(text).unwrap();

        assert_eq!(rows[0].status, None);
        assert_eq!(rows[0].created_at, None);
        assert_eq!(rows[1].status, Some(ItemStatus::ToRead));
        assert_eq!(rows[1].created_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_missing_url_column() {
        assert!(parse_csv("title,tags\nA,x\n").unwrap().is_empty());
        assert!(parse_csv("").unwrap().is_empty());
    }
}
