//! The single record written to Notion per successful upload.
//!
//! [`Record`] is the flat domain shape; [`Record::to_properties`] renders it
//! into the Notion page-properties JSON for the target database.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Title given to every new entry. Not derived from the content.
pub const ENTRY_TITLE: &str = "New Entry";

pub const TITLE_PROPERTY: &str = "Name";
pub const CONTENT_PROPERTY: &str = "Content";
pub const DATE_PROPERTY: &str = "Date of Entry";

/// Notion rejects rich-text objects longer than this many characters.
pub const RICH_TEXT_LIMIT: usize = 2000;

/// One entry: constant title, full OCR text, capture date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub name: String,
    pub content: String,
    pub date: DateRange,
}

/// Date property with only a start bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: Option<String>,
}

impl Record {
    /// Build the record for `text` captured at `captured_at`.
    pub fn build(text: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            name: ENTRY_TITLE.to_string(),
            content: text.to_string(),
            date: DateRange {
                start: captured_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                end: None,
            },
        }
    }

    /// Render as the `properties` object of a Notion create-page request.
    pub fn to_properties(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            TITLE_PROPERTY.to_string(),
            json!({"title": rich_text(&self.name)}),
        );
        properties.insert(
            CONTENT_PROPERTY.to_string(),
            json!({"rich_text": rich_text(&self.content)}),
        );
        properties.insert(
            DATE_PROPERTY.to_string(),
            json!({"date": {"start": self.date.start, "end": self.date.end}}),
        );
        Value::Object(properties)
    }
}

/// Split text into consecutive rich-text objects within Notion's per-object limit.
fn rich_text(text: &str) -> Vec<Value> {
    chunk_chars(text, RICH_TEXT_LIMIT)
        .into_iter()
        .map(|chunk| json!({"text": {"content": chunk}}))
        .collect()
}

/// Split on char boundaries; an empty string yields one empty chunk.
fn chunk_chars(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == limit {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}
