//! Seeding the archive from a data export.
//!
//! Exports wrap JSON in a JavaScript assignment:
//! `window.YTD.tweets.part0 = [{"tweet": {...}}, ...]`. Counts are strings
//! and replies/reposts are mixed in; both are skipped, as is anything the
//! acceptance rule rejects.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::AccountConfig;
use crate::error::{ArchiveError, Result};
use crate::ingest::to_record;
use crate::model::{Record, SourceEntities, SourceItem};
use crate::predicate::accepts;

/// One item from the export, with the flags the archive filters on.
#[derive(Debug, Clone)]
pub struct ExportItem {
    pub item: SourceItem,
    pub is_retweet: bool,
    pub is_reply: bool,
}

/// Counts from one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Items read from the export.
    pub parsed: usize,
    /// Replies, reposts and rejected items.
    pub skipped: usize,
    /// Records seeded from the export.
    pub seeded: usize,
    /// Seeds whose id is already archived; those records are left untouched.
    pub existing: usize,
    /// Records written after checking.
    pub stored: usize,
}

/// Resolve an export directory or file to the `tweets.js` to read.
#[must_use]
pub fn resolve_tweets_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        let nested = path.join("data").join("tweets.js");
        if nested.exists() {
            return nested;
        }
        return path.join("tweets.js");
    }
    path.to_path_buf()
}

/// Read and parse a `tweets.js` file (or an export directory containing one).
///
/// # Errors
///
/// Returns an error if the file is missing or is not a wrapped JSON array.
pub fn read_tweets_js(path: &Path) -> Result<Vec<ExportItem>> {
    let file = resolve_tweets_file(path);
    let content = std::fs::read_to_string(&file)
        .map_err(|e| ArchiveError::path_error("read", &file, e))?;
    parse_tweets_js(&content, &file.display().to_string())
}

/// Parse the content of a `tweets.js` file.
///
/// # Errors
///
/// Returns [`ArchiveError::ParseError`] when the JSON payload is malformed.
pub fn parse_tweets_js(content: &str, source: &str) -> Result<Vec<ExportItem>> {
    let json = strip_assignment(content);
    let data: Value = serde_json::from_str(json)
        .map_err(|e| ArchiveError::parse_error(source, e.to_string()))?;

    let Some(entries) = data.as_array() else {
        return Err(ArchiveError::parse_error(source, "expected a JSON array"));
    };

    let items: Vec<ExportItem> = entries
        .iter()
        .filter_map(|entry| parse_entry(entry.get("tweet").unwrap_or(entry)))
        .collect();
    debug!(source, entries = entries.len(), parsed = items.len(), "Parsed export");
    Ok(items)
}

/// Drop a leading `window.YTD.<type>.partN =` if present.
fn strip_assignment(content: &str) -> &str {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed;
    }
    trimmed
        .find('=')
        .map_or(trimmed, |pos| trimmed[pos + 1..].trim())
        .trim_end_matches(';')
}

fn count(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(0)
}

fn entities(value: &Value) -> SourceEntities {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn parse_entry(tweet: &Value) -> Option<ExportItem> {
    let id_str = tweet["id_str"]
        .as_str()
        .map(String::from)
        .or_else(|| tweet["id"].as_str().map(String::from))?;
    let id: i64 = id_str.parse().ok()?;

    let full_text = tweet["full_text"]
        .as_str()
        .or_else(|| tweet["text"].as_str())
        .unwrap_or_default()
        .to_string();

    let is_retweet = tweet["retweeted"].as_bool().unwrap_or(false)
        || tweet.get("retweeted_status").is_some()
        || full_text.starts_with("RT @");
    let is_reply = tweet["in_reply_to_status_id_str"]
        .as_str()
        .is_some_and(|s| !s.is_empty())
        || tweet["in_reply_to_status_id"].as_str().is_some_and(|s| !s.is_empty());

    let extended = tweet.get("extended_entities").map(entities);

    Some(ExportItem {
        item: SourceItem {
            id,
            id_str,
            created_at: tweet["created_at"].as_str().unwrap_or_default().to_string(),
            full_text,
            favorite_count: count(&tweet["favorite_count"]),
            retweet_count: count(&tweet["retweet_count"]),
            entities: entities(&tweet["entities"]),
            extended_entities: extended,
        },
        is_retweet,
        is_reply,
    })
}

/// Turn export items into records, skipping replies, reposts and rejects.
#[must_use]
pub fn seed_records(
    items: &[ExportItem],
    account: &AccountConfig,
    now: DateTime<Utc>,
) -> (Vec<Record>, ImportReport) {
    let mut report = ImportReport {
        parsed: items.len(),
        ..ImportReport::default()
    };

    let records: Vec<Record> = items
        .iter()
        .filter(|e| !e.is_retweet && !e.is_reply && accepts(&e.item))
        .map(|e| to_record(&e.item, account, now))
        .collect();

    report.seeded = records.len();
    report.skipped = report.parsed - report.seeded;
    info!(
        parsed = report.parsed,
        seeded = report.seeded,
        skipped = report.skipped,
        "Seeded records from export"
    );
    (records, report)
}
