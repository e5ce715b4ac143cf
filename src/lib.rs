//! tweetkeep - a durable, searchable archive of one account's timeline
//!
//! The archive is filled incrementally from the upstream timeline API,
//! periodically reconciled against upstream to capture edits and deletions,
//! and queried with a small boolean phrase/term language.
//!
//! # Modules
//!
//! - [`archive`] - Service facade wiring the pipeline together
//! - [`ingest`] - Incremental timeline sync
//! - [`reconcile`] - Batch re-verification of archived records
//! - [`query`] - Free-text query parsing and matching
//! - [`ranking`] - Ordering and paging
//! - [`persist`] - Chunked writes to the store
//! - [`storage`] - `SQLite` storage layer
//! - [`upstream`] - Upstream API client
//! - [`import`] - Data-export import

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod persist;
pub mod predicate;
pub mod profile;
pub mod query;
pub mod ranking;
pub mod reconcile;
pub mod storage;
pub mod upstream;

pub use archive::Archive;
pub use cache::{Cache, MemoryCache, NoopCache};
pub use config::Config;
pub use error::{
    ArchiveError, Result, ResultExt, VALID_CONFIG_KEYS, VALID_LIST_KINDS, VALID_ORDER_FIELDS,
    find_closest_match, format_did_you_mean, format_error, format_unknown_value_error,
};
pub use model::*;
pub use query::{Query, SearchTerm};
pub use ranking::{ListKind, PAGE_SIZE, SortField, SortKey};
pub use reconcile::ReconcileReport;
pub use storage::{ArchiveStore, RecordQuery, Storage};
pub use upstream::{HttpUpstream, TimelineRequest, Upstream};

use chrono::{DateTime, Datelike, Utc};

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "archive.db";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for tweetkeep
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tweetkeep")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format a datetime as a human-friendly relative string.
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_with_base(dt, Utc::now())
}

/// Format a datetime relative to a fixed base time.
#[must_use]
pub fn format_relative_date_with_base(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);

    if duration.num_seconds() < 0 {
        return dt.format("%b %d, %Y").to_string();
    }

    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if dt.year() == now.year() {
        dt.format("%b %d").to_string()
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

/// Format an optional datetime, "never" when absent.
#[must_use]
pub fn format_optional_date(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "never".to_string(), format_relative_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
        assert_eq!(format_number(-12_345), "-12,345");
    }

    #[test]
    fn test_format_relative_date() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).single().unwrap();
        assert_eq!(
            format_relative_date_with_base(now - Duration::seconds(20), now),
            "just now"
        );
        assert_eq!(
            format_relative_date_with_base(now - Duration::minutes(5), now),
            "5m ago"
        );
        assert_eq!(
            format_relative_date_with_base(now - Duration::hours(3), now),
            "3h ago"
        );
        assert_eq!(
            format_relative_date_with_base(now - Duration::days(2), now),
            "2d ago"
        );
        let earlier = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).single().unwrap();
        assert_eq!(format_relative_date_with_base(earlier, now), "Jan 15");
        let last_year = Utc.with_ymd_and_hms(2023, 3, 9, 12, 0, 0).single().unwrap();
        assert_eq!(format_relative_date_with_base(last_year, now), "Mar 09, 2023");
    }

    #[test]
    fn test_format_optional_date() {
        assert_eq!(format_optional_date(None), "never");
    }

    #[test]
    fn test_default_db_path_under_data_dir() {
        let path = default_db_path();
        assert!(path.ends_with("tweetkeep/archive.db"));
    }
}
