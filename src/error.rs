//! Custom error types for tweetkeep.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for archive operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum ArchiveError {
    // =========================================================================
    // Upstream Errors
    // =========================================================================
    /// Upstream answered with a non-success status.
    #[error("Upstream {endpoint} failed with status {status}: {body}")]
    UpstreamStatus {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// Upstream returned something the pipeline cannot make sense of.
    #[error("Upstream {endpoint} returned an unusable response: {reason}")]
    UpstreamProtocol {
        endpoint: &'static str,
        reason: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The run's deadline passed before the next upstream call.
    #[error("{operation} exceeded its deadline of {seconds}s; nothing was persisted")]
    DeadlineExceeded {
        operation: &'static str,
        seconds: u64,
    },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Database schema version mismatch.
    #[error("Database schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    /// A multi-put exceeded the store's batch cap.
    #[error("Batch of {size} records exceeds the store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// Database file not found.
    #[error("No archive database found. Run 'tweetkeep sync' first.\nExpected database at: {path}")]
    DatabaseNotFound { path: PathBuf },

    // =========================================================================
    // Serialization / IO Errors
    // =========================================================================
    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an import file.
    #[error("Failed to parse '{file}': {reason}")]
    ParseError { file: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// A required setting is missing or empty.
    #[error("Missing configuration value '{key}'")]
    MissingConfig { key: &'static str },

    // =========================================================================
    // Lookup / Argument Errors
    // =========================================================================
    /// Data not found.
    #[error("{item_type} with ID '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    /// Invalid argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an upstream status error.
    pub fn upstream_status(endpoint: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamStatus {
            endpoint,
            status,
            body: body.into(),
        }
    }

    /// Create an upstream protocol error.
    pub fn upstream_protocol(endpoint: &'static str, reason: impl Into<String>) -> Self {
        Self::UpstreamProtocol {
            endpoint,
            reason: reason.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Create a not found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the next scheduled run is likely to succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::DeadlineExceeded { .. } => true,
            Self::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            Self::DatabaseError(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UpstreamStatus {
                status: 401 | 403, ..
            } => {
                Some("Check upstream.bearer_token in your config or TWEETKEEP_BEARER_TOKEN.")
            }
            Self::UpstreamStatus { status: 429, .. } => {
                Some("Rate limited upstream. The next scheduled run will pick up from here.")
            }
            Self::DeadlineExceeded { .. } => {
                Some("Raise upstream.deadline_secs or let the next run resume from the stored high-water mark.")
            }
            Self::MissingConfig { .. } => {
                Some("Run 'tweetkeep config --show' to see the effective configuration.")
            }
            Self::DatabaseNotFound { .. } => Some("Run 'tweetkeep sync' to create the archive."),
            Self::SchemaMismatch { .. } => {
                Some("The database was written by a newer tweetkeep. Upgrade the binary.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ArchiveError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ArchiveError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Levenshtein edit distance, used for "did you mean?" suggestions.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate within `max_distance` edits (default 2).
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

/// Format an error for an unknown value with "did you mean?" support.
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();

    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format_did_you_mean(closest));
    }

    if valid_options.len() <= 8 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Valid sort fields for `search --order`.
pub const VALID_ORDER_FIELDS: &[&str] =
    &["id", "created", "updated", "favorites", "retweets", "ratio"];

/// Valid list kinds.
pub const VALID_LIST_KINDS: &[&str] = &["best", "latest"];

/// Valid config keys for `config --set`.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "account.handle",
    "upstream.base_url",
    "upstream.bearer_token",
    "upstream.timeout_secs",
    "upstream.deadline_secs",
    "paths.db",
    "cache.enabled",
    "cache.ttl_secs",
    "output.format",
    "output.colors",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArchiveError::not_found("Record", "42");
        assert_eq!(err.to_string(), "Record with ID '42' not found");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ArchiveError::upstream_status("lookup", 503, "").is_transient());
        assert!(ArchiveError::upstream_status("lookup", 429, "").is_transient());
        assert!(!ArchiveError::upstream_status("lookup", 401, "").is_transient());
        assert!(
            ArchiveError::DeadlineExceeded {
                operation: "sync",
                seconds: 5
            }
            .is_transient()
        );
        assert!(!ArchiveError::invalid_argument("nope").is_transient());
    }

    #[test]
    fn test_error_suggestions() {
        let err = ArchiveError::upstream_status("user_timeline", 401, "unauthorized");
        assert!(err.suggestion().unwrap().contains("bearer_token"));
        assert!(ArchiveError::MissingConfig { key: "account.handle" }
            .suggestion()
            .is_some());
        assert!(ArchiveError::invalid_argument("x").suggestion().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ArchiveError = io_err.into();
        assert!(matches!(err, ArchiveError::IoError(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        fn accepts_archive_error(_: ArchiveError) {}
        accepts_archive_error(rusqlite::Error::InvalidQuery.into());
    }

    #[test]
    fn test_result_ext_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = res.context("reading tweets.js").unwrap_err();
        assert_eq!(err.to_string(), "reading tweets.js: boom");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("best", "bets"), 2);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn find_closest_order_field() {
        assert_eq!(
            find_closest_match("favorite", VALID_ORDER_FIELDS, None),
            Some("favorites")
        );
        assert_eq!(find_closest_match("ltest", VALID_LIST_KINDS, None), Some("latest"));
        assert_eq!(find_closest_match("zzzzzz", VALID_LIST_KINDS, None), None);
    }

    #[test]
    fn format_unknown_value_with_suggestion() {
        let output = format_unknown_value_error("order field", "retweet", VALID_ORDER_FIELDS);
        assert!(output.contains("retweet"));
        assert!(output.contains("retweets"));
    }
}
