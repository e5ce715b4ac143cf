//! Ordering and paging of record sets.
//!
//! Three views exist: "best" (engagement, three keys in strict precedence),
//! "latest" (id descending, which is also recency since ids are issued in
//! increasing order upstream) and "search" (any [`SortKey`], paged over the
//! filtered in-memory list).
//!
//! Pages are 1-indexed everywhere. Page `p` holds items
//! `(p - 1) * PAGE_SIZE + 1 ..= p * PAGE_SIZE`; page 0 is treated as page 1.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Records per page for every view.
pub const PAGE_SIZE: usize = 30;

/// A sortable record column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Created,
    Updated,
    Favorites,
    Retweets,
    Ratio,
}

impl SortField {
    /// Name as accepted on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Favorites => "favorites",
            Self::Retweets => "retweets",
            Self::Ratio => "ratio",
        }
    }

    /// Store column backing this field.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Created => "created_ms",
            Self::Updated => "updated_ms",
            Self::Favorites => "favorites",
            Self::Retweets => "retweets",
            Self::Ratio => "ratio",
        }
    }
}

impl FromStr for SortField {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "favorites" | "faves" => Ok(Self::Favorites),
            "retweets" | "rts" => Ok(Self::Retweets),
            "ratio" => Ok(Self::Ratio),
            other => Err(ArchiveError::invalid_argument(format!(
                "unknown sort field '{other}'"
            ))),
        }
    }
}

/// One ordering dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    #[must_use]
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    #[must_use]
    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::desc(SortField::Favorites)
    }
}

/// `[-]field`, a leading '-' meaning descending.
impl FromStr for SortKey {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        s.strip_prefix('-').map_or_else(
            || s.parse().map(Self::asc),
            |field| field.parse().map(Self::desc),
        )
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field.as_str())
        } else {
            f.write_str(self.field.as_str())
        }
    }
}

/// A store-paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Best,
    Latest,
}

impl ListKind {
    /// Ordering keys, in precedence order.
    #[must_use]
    pub fn sort_keys(self) -> Vec<SortKey> {
        match self {
            Self::Best => vec![
                SortKey::desc(SortField::Favorites),
                SortKey::desc(SortField::Retweets),
                SortKey::desc(SortField::Ratio),
            ],
            Self::Latest => vec![SortKey::desc(SortField::Id)],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Latest => "latest",
        }
    }
}

impl FromStr for ListKind {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "latest" => Ok(Self::Latest),
            other => Err(ArchiveError::invalid_argument(format!(
                "unknown list kind '{other}'"
            ))),
        }
    }
}

/// Number of records preceding `page`.
#[must_use]
pub const fn page_offset(page: usize) -> usize {
    page.saturating_sub(1).saturating_mul(PAGE_SIZE)
}

/// Slice one page out of an already ordered, already filtered list.
#[must_use]
pub fn page_slice<T>(mut items: Vec<T>, page: usize) -> Vec<T> {
    let start = page_offset(page);
    if start >= items.len() {
        return Vec::new();
    }
    let end = (start + PAGE_SIZE).min(items.len());
    items.truncate(end);
    items.drain(..start);
    items
}
