//! Acceptance rule for archival.
//!
//! The archive keeps standalone posts only: conversational replies (any
//! user mention) and link posts (any url entity) are excluded.

use crate::model::SourceItem;

/// Whether an upstream item qualifies for the archive.
#[must_use]
pub fn accepts(item: &SourceItem) -> bool {
    item.id != 0 && item.entities.user_mentions.is_empty() && item.entities.urls.is_empty()
}
