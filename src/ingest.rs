//! Incremental timeline sync.
//!
//! The walk starts at the newest upstream item and pages backward in id
//! (`max_id = lowest id seen - 1`) until upstream returns an empty page,
//! never going at or below the newest archived id (`since_id`). Nothing is
//! written until the whole walk succeeds; a failed or timed-out run leaves
//! the store untouched and the next run starts from the same high-water mark.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{AccountConfig, Config};
use crate::error::{ArchiveError, Result};
use crate::model::{Record, SourceItem, parse_source_time};
use crate::persist::persist;
use crate::predicate::accepts;
use crate::storage::ArchiveStore;
use crate::upstream::{Deadline, TimelineRequest, Upstream};

/// Build an archive record from an accepted upstream item.
#[must_use]
pub fn to_record(item: &SourceItem, account: &AccountConfig, now: DateTime<Utc>) -> Record {
    let id_str = item.id_string();
    let mut record = Record {
        id: item.id,
        url: account.status_url(&id_str),
        id_str,
        created: parse_source_time(&item.created_at),
        updated: now,
        favorites: 0,
        retweets: 0,
        ratio: 0.0,
        text: item.full_text.clone(),
        deleted: false,
        media: item.media(),
    };
    record.set_engagement(item.favorite_count, item.retweet_count);
    record
}

/// Walks the upstream timeline for items newer than the archive.
pub struct Ingestor<'a, U: Upstream + ?Sized> {
    upstream: &'a U,
    account: &'a AccountConfig,
    deadline: Deadline,
}

impl<'a, U: Upstream + ?Sized> Ingestor<'a, U> {
    #[must_use]
    pub fn new(upstream: &'a U, config: &'a Config) -> Self {
        Self {
            upstream,
            account: &config.account,
            deadline: Deadline::new("sync", config.upstream.deadline_secs),
        }
    }

    /// Fetch every accepted item with an id above `last_archived_id`.
    ///
    /// # Errors
    ///
    /// Returns the first page-fetch error, [`ArchiveError::DeadlineExceeded`]
    /// when the run's budget is spent, or a protocol error if upstream stops
    /// moving the cursor backward.
    pub fn fetch_new(&self, last_archived_id: i64) -> Result<Vec<Record>> {
        let since_id = (last_archived_id > 0).then_some(last_archived_id);
        let now = Utc::now();

        let mut records = Vec::new();
        let mut max_id: Option<i64> = None;
        let mut pages = 0_usize;

        loop {
            self.deadline.check()?;

            let request = TimelineRequest {
                since_id,
                max_id,
                ..TimelineRequest::new(self.account.handle.clone())
            };
            let page = self.upstream.user_timeline(&request)?;
            pages += 1;

            if page.is_empty() {
                break;
            }

            let Some(page_min) = page.iter().map(|item| item.id).filter(|&id| id > 0).min() else {
                return Err(ArchiveError::upstream_protocol(
                    "statuses/user_timeline",
                    "page contained no usable ids",
                ));
            };

            let next_max = page_min - 1;
            if max_id.is_some_and(|current| next_max >= current) {
                return Err(ArchiveError::upstream_protocol(
                    "statuses/user_timeline",
                    format!("cursor did not advance past {next_max}"),
                ));
            }

            let before = records.len();
            records.extend(
                page.iter()
                    .filter(|item| accepts(item))
                    .map(|item| to_record(item, self.account, now)),
            );
            debug!(
                page = pages,
                fetched = page.len(),
                accepted = records.len() - before,
                next_max,
                "Fetched timeline page"
            );

            max_id = Some(next_max);
        }

        info!(pages, new_records = records.len(), "Timeline walk finished");
        Ok(records)
    }
}

/// Fetch new items and persist them.
///
/// # Errors
///
/// Returns any fetch error (nothing persisted) or the first persistence
/// error (earlier chunks stay committed).
pub fn sync<S, U>(store: &mut S, upstream: &U, config: &Config) -> Result<Vec<Record>>
where
    S: ArchiveStore + ?Sized,
    U: Upstream + ?Sized,
{
    let last_archived_id = store.latest_record()?.map_or(0, |r| r.id);
    debug!(last_archived_id, "Starting sync");

    let records = Ingestor::new(upstream, config).fetch_new(last_archived_id)?;
    persist(store, &records)?;
    Ok(records)
}
