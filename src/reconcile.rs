//! Re-verification of archived records against upstream.
//!
//! Every non-deleted record gets a turn, oldest `updated` first. Records are
//! looked up in chunks of at most [`MAX_LOOKUP_SIZE`] ids; a record missing
//! from its chunk's response is soft-deleted, a present one has its
//! volatile fields refreshed. Chunks are processed one after another and
//! the results are written only after every chunk succeeded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::model::{Record, SourceItem};
use crate::persist::persist;
use crate::predicate::accepts;
use crate::ranking::{SortField, SortKey};
use crate::storage::{ArchiveStore, RecordQuery};
use crate::upstream::{Deadline, MAX_LOOKUP_SIZE, Upstream};

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records submitted for lookup.
    pub checked: usize,
    /// Records found upstream and refreshed.
    pub refreshed: usize,
    /// Records absent upstream, now soft-deleted.
    pub deleted: usize,
    /// Records whose live copy no longer passes acceptance; left as stored.
    pub dropped: usize,
    /// Batch lookups issued.
    pub lookups: usize,
}

impl ReconcileReport {
    /// Records handed to the persister.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.refreshed + self.deleted
    }
}

/// Checks archived records against upstream in bounded chunks.
pub struct Reconciler<'a, U: Upstream + ?Sized> {
    upstream: &'a U,
    chunk_size: usize,
    deadline: Deadline,
}

impl<'a, U: Upstream + ?Sized> Reconciler<'a, U> {
    #[must_use]
    pub fn new(upstream: &'a U, config: &Config) -> Self {
        Self {
            upstream,
            chunk_size: MAX_LOOKUP_SIZE,
            deadline: Deadline::new("reconcile", config.upstream.deadline_secs),
        }
    }

    /// Use smaller lookup chunks (clamped to the upstream limit).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_LOOKUP_SIZE);
        self
    }

    /// Check `records` in order, returning the records to write back.
    ///
    /// # Errors
    ///
    /// Returns the first lookup error or [`crate::ArchiveError::DeadlineExceeded`];
    /// no partial output is returned.
    pub fn check_records(&self, records: Vec<Record>) -> Result<(Vec<Record>, ReconcileReport)> {
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        let mut out = Vec::with_capacity(records.len());

        let mut pending = records;
        while !pending.is_empty() {
            let split = self.chunk_size.min(pending.len());
            let rest = pending.split_off(split);
            let chunk = std::mem::replace(&mut pending, rest);

            self.deadline.check()?;
            let ids: Vec<i64> = chunk.iter().map(|r| r.id).collect();
            let live: HashMap<i64, SourceItem> = self
                .upstream
                .lookup(&ids)?
                .into_iter()
                .map(|item| (item.id, item))
                .collect();
            report.lookups += 1;
            debug!(
                lookup = report.lookups,
                requested = ids.len(),
                found = live.len(),
                "Looked up chunk"
            );

            for record in chunk {
                report.checked += 1;
                match live.get(&record.id) {
                    None => {
                        info!(id = record.id, "Record deleted upstream");
                        out.push(mark_deleted(record, now));
                        report.deleted += 1;
                    }
                    Some(item) if accepts(item) => {
                        out.push(refresh(record, item, now));
                        report.refreshed += 1;
                    }
                    Some(_) => {
                        debug!(id = record.id, "Live copy no longer acceptable, leaving as stored");
                        report.dropped += 1;
                    }
                }
            }
        }

        Ok((out, report))
    }
}

fn mark_deleted(mut record: Record, now: DateTime<Utc>) -> Record {
    record.deleted = true;
    record.updated = now;
    record
}

fn refresh(mut record: Record, item: &SourceItem, now: DateTime<Utc>) -> Record {
    record.set_engagement(item.favorite_count, item.retweet_count);
    if record.media.is_empty() {
        record.media = item.media();
    }
    if record.text.is_empty() {
        record.text.clone_from(&item.full_text);
    }
    record.updated = now;
    record
}

/// Reconcile every non-deleted record and write the results back.
///
/// # Errors
///
/// Returns the first lookup error (nothing written) or the first
/// persistence error (earlier chunks stay committed).
pub fn reconcile<S, U>(store: &mut S, upstream: &U, config: &Config) -> Result<ReconcileReport>
where
    S: ArchiveStore + ?Sized,
    U: Upstream + ?Sized,
{
    let pending = store.query_records(&RecordQuery::active(vec![SortKey::asc(
        SortField::Updated,
    )]))?;
    info!("Checking {} records", pending.len());

    let (records, report) = Reconciler::new(upstream, config).check_records(pending)?;
    persist(store, &records)?;
    Ok(report)
}
