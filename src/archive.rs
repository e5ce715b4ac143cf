//! The archive service.
//!
//! [`Archive`] owns the store, the upstream client and the cache, and holds
//! the configuration object that every component receives explicitly.
//! Scheduled operations (sync, reconcile, import, profile refresh) are
//! wrapped in an [`OperationGuard`] so their outcome lands in the log.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::{Cache, profile_key};
use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::import::{ImportReport, read_tweets_js, seed_records};
use crate::ingest;
use crate::logging::OperationGuard;
use crate::model::{ArchiveStats, Profile, Record};
use crate::persist::persist;
use crate::profile::build_profile;
use crate::query::Query;
use crate::ranking::{ListKind, PAGE_SIZE, SortKey, page_offset, page_slice};
use crate::reconcile::{self, ReconcileReport, Reconciler};
use crate::storage::{ArchiveStore, RecordQuery};
use crate::upstream::Upstream;

/// Timeline archive over a store and an upstream.
pub struct Archive<S, U> {
    store: S,
    upstream: U,
    cache: Box<dyn Cache>,
    config: Config,
}

impl<S: ArchiveStore, U: Upstream> Archive<S, U> {
    #[must_use]
    pub fn new(store: S, upstream: U, cache: Box<dyn Cache>, config: Config) -> Self {
        Self {
            store,
            upstream,
            cache,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Pull new timeline items and store them.
    ///
    /// # Errors
    ///
    /// Returns a configuration, upstream, deadline or store error.
    pub fn sync(&mut self) -> Result<Vec<Record>> {
        self.config.validate()?;
        let guard = OperationGuard::new("sync");
        let result = ingest::sync(&mut self.store, &self.upstream, &self.config);
        guard.finish(result, Vec::len)
    }

    /// Re-verify every non-deleted record against upstream.
    ///
    /// # Errors
    ///
    /// Returns an upstream, deadline or store error.
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        let guard = OperationGuard::new("reconcile");
        let result = reconcile::reconcile(&mut self.store, &self.upstream, &self.config);
        guard.finish(result, ReconcileReport::written)
    }

    /// One page of records matching `query`, in `order`.
    ///
    /// Short or unparseable queries produce an empty page.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn search(&self, query: &str, order: SortKey, page: usize) -> Result<Vec<Record>> {
        let parsed = Query::parse(query);
        if parsed.is_empty() {
            debug!(query, "Query has no usable terms");
            return Ok(Vec::new());
        }

        let candidates = self.store.query_records(&RecordQuery::active(vec![order]))?;
        let total = candidates.len();
        let matched = parsed.filter(candidates);
        debug!(
            terms = parsed.term_count(),
            candidates = total,
            matched = matched.len(),
            "Search filtered"
        );
        Ok(page_slice(matched, page))
    }

    /// One page of the "best" or "latest" listing.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn list(&self, kind: ListKind, page: usize) -> Result<Vec<Record>> {
        self.store
            .query_records(&RecordQuery::active(kind.sort_keys()).window(PAGE_SIZE, page_offset(page)))
    }

    /// A single record, deleted or not.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] for unknown ids.
    pub fn record(&self, id: i64) -> Result<Record> {
        self.store
            .get_record(id)?
            .ok_or_else(|| ArchiveError::not_found("Record", id.to_string()))
    }

    /// Flip the deleted flag on one record, returning the new state.
    ///
    /// Reconciliation may set the flag again later if the record is still
    /// missing upstream.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] for unknown ids.
    pub fn toggle_deleted(&mut self, id: i64) -> Result<bool> {
        let record = self.record(id)?;
        let deleted = !record.deleted;
        self.store.set_deleted(id, deleted)?;
        info!(id, deleted, "Toggled deleted flag");
        Ok(deleted)
    }

    /// The account profile: cache, then store, then upstream.
    ///
    /// # Errors
    ///
    /// Returns an error only when the profile has to be fetched and that fails.
    pub fn profile(&mut self) -> Result<Profile> {
        let key = profile_key(&self.config.account.handle);
        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_str(&cached) {
                Ok(profile) => return Ok(profile),
                Err(e) => {
                    warn!("Discarding unreadable cached profile: {}", e);
                    self.cache.remove(&key);
                }
            }
        }

        if let Some(profile) = self.store.get_profile(&self.config.account.handle)? {
            self.cache_profile(&profile);
            return Ok(profile);
        }

        self.refresh_profile()
    }

    /// Fetch the profile upstream, store it and cache it.
    ///
    /// # Errors
    ///
    /// Returns a configuration, upstream or store error.
    pub fn refresh_profile(&mut self) -> Result<Profile> {
        self.config.validate()?;
        let guard = OperationGuard::new("profile");
        let result = self
            .upstream
            .fetch_profile(&self.config.account.handle)
            .map(|user| build_profile(&user, &self.config.account, Utc::now()))
            .and_then(|profile| {
                self.store.put_profile(&profile)?;
                Ok(profile)
            });
        let profile = guard.finish(result, |_| 1)?;
        self.cache_profile(&profile);
        Ok(profile)
    }

    fn cache_profile(&self, profile: &Profile) {
        match serde_json::to_string(profile) {
            Ok(json) => self
                .cache
                .set(&profile_key(&self.config.account.handle), json),
            Err(e) => warn!("Failed to cache profile: {}", e),
        }
    }

    /// Seed records from a data export.
    ///
    /// Items already in the archive are skipped, so a repeated import never
    /// clears a deletion flag or resets refreshed counts. Online, the new
    /// seeds go through the reconciliation check first, which refreshes
    /// counts and marks items already gone upstream as deleted.
    ///
    /// # Errors
    ///
    /// Returns a parse, configuration, upstream or store error.
    pub fn import(&mut self, path: &Path, offline: bool) -> Result<ImportReport> {
        self.config.validate()?;
        let guard = OperationGuard::new("import");
        let result = self.import_inner(path, offline);
        guard.finish(result, |report| report.stored)
    }

    fn import_inner(&mut self, path: &Path, offline: bool) -> Result<ImportReport> {
        let items = read_tweets_js(path)?;
        let (seeds, mut report) = seed_records(&items, &self.config.account, Utc::now());

        let mut fresh = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if self.store.get_record(seed.id)?.is_some() {
                report.existing += 1;
            } else {
                fresh.push(seed);
            }
        }
        if report.existing > 0 {
            debug!(existing = report.existing, "Skipping already archived items");
        }

        let records = if offline {
            fresh
        } else {
            let (checked, check) =
                Reconciler::new(&self.upstream, &self.config).check_records(fresh)?;
            info!(
                refreshed = check.refreshed,
                deleted = check.deleted,
                dropped = check.dropped,
                "Checked imported records"
            );
            checked
        };

        report.stored = persist(&mut self.store, &records)?;
        Ok(report)
    }

    /// Aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn stats(&self) -> Result<ArchiveStats> {
        self.store.stats()
    }
}
