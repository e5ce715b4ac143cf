//! Integration tests for tweetkeep.
//!
//! These drive the library end to end against a file-backed store and a
//! simulated upstream that honors `since_id` / `max_id` / `count` the way
//! the real timeline endpoint does:
//! - incremental sync and resync
//! - reconciliation chunking and deletion marking
//! - query semantics and paging through the archive facade
//! - export import followed by reconciliation

use std::cell::RefCell;
use std::collections::BTreeMap;

use tempfile::TempDir;
use tweetkeep::{
    Archive, ArchiveStore, Config, ListKind, NoopCache, PAGE_SIZE, Result, SortField, SortKey,
    Storage, TimelineRequest, Upstream, engagement_ratio,
    model::{SourceEntities, SourceItem, SourceMention, SourceUrl, SourceUser},
};

/// In-memory stand-in for the upstream API.
#[derive(Default)]
struct SimulatedUpstream {
    live: RefCell<BTreeMap<i64, SourceItem>>,
    timeline_requests: RefCell<Vec<TimelineRequest>>,
    lookup_sizes: RefCell<Vec<usize>>,
}

impl SimulatedUpstream {
    fn with_items(items: impl IntoIterator<Item = SourceItem>) -> Self {
        let upstream = Self::default();
        upstream.publish(items);
        upstream
    }

    fn publish(&self, items: impl IntoIterator<Item = SourceItem>) {
        let mut live = self.live.borrow_mut();
        for item in items {
            live.insert(item.id, item);
        }
    }

    fn remove(&self, id: i64) {
        self.live.borrow_mut().remove(&id);
    }

    fn set_favorites(&self, id: i64, favorites: i64) {
        if let Some(item) = self.live.borrow_mut().get_mut(&id) {
            item.favorite_count = favorites;
        }
    }
}

impl Upstream for SimulatedUpstream {
    fn user_timeline(&self, request: &TimelineRequest) -> Result<Vec<SourceItem>> {
        self.timeline_requests.borrow_mut().push(request.clone());
        let live = self.live.borrow();
        Ok(live
            .values()
            .rev()
            .filter(|item| request.since_id.is_none_or(|since| item.id > since))
            .filter(|item| request.max_id.is_none_or(|max| item.id <= max))
            .take(request.count as usize)
            .cloned()
            .collect())
    }

    fn lookup(&self, ids: &[i64]) -> Result<Vec<SourceItem>> {
        self.lookup_sizes.borrow_mut().push(ids.len());
        let live = self.live.borrow();
        Ok(ids.iter().filter_map(|id| live.get(id).cloned()).collect())
    }

    fn fetch_profile(&self, handle: &str) -> Result<SourceUser> {
        Ok(SourceUser {
            id_str: "42".to_string(),
            screen_name: handle.to_string(),
            name: "Someone".to_string(),
            statuses_count: i64::try_from(self.live.borrow().len()).unwrap_or_default(),
            ..SourceUser::default()
        })
    }
}

fn item(id: i64, text: &str, favorites: i64, retweets: i64) -> SourceItem {
    SourceItem {
        id,
        id_str: id.to_string(),
        created_at: "Wed Jan 08 12:00:00 +0000 2025".to_string(),
        full_text: text.to_string(),
        favorite_count: favorites,
        retweet_count: retweets,
        ..SourceItem::default()
    }
}

fn with_mention(mut source: SourceItem) -> SourceItem {
    source.entities.user_mentions.push(SourceMention {
        id_str: "9".to_string(),
        screen_name: "other".to_string(),
    });
    source
}

fn with_link(mut source: SourceItem) -> SourceItem {
    source.entities = SourceEntities {
        urls: vec![SourceUrl {
            url: "https://t.co/x".to_string(),
            expanded_url: Some("https://example.com".to_string()),
            display_url: None,
        }],
        ..SourceEntities::default()
    };
    source
}

fn config() -> Config {
    let mut config = Config::default();
    config.account.handle = "someone".to_string();
    config
}

fn open_archive(dir: &TempDir, upstream: SimulatedUpstream) -> Archive<Storage, SimulatedUpstream> {
    let store = Storage::open(dir.path().join("archive.db")).unwrap();
    Archive::new(store, upstream, Box::new(NoopCache), config())
}

fn ids(records: &[tweetkeep::Record]) -> Vec<i64> {
    records.iter().map(|r| r.id).collect()
}

// =============================================================================
// Sync
// =============================================================================

#[test]
fn sync_stores_only_accepted_items() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items([
        item(1, "first", 1, 0),
        with_mention(item(2, "hi @other", 5, 1)),
        with_link(item(3, "read this https://t.co/x", 2, 2)),
        item(4, "fourth", 8, 2),
    ]);
    let mut archive = open_archive(&dir, upstream);

    let stored = archive.sync().unwrap();
    assert_eq!(ids(&stored), vec![4, 1]);

    let stats = archive.stats().unwrap();
    assert_eq!(stats.records_count, 2);
    assert!(archive.store().get_record(2).unwrap().is_none());
    assert!(archive.store().get_record(3).unwrap().is_none());
}

#[test]
fn sync_walks_every_page_then_resync_is_noop() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items((1..=450).map(|i| item(i, "post", i, 0)));
    let mut archive = open_archive(&dir, upstream);

    assert_eq!(archive.sync().unwrap().len(), 450);
    {
        let requests = archive.upstream().timeline_requests.borrow();
        // three full or partial pages, then one empty page ends the walk
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].max_id, None);
        assert_eq!(requests[1].max_id, Some(250));
        assert_eq!(requests[2].max_id, Some(50));
        assert_eq!(requests[3].max_id, Some(0));
        assert!(requests.iter().all(|r| r.since_id.is_none()));
    }

    let before = archive.stats().unwrap();
    let latest_before = archive.store().latest_record().unwrap();
    archive.upstream().timeline_requests.borrow_mut().clear();

    assert!(archive.sync().unwrap().is_empty());

    let after = archive.stats().unwrap();
    assert_eq!(after.records_count, before.records_count);
    assert_eq!(archive.store().latest_record().unwrap(), latest_before);
    let requests = archive.upstream().timeline_requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].since_id, Some(450));
}

#[test]
fn incremental_sync_fetches_only_newer_items() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items((1..=3).map(|i| item(i, "old", 1, 0)));
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    archive
        .upstream()
        .publish([item(10, "new one", 3, 0), item(11, "new two", 4, 0)]);
    let fresh = archive.sync().unwrap();

    assert_eq!(ids(&fresh), vec![11, 10]);
    assert_eq!(archive.stats().unwrap().records_count, 5);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[test]
fn reconcile_chunks_250_records_into_three_lookups() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items((1..=250).map(|i| item(i, "post", 1, 0)));
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    let report = archive.reconcile().unwrap();

    assert_eq!(*archive.upstream().lookup_sizes.borrow(), vec![100, 100, 50]);
    assert_eq!(report.lookups, 3);
    assert_eq!(report.checked, 250);
    assert_eq!(report.refreshed, 250);
    assert_eq!(report.deleted, 0);
}

#[test]
fn reconcile_marks_deleted_iff_absent_upstream() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items((1..=120).map(|i| item(i, "post", 1, 0)));
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    let gone = [3_i64, 57, 101, 120];
    for id in gone {
        archive.upstream().remove(id);
    }
    let report = archive.reconcile().unwrap();
    assert_eq!(report.deleted, gone.len());

    for id in 1..=120 {
        let record = archive.record(id).unwrap();
        assert_eq!(record.deleted, gone.contains(&id), "record {id}");
    }

    let stats = archive.stats().unwrap();
    assert_eq!(stats.records_count, 120);
    assert_eq!(stats.deleted_count, 4);

    // deleted records are no longer checked
    archive.upstream().lookup_sizes.borrow_mut().clear();
    archive.reconcile().unwrap();
    assert_eq!(*archive.upstream().lookup_sizes.borrow(), vec![100, 16]);
}

#[test]
fn reconcile_refreshes_engagement_and_ratio() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items([item(1, "a", 4, 1), item(2, "b", 0, 0)]);
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();
    let before = archive.record(1).unwrap();

    archive.upstream().set_favorites(1, 40);
    archive.reconcile().unwrap();

    let after = archive.record(1).unwrap();
    assert_eq!(after.favorites, 40);
    assert!((after.ratio - engagement_ratio(40, 1)).abs() < 1e-12);
    assert!(after.updated >= before.updated);

    let untouched = archive.record(2).unwrap();
    assert!(untouched.ratio.abs() < f64::EPSILON);
}

#[test]
fn manual_undelete_is_reverted_by_reconcile_while_absent() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items([item(1, "a", 1, 0)]);
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    archive.upstream().remove(1);
    archive.reconcile().unwrap();
    assert!(archive.record(1).unwrap().deleted);

    assert!(!archive.toggle_deleted(1).unwrap());
    archive.reconcile().unwrap();
    assert!(archive.record(1).unwrap().deleted);
}

// =============================================================================
// Query and paging
// =============================================================================

#[test]
fn search_semantics_through_the_archive() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items([
        item(1, "hello world", 1, 0),
        item(2, "world says hello", 2, 0),
        item(3, "just foo here", 3, 0),
        item(4, "and bar there", 4, 0),
        item(5, "nothing relevant", 5, 0),
    ]);
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();
    let by_id = SortKey::asc(SortField::Id);

    assert_eq!(ids(&archive.search("\"hello world\"", by_id, 1).unwrap()), vec![1]);
    assert_eq!(ids(&archive.search("hello world", by_id, 1).unwrap()), vec![1, 2]);
    assert_eq!(ids(&archive.search("foo OR bar", by_id, 1).unwrap()), vec![3, 4]);
    assert!(archive.search("x", by_id, 1).unwrap().is_empty());
}

#[test]
fn pages_of_thirty_over_thirty_five_results() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items((1..=35).map(|i| item(i, "rust note", i, 0)));
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    let order = SortKey::asc(SortField::Id);
    let page1 = archive.search("rust", order, 1).unwrap();
    let page2 = archive.search("rust", order, 2).unwrap();
    let page3 = archive.search("rust", order, 3).unwrap();

    assert_eq!(page1.len(), PAGE_SIZE);
    assert_eq!(ids(&page1), (1..=30).collect::<Vec<_>>());
    assert_eq!(ids(&page2), (31..=35).collect::<Vec<_>>());
    assert!(page3.is_empty());

    let best = archive.list(ListKind::Best, 1).unwrap();
    assert_eq!(best.len(), PAGE_SIZE);
    assert_eq!(best[0].id, 35);
    assert_eq!(archive.list(ListKind::Best, 2).unwrap().len(), 5);
}

#[test]
fn ratio_law_holds_for_every_stored_record() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items(
        (1..=40).map(|i| item(i, "counts", (i * 7) % 11, (i * 3) % 5)),
    );
    let mut archive = open_archive(&dir, upstream);
    archive.sync().unwrap();

    for record in archive.list(ListKind::Latest, 1).unwrap() {
        let expected = if record.favorites > 0 {
            record.retweets as f64 / record.favorites as f64
        } else {
            0.0
        };
        assert!((record.ratio - expected).abs() < 1e-12, "record {}", record.id);
    }
}

// =============================================================================
// Import and profile
// =============================================================================

#[test]
fn import_checks_seeds_upstream() {
    let dir = TempDir::new().unwrap();
    let export = dir.path().join("tweets.js");
    std::fs::write(
        &export,
        r#"window.YTD.tweets.part0 = [
          {"tweet": {"id_str": "7", "created_at": "Wed Jan 08 12:00:00 +0000 2025",
                     "full_text": "kept", "favorite_count": "1", "retweet_count": "0"}},
          {"tweet": {"id_str": "8", "created_at": "Wed Jan 08 12:00:00 +0000 2025",
                     "full_text": "gone", "favorite_count": "1", "retweet_count": "0"}},
          {"tweet": {"id_str": "9", "created_at": "Wed Jan 08 12:00:00 +0000 2025",
                     "full_text": "RT @x: repost", "favorite_count": "0", "retweet_count": "0"}}
        ]"#,
    )
    .unwrap();

    let upstream = SimulatedUpstream::with_items([item(7, "kept", 12, 3)]);
    let mut archive = open_archive(&dir, upstream);

    let report = archive.import(&export, false).unwrap();
    assert_eq!(report.parsed, 3);
    assert_eq!(report.seeded, 2);
    assert_eq!(report.stored, 2);

    let kept = archive.record(7).unwrap();
    assert_eq!(kept.favorites, 12);
    assert!(!kept.deleted);
    assert!(archive.record(8).unwrap().deleted);
    assert!(archive.store().get_record(9).unwrap().is_none());
}

#[test]
fn profile_round_trips_through_store() {
    let dir = TempDir::new().unwrap();
    let upstream = SimulatedUpstream::with_items([item(1, "a", 1, 0)]);
    let mut archive = open_archive(&dir, upstream);

    let refreshed = archive.refresh_profile().unwrap();
    assert_eq!(refreshed.handle, "someone");
    assert_eq!(refreshed.item_count, 1);

    let stored = archive.store().get_profile("someone").unwrap().unwrap();
    assert_eq!(archive.profile().unwrap(), stored);
    assert!(archive.stats().unwrap().profile_updated.is_some());
}
