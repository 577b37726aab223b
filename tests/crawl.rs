//! End-to-end crawl behaviour against the in-memory provider and store.

use std::sync::Arc;

use chrono::Duration;
use drive_index::clock::{Clock, ManualClock};
use drive_index::config::Config;
use drive_index::crawl::{CrawlOptions, CrawlOutcome, Crawler};
use drive_index::cursor::{self, CrawlCursor};
use drive_index::error::SyncError;
use drive_index::provider::memory::InMemoryTree;
use drive_index::store::memory::InMemoryStore;
use drive_index::store::IndexStore;

struct Harness {
    tree: Arc<InMemoryTree>,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    crawler: Crawler,
}

fn harness_with(tree: Arc<InMemoryTree>, config: Config) -> Harness {
    let clock = Arc::new(ManualClock::at_epoch_secs(1_767_225_600));
    let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
    let crawler = Crawler::new(&config, tree.clone(), store.clone(), clock.clone());
    Harness {
        tree,
        store,
        clock,
        crawler,
    }
}

fn harness(tree: InMemoryTree) -> Harness {
    harness_with(
        Arc::new(tree),
        Config::minimal("unused.sqlite".into(), "R"),
    )
}

async fn invoke(h: &Harness, cursor: Option<String>, max_writes: u64) -> CrawlOutcome {
    h.crawler
        .run(CrawlOptions {
            cursor,
            max_writes,
            dry_run: false,
            triggered_by: Some("ops@example.org".into()),
        })
        .await
        .unwrap()
}

/// Chain invocations until quiescent; returns the number of invocations.
async fn crawl_to_end(h: &Harness, max_writes: u64) -> usize {
    let mut cursor = None;
    for n in 1..10_000 {
        let out = invoke(h, cursor, max_writes).await;
        match out.next_cursor {
            Some(next) => cursor = Some(next),
            None => return n,
        }
    }
    panic!("crawl never finished");
}

/// R ─┬─ A ── f1
///    └─ B
fn small_tree() -> InMemoryTree {
    let tree = InMemoryTree::new();
    tree.add_folder("A", "Folder A", "R");
    tree.add_folder("B", "Folder B", "R");
    tree.add_file("f1", "HackUTD 2026 Opening.jpg", "image/jpeg", "A", Some("2026-02-01T10:00:00Z"));
    tree
}

/// Three levels, several files per folder.
fn wide_tree() -> InMemoryTree {
    let tree = InMemoryTree::new().with_page_cap(3);
    for a in 0..3 {
        let top = format!("t{}", a);
        tree.add_folder(&top, &format!("Top {}", a), "R");
        for b in 0..2 {
            let mid = format!("{}m{}", top, b);
            tree.add_folder(&mid, &format!("Mid {}", b), &top);
            for c in 0..4 {
                let id = format!("{}f{}", mid, c);
                let mime = if c % 2 == 0 { "image/png" } else { "video/mp4" };
                tree.add_file(&id, &format!("clip {} {}.bin", mid, c), mime, &mid, None);
            }
        }
        tree.add_file(&format!("{}gif", top), "loop.gif", "image/gif", &top, None);
    }
    tree
}

#[tokio::test]
async fn three_invocation_scenario() {
    let h = harness(small_tree());

    // First call: one write, stops mid-page inside R.
    let first = invoke(&h, None, 1).await;
    assert_eq!(first.scanned.writes, 1);
    let token = first.next_cursor.clone().expect("cursor after first call");
    let state: CrawlCursor = cursor::decode(&token).unwrap();
    assert_eq!(state.current.as_deref(), Some("R"));
    assert_eq!(state.offset, 1);

    // Second call finishes R and visits A, writing f1.
    let second = invoke(&h, Some(token), 2).await;
    assert_eq!(second.scanned.writes, 3);
    assert_eq!(second.scanned.files, 1);
    let token = second.next_cursor.clone().expect("B still queued");
    assert!(h.store.all_files().iter().any(|f| f.id == "f1"));

    // Third call drains B and finds nothing left.
    let third = invoke(&h, Some(token), 2).await;
    assert!(third.next_cursor.is_none());
    assert_eq!(third.swept, Some(0));
    assert_eq!(third.generation, first.generation);

    let meta = h.store.get_meta("R").await.unwrap().unwrap();
    assert_eq!(meta.last_generation, first.generation);
    assert_eq!(meta.last_run_by.as_deref(), Some("ops@example.org"));
    assert_eq!(h.store.all_folders().len(), 2);
}

#[tokio::test]
async fn split_crawl_matches_single_crawl() {
    let tree = Arc::new(wide_tree());
    let config = Config::minimal("unused.sqlite".into(), "R");
    let single = harness_with(tree.clone(), config.clone());
    let split = harness_with(tree, config);

    assert_eq!(crawl_to_end(&single, 4000).await, 1);
    let invocations = crawl_to_end(&split, 5).await;
    assert!(invocations > 5);

    assert_eq!(single.store.all_folders(), split.store.all_folders());
    assert_eq!(single.store.all_files(), split.store.all_files());
    assert_eq!(split.store.all_files().len(), 27);
    assert_eq!(split.store.all_folders().len(), 9);
}

#[tokio::test]
async fn budget_is_respected_for_every_invocation() {
    for budget in 1..=7u64 {
        let h = harness(wide_tree());
        let mut cursor = None;
        let mut previous = 0;
        loop {
            let out = invoke(&h, cursor, budget).await;
            assert!(out.scanned.writes - previous <= budget);
            previous = out.scanned.writes;
            match out.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(previous, 36);
    }
}

#[tokio::test]
async fn replaying_a_cursor_is_idempotent() {
    let h = harness(wide_tree());
    let first = invoke(&h, None, 4).await;
    let cursor = first.next_cursor.unwrap();

    let once = invoke(&h, Some(cursor.clone()), 4).await;
    let folders = h.store.all_folders();
    let files = h.store.all_files();

    let twice = invoke(&h, Some(cursor), 4).await;
    assert_eq!(once, twice);
    assert_eq!(h.store.all_folders(), folders);
    assert_eq!(h.store.all_files(), files);
}

#[tokio::test]
async fn sweep_removes_nodes_missing_from_new_generation() {
    let tree = small_tree();
    tree.add_file("f2", "old.jpg", "image/jpeg", "B", None);
    let h = harness(tree);

    let g1 = invoke(&h, None, 100).await;
    assert!(g1.next_cursor.is_none());
    assert_eq!(h.store.all_files().len(), 2);

    // f2 moves outside the root, f1 is trashed, a new file appears.
    h.tree.move_to("f2", "elsewhere");
    h.tree.trash("f1");
    h.tree.add_file("f3", "new.jpg", "image/jpeg", "B", None);
    h.clock.advance(Duration::minutes(10));

    let g2 = invoke(&h, None, 100).await;
    assert!(g2.generation > g1.generation);
    assert_eq!(g2.swept, Some(2));

    let ids: Vec<String> = h.store.all_files().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["f3"]);
    assert!(h
        .store
        .all_folders()
        .iter()
        .all(|f| f.generation == Some(g2.generation)));
}

#[tokio::test]
async fn dry_run_never_sweeps() {
    let h = harness(small_tree());
    invoke(&h, None, 100).await;
    h.tree.remove("f1");
    h.clock.advance(Duration::minutes(1));

    let out = h
        .crawler
        .run(CrawlOptions {
            max_writes: 100,
            dry_run: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(out.dry);
    assert!(out.next_cursor.is_none());
    assert_eq!(h.store.all_files().len(), 1);
}

#[tokio::test]
async fn provider_failure_resumes_from_last_good_cursor() {
    let clean = harness(wide_tree());
    crawl_to_end(&clean, 5).await;

    let h = harness(wide_tree());
    h.tree.fail_call(4);
    h.tree.fail_call(9);

    let mut cursor = None;
    let mut failures = 0;
    loop {
        match h
            .crawler
            .run(CrawlOptions {
                cursor: cursor.clone(),
                max_writes: 5,
                dry_run: false,
                triggered_by: Some("ops@example.org".into()),
            })
            .await
        {
            Ok(out) => match out.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            },
            Err(err) => {
                assert!(err.is_retryable());
                failures += 1;
                // retry with the same, last good cursor
            }
        }
    }

    assert_eq!(failures, 2);
    assert_eq!(h.store.all_folders(), clean.store.all_folders());
    assert_eq!(h.store.all_files(), clean.store.all_files());
}

#[tokio::test]
async fn store_failure_is_retryable_and_leaves_meta_untouched() {
    let h = harness(small_tree());
    h.store.fail_commit(1);

    let err = h
        .crawler
        .run(CrawlOptions {
            max_writes: 100,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::StoreWrite(_)));
    assert!(err.is_retryable());
    assert!(h.store.get_meta("R").await.unwrap().is_none());
    assert!(h.store.all_files().is_empty());

    let out = invoke(&h, None, 100).await;
    assert!(out.next_cursor.is_none());
    assert_eq!(h.store.all_files().len(), 1);
}

#[tokio::test]
async fn overlapping_crawls_are_rejected_while_lease_is_live() {
    let h = harness(wide_tree());
    let first = invoke(&h, None, 3).await;
    let stale_cursor = first.next_cursor.unwrap();

    h.clock.advance(Duration::seconds(30));
    let err = h
        .crawler
        .run(CrawlOptions {
            max_writes: 3,
            ..Default::default()
        })
        .await
        .unwrap_err();
    match err {
        SyncError::CrawlInProgress { generation } => assert_eq!(generation, first.generation),
        other => panic!("unexpected error: {other}"),
    }

    // Once the lease expires a new generation may take over.
    h.clock.advance(Duration::seconds(600));
    let takeover = invoke(&h, None, 3).await;
    assert!(takeover.generation > first.generation);

    // The abandoned crawl can no longer write.
    let err = h
        .crawler
        .run(CrawlOptions {
            cursor: Some(stale_cursor),
            max_writes: 3,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::CrawlInProgress { .. }));
}

#[tokio::test]
async fn older_crawl_cannot_resume_over_a_newer_one() {
    let tree = small_tree();
    tree.add_folder("C", "Folder C", "R");
    let h = harness(tree);
    let start = h.clock.now();

    // X pauses after one write and is abandoned.
    let x = invoke(&h, None, 1).await;
    let x_cursor = x.next_cursor.unwrap();

    // Y starts once X's lease has expired and pauses too.
    h.clock.set(start + Duration::seconds(600));
    let y = invoke(&h, None, 2).await;
    assert!(y.generation > x.generation);
    let y_cursor = y.next_cursor.unwrap();

    // X's cursor is overtaken: it restarts above Y instead of resuming.
    h.clock.set(start + Duration::seconds(1200));
    let x_again = invoke(&h, Some(x_cursor), 100).await;
    assert!(x_again.generation > y.generation);
    assert!(x_again.next_cursor.is_none());
    assert_eq!(x_again.scanned.writes, 4);

    // Y's cursor now belongs to a finished crawl and starts fresh as well.
    let y_again = invoke(&h, Some(y_cursor), 100).await;
    assert!(y_again.generation > x_again.generation);
    assert_eq!(y_again.swept, Some(0));

    let ids: Vec<String> = h.store.all_folders().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(h.store.all_files().len(), 1);
}

#[tokio::test]
async fn dry_run_cursor_does_not_resume_a_real_crawl() {
    let h = harness(small_tree());
    invoke(&h, None, 100).await;
    h.clock.advance(Duration::minutes(1));

    let dry = h
        .crawler
        .run(CrawlOptions {
            max_writes: 2,
            dry_run: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let dry_cursor = dry.next_cursor.unwrap();
    assert!(cursor::decode::<CrawlCursor>(&dry_cursor).unwrap().dry);

    let real = invoke(&h, Some(dry_cursor), 100).await;
    assert!(!real.dry);
    assert_eq!(real.scanned.writes, 3);
    assert_eq!(real.swept, Some(0));
    assert_eq!(h.store.all_folders().len(), 2);
    assert_eq!(h.store.all_files().len(), 1);
}

#[tokio::test]
async fn renamed_entries_are_merged_on_the_next_crawl() {
    let h = harness(small_tree());
    invoke(&h, None, 100).await;

    h.tree.rename("f1", "HackUTD 2026 Closing.jpg");
    h.tree.rename("B", "Renamed B");
    h.clock.advance(Duration::minutes(5));
    invoke(&h, None, 100).await;

    assert_eq!(h.store.all_files()[0].name, "HackUTD 2026 Closing.jpg");
    let b = h
        .store
        .all_folders()
        .into_iter()
        .find(|f| f.id == "B")
        .unwrap();
    assert_eq!(b.name, "Renamed B");
}

#[tokio::test]
async fn malformed_cursor_starts_fresh() {
    let h = harness(small_tree());
    let out = invoke(&h, Some("not-base64!".into()), 100).await;
    assert!(out.next_cursor.is_none());
    assert_eq!(out.scanned.writes, 3);
}
