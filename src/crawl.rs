//! Resumable breadth-first crawl of the remote folder tree.
//!
//! One call to [`Crawler::run`] is one bounded invocation: it resumes from
//! the caller's cursor (or starts a fresh generation at the configured
//! root), lists folders breadth-first, turns each child into a merge-upsert
//! stamped with the crawl's generation, and stops as soon as the
//! per-invocation write budget is spent. The returned cursor is the whole
//! state of the crawl; `None` means the tree was exhausted, at which point
//! the generation sweep runs and the meta record is updated.
//!
//! # State machine
//!
//! ```text
//!            ┌──────── page has next token ────────┐
//!            ▼                                     │
//! pop queue → list(current, pageToken) → consume entries[offset..]
//!    │                                             │
//!    └─ queue empty: quiescent ─▶ sweep ─▶ meta    └─ budget hit: emit cursor
//! ```
//!
//! A budget stop in the middle of a page keeps `current`, `pageToken`, and
//! the number of entries already consumed (`offset`), so the next call
//! re-lists the same page and skips what it already wrote.
//!
//! # Failure semantics
//!
//! A listing or commit failure aborts the invocation. Writes still sitting
//! in the buffer are dropped; batches already committed stay (they are
//! idempotent merges). The caller retries with the last cursor it was
//! handed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::buffer::WriteBuffer;
use crate::clock::Clock;
use crate::config::{Config, QueryConfig, SyncConfig};
use crate::cursor::{self, CrawlCursor};
use crate::error::SyncError;
use crate::models::{
    FileUpsert, FolderUpsert, LeaseOutcome, MetaRecord, RemoteEntry, ScanCounts, WriteOp,
};
use crate::provider::{ListRequest, ProviderQuery, TreeProvider};
use crate::store::IndexStore;
use crate::sweep;

/// Queue length past which the most recently discovered folder is listed
/// next, so a wide tree drains its leaves instead of growing the cursor.
const DEPTH_FIRST_QUEUE_LEN: usize = 256;

/// Per-invocation crawl parameters.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Cursor returned by the previous invocation, if any.
    pub cursor: Option<String>,
    /// Write budget for this invocation (already clamped by the caller).
    pub max_writes: u64,
    /// List and classify without committing, sweeping, or leasing.
    pub dry_run: bool,
    /// Identity recorded in the meta record on completion.
    pub triggered_by: Option<String>,
}

/// Result of one crawl invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOutcome {
    pub dry: bool,
    pub generation: i64,
    /// Cumulative counters for the whole crawl, not just this call.
    pub scanned: ScanCounts,
    /// `None` once the crawl is quiescent.
    pub next_cursor: Option<String>,
    /// Records deleted by the sweep, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swept: Option<u64>,
}

/// Drives crawl invocations for one configured root.
pub struct Crawler {
    provider: Arc<dyn TreeProvider>,
    store: Arc<dyn IndexStore>,
    clock: Arc<dyn Clock>,
    root_id: String,
    drive_id: Option<String>,
    sync: SyncConfig,
    query: QueryConfig,
}

impl Crawler {
    pub fn new(
        config: &Config,
        provider: Arc<dyn TreeProvider>,
        store: Arc<dyn IndexStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            root_id: config.provider.root_folder_id.clone(),
            drive_id: config.provider.drive_id.clone(),
            sync: config.sync.clone(),
            query: config.query.clone(),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Run one bounded crawl invocation.
    pub async fn run(&self, options: CrawlOptions) -> Result<CrawlOutcome, SyncError> {
        if self.root_id.trim().is_empty() {
            return Err(SyncError::Configuration("root folder id is not set".into()));
        }
        let budget = options.max_writes.max(1);
        let dry_run = options.dry_run;

        let mut state = self
            .resume_or_start(options.cursor.as_deref(), dry_run)
            .await?;
        if !dry_run {
            state = self.claim_root(state).await?;
        }
        let generation = state.generation;

        info!(
            generation,
            budget,
            dry_run,
            queued = state.queue.len(),
            "crawl invocation started"
        );

        let mut buffer = WriteBuffer::new(self.sync.batch_size, dry_run);
        let mut spent: u64 = 0;

        'crawl: loop {
            if state.is_quiescent() || spent >= budget {
                break;
            }

            let folder = match state.current.clone() {
                Some(folder) => folder,
                None => {
                    // is_quiescent() was false, so the queue is non-empty
                    let next = if state.queue.len() >= DEPTH_FIRST_QUEUE_LEN {
                        state.queue.pop().unwrap_or_default()
                    } else {
                        state.queue.remove(0)
                    };
                    state.current = Some(next.clone());
                    state.page_token = None;
                    state.offset = 0;
                    next
                }
            };

            let request = ListRequest::new(
                ProviderQuery::children_of(&folder),
                self.sync.list_page_size,
            )
            .page_token(state.page_token.clone());
            let page = self.provider.list_children(&request).await?;
            debug!(
                folder = %folder,
                entries = page.entries.len(),
                offset = state.offset,
                more = page.next_page_token.is_some(),
                "listed page"
            );

            let start = state.offset.min(page.entries.len());
            for (index, entry) in page.entries.iter().enumerate().skip(start) {
                if spent >= budget {
                    state.offset = index;
                    break 'crawl;
                }
                let op = self.classify(entry, &folder, generation);
                if entry.is_folder() {
                    state.queue.push(entry.id.clone());
                    state.folders += 1;
                } else {
                    state.files += 1;
                }
                buffer.enqueue(op);
                state.writes += 1;
                spent += 1;

                if buffer.is_full() {
                    buffer.flush(self.store.as_ref()).await?;
                    if !dry_run {
                        self.hold_lease(generation).await?;
                    }
                }
            }

            // Page fully consumed.
            state.offset = 0;
            match page.next_page_token {
                Some(token) => state.page_token = Some(token),
                None => {
                    state.current = None;
                    state.page_token = None;
                }
            }
        }

        buffer.flush(self.store.as_ref()).await?;

        let scanned = ScanCounts {
            folders: state.folders,
            files: state.files,
            writes: state.writes,
        };

        if !state.is_quiescent() {
            info!(generation, spent, queued = state.queue.len(), "crawl paused at write budget");
            return Ok(CrawlOutcome {
                dry: dry_run,
                generation,
                scanned,
                next_cursor: Some(cursor::encode(&state)),
                swept: None,
            });
        }

        if dry_run {
            info!(generation, writes = state.writes, "dry-run crawl reached quiescence");
            return Ok(CrawlOutcome {
                dry: true,
                generation,
                scanned,
                next_cursor: None,
                swept: None,
            });
        }

        let deleted = sweep::sweep_stale(
            self.store.as_ref(),
            &self.root_id,
            generation,
            self.sync.batch_size,
        )
        .await?;

        self.store
            .put_meta(&MetaRecord {
                root_id: self.root_id.clone(),
                drive_id: self.drive_id.clone(),
                last_generation: generation,
                last_run_by: options.triggered_by,
                last_run_at: self.clock.now().timestamp(),
            })
            .await?;
        self.store.release_lease(&self.root_id, generation).await?;

        info!(
            generation,
            folders = state.folders,
            files = state.files,
            deleted,
            "crawl complete"
        );

        Ok(CrawlOutcome {
            dry: false,
            generation,
            scanned,
            next_cursor: None,
            swept: Some(deleted),
        })
    }

    /// Decode the caller's cursor, or begin a new generation at the root.
    async fn resume_or_start(
        &self,
        token: Option<&str>,
        dry_run: bool,
    ) -> Result<CrawlCursor, SyncError> {
        let meta = self.store.get_meta(&self.root_id).await?;
        let last_completed = meta.map(|m| m.last_generation);

        if let Some(state) = cursor::decode_opt::<CrawlCursor>(token) {
            match last_completed {
                _ if state.dry != dry_run => {
                    warn!(
                        cursor_dry = state.dry,
                        dry_run, "cursor belongs to a crawl of the other mode; starting fresh"
                    );
                }
                Some(last) if state.generation <= last => {
                    warn!(
                        cursor_generation = state.generation,
                        last_completed = last,
                        "cursor belongs to a finished crawl; starting fresh"
                    );
                }
                _ => {
                    debug!(generation = state.generation, "resuming crawl");
                    return Ok(state);
                }
            }
        }

        Ok(self.fresh_cursor(last_completed.map(|last| last + 1), dry_run))
    }

    /// A new crawl at the root whose generation is the current time in
    /// millis, raised to `floor` when the clock lags.
    fn fresh_cursor(&self, floor: Option<i64>, dry_run: bool) -> CrawlCursor {
        let now_millis = self.clock.now().timestamp_millis();
        let generation = floor.map_or(now_millis, |floor| now_millis.max(floor));
        CrawlCursor::new(&self.root_id, generation, dry_run)
    }

    /// Take the lease before the first write. A cursor whose generation was
    /// overtaken by a newer crawl is abandoned, and the crawl restarts above
    /// that generation.
    async fn claim_root(&self, state: CrawlCursor) -> Result<CrawlCursor, SyncError> {
        match self.acquire(state.generation).await? {
            LeaseOutcome::Acquired => Ok(state),
            LeaseOutcome::Held { generation: holder } => {
                warn!(generation = state.generation, holder, "root is leased by another crawl");
                Err(SyncError::CrawlInProgress { generation: holder })
            }
            LeaseOutcome::Superseded { generation: newer } => {
                warn!(
                    generation = state.generation,
                    newer, "cursor overtaken by a newer crawl; starting fresh"
                );
                let fresh = self.fresh_cursor(Some(newer + 1), false);
                self.hold_lease(fresh.generation).await?;
                Ok(fresh)
            }
        }
    }

    /// Renew the lease mid-run; losing it in any way stops the invocation.
    async fn hold_lease(&self, generation: i64) -> Result<(), SyncError> {
        match self.acquire(generation).await? {
            LeaseOutcome::Acquired => Ok(()),
            LeaseOutcome::Held { generation: holder }
            | LeaseOutcome::Superseded { generation: holder } => {
                warn!(generation, holder, "root is leased by another crawl");
                Err(SyncError::CrawlInProgress { generation: holder })
            }
        }
    }

    async fn acquire(&self, generation: i64) -> Result<LeaseOutcome, SyncError> {
        let now = self.clock.now().timestamp();
        Ok(self
            .store
            .acquire_lease(&self.root_id, generation, now, self.sync.lease_ttl_secs)
            .await?)
    }

    fn classify(&self, entry: &RemoteEntry, parent: &str, generation: i64) -> WriteOp {
        let parent_id = Some(entry.parent_id().unwrap_or(parent).to_string());
        if entry.is_folder() {
            WriteOp::UpsertFolder(FolderUpsert {
                id: entry.id.clone(),
                name: entry.display_name().to_string(),
                parent_id,
                root_id: self.root_id.clone(),
                drive_id: self.drive_id.clone(),
                generation,
            })
        } else {
            WriteOp::UpsertFile(FileUpsert {
                id: entry.id.clone(),
                name: entry.display_name().to_string(),
                mime_type: entry.mime().to_string(),
                media_type: entry.media_type(),
                parent_id,
                root_id: self.root_id.clone(),
                drive_id: self.drive_id.clone(),
                created_time: entry.created_time.clone(),
                modified_time: entry.modified_time.clone(),
                view_url: entry.web_view_link.clone(),
                thumb_url: self.query.thumb_url(&entry.id),
                generation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::MediaType;
    use crate::provider::memory::InMemoryTree;
    use crate::store::memory::InMemoryStore;

    struct Fixture {
        tree: Arc<InMemoryTree>,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        crawler: Crawler,
    }

    fn fixture(tree: InMemoryTree) -> Fixture {
        let tree = Arc::new(tree);
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let config = Config::minimal("unused.sqlite".into(), "R");
        let crawler = Crawler::new(&config, tree.clone(), store.clone(), clock.clone());
        Fixture {
            tree,
            store,
            clock,
            crawler,
        }
    }

    fn opts(cursor: Option<String>, max_writes: u64) -> CrawlOptions {
        CrawlOptions {
            cursor,
            max_writes,
            dry_run: false,
            triggered_by: Some("scheduler".into()),
        }
    }

    fn sample_tree() -> InMemoryTree {
        let tree = InMemoryTree::new();
        tree.add_folder("A", "Album A", "R");
        tree.add_folder("B", "Album B", "R");
        tree.add_file("f1", "photo.jpg", "image/jpeg", "A", Some("2026-01-01T00:00:00Z"));
        tree
    }

    #[tokio::test]
    async fn budget_stop_mid_page_keeps_offset() {
        let fx = fixture(sample_tree());
        let out = fx.crawler.run(opts(None, 1)).await.unwrap();
        assert_eq!(out.scanned.writes, 1);
        let token = out.next_cursor.expect("cursor");
        let state: CrawlCursor = cursor::decode(&token).unwrap();
        assert_eq!(state.current.as_deref(), Some("R"));
        assert_eq!(state.offset, 1);
        assert_eq!(state.queue, vec!["A".to_string()]);
        assert_eq!(fx.store.all_folders().len(), 1);
    }

    #[tokio::test]
    async fn wide_tree_keeps_queue_bounded() {
        let tree = InMemoryTree::new();
        for i in 0..300 {
            let id = format!("w{}", i);
            tree.add_folder(&id, "wide", "R");
            tree.add_folder(&format!("{}a", id), "leaf", &id);
            tree.add_folder(&format!("{}b", id), "leaf", &id);
        }
        let fx = fixture(tree);

        let mut cursor = None;
        let mut longest = 0;
        loop {
            let out = fx.crawler.run(opts(cursor, 50)).await.unwrap();
            match out.next_cursor {
                Some(next) => {
                    let state: CrawlCursor = cursor::decode(&next).unwrap();
                    longest = longest.max(state.queue.len());
                    cursor = Some(next);
                }
                None => break,
            }
        }
        assert!(longest <= DEPTH_FIRST_QUEUE_LEN + 50, "queue grew to {}", longest);
        assert_eq!(fx.store.all_folders().len(), 900);
    }

    #[tokio::test]
    async fn classifies_files_with_thumb_and_generation() {
        let fx = fixture(sample_tree());
        let out = fx.crawler.run(opts(None, 100)).await.unwrap();
        assert!(out.next_cursor.is_none());
        let files = fx.store.all_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].media_type, MediaType::Photo);
        assert_eq!(files[0].parent_id.as_deref(), Some("A"));
        assert_eq!(files[0].thumb_url, "/api/drive/thumb?id=f1");
        assert_eq!(files[0].generation, Some(out.generation));
        assert_eq!(out.generation, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing_and_leaves_meta() {
        let fx = fixture(sample_tree());
        let out = fx
            .crawler
            .run(CrawlOptions {
                dry_run: true,
                ..opts(None, 100)
            })
            .await
            .unwrap();
        assert!(out.dry);
        assert_eq!(out.scanned.writes, 3);
        assert!(out.next_cursor.is_none());
        assert!(out.swept.is_none());
        assert_eq!(fx.store.commits(), 0);
        assert!(fx.store.get_meta("R").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn superseded_cursor_starts_fresh_generation() {
        let fx = fixture(sample_tree());
        let first = fx.crawler.run(opts(None, 1)).await.unwrap();
        let stale = first.next_cursor.clone();
        fx.crawler.run(opts(stale.clone(), 100)).await.unwrap();

        fx.clock.advance(chrono::Duration::seconds(1));
        let again = fx.crawler.run(opts(stale, 100)).await.unwrap();
        assert!(again.generation > first.generation);
        assert_eq!(again.scanned.writes, 3);
    }

    #[tokio::test]
    async fn generation_is_monotonic_under_clock_skew() {
        let fx = fixture(sample_tree());
        let first = fx.crawler.run(opts(None, 100)).await.unwrap();
        fx.clock.advance(chrono::Duration::hours(-1));
        let second = fx.crawler.run(opts(None, 100)).await.unwrap();
        assert_eq!(second.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn listing_failure_is_transient_and_retryable() {
        let fx = fixture(sample_tree());
        fx.tree.fail_call(2);
        let err = fx.crawler.run(opts(None, 100)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, SyncError::Provider(_)));
    }
}
