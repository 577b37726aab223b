//! In-memory [`IndexStore`] implementation for testing.
//!
//! Uses `BTreeMap`s behind a single `std::sync::RwLock`, so a batch commit
//! is atomic with respect to readers. Write timestamps come from the
//! injected [`Clock`]. Commit failures can be injected to exercise the
//! store-write failure path.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::models::{
    FileRecord, FileUpsert, FolderRecord, FolderUpsert, LeaseOutcome, MetaRecord, RecordKey,
    RecordKind, WriteOp,
};

use super::IndexStore;

#[derive(Debug, Clone, Copy)]
struct Lease {
    generation: i64,
    expires_at: i64,
}

#[derive(Default)]
struct State {
    folders: BTreeMap<String, FolderRecord>,
    files: BTreeMap<String, FileRecord>,
    meta: BTreeMap<String, MetaRecord>,
    leases: BTreeMap<String, Lease>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    fail_on_commit: Mutex<HashSet<usize>>,
    commits: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            fail_on_commit: Mutex::new(HashSet::new()),
            commits: AtomicUsize::new(0),
        }
    }

    /// Make the commit call with this 1-based sequence number fail without
    /// applying anything.
    pub fn fail_commit(&self, n: usize) {
        self.fail_on_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(n);
    }

    /// Number of commit calls so far (including failed ones).
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Snapshot of every folder, ordered by id.
    pub fn all_folders(&self) -> Vec<FolderRecord> {
        self.read()
            .map(|s| s.folders.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every file, ordered by id.
    pub fn all_files(&self) -> Vec<FileRecord> {
        self.read()
            .map(|s| s.files.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Insert a folder row verbatim, bypassing merge semantics.
    pub fn seed_folder(&self, record: FolderRecord) {
        if let Ok(mut s) = self.write() {
            s.folders.insert(record.id.clone(), record);
        }
    }

    /// Insert a file row verbatim, bypassing merge semantics.
    pub fn seed_file(&self, record: FileRecord) {
        if let Ok(mut s) = self.write() {
            s.files.insert(record.id.clone(), record);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay a folder upsert onto the stored row, if any.
pub fn merge_folder(existing: Option<&FolderRecord>, op: &FolderUpsert, now: i64) -> FolderRecord {
    FolderRecord {
        id: op.id.clone(),
        name: op.name.clone(),
        parent_id: op
            .parent_id
            .clone()
            .or_else(|| existing.and_then(|e| e.parent_id.clone())),
        root_id: op.root_id.clone(),
        drive_id: op
            .drive_id
            .clone()
            .or_else(|| existing.and_then(|e| e.drive_id.clone())),
        generation: Some(newest_generation(
            existing.and_then(|e| e.generation),
            op.generation,
        )),
        updated_at: now,
    }
}

/// Overlay a file upsert onto the stored row, if any.
pub fn merge_file(existing: Option<&FileRecord>, op: &FileUpsert, now: i64) -> FileRecord {
    let keep = |new: &Option<String>, old: fn(&FileRecord) -> &Option<String>| {
        new.clone().or_else(|| existing.and_then(|e| old(e).clone()))
    };
    FileRecord {
        id: op.id.clone(),
        name: op.name.clone(),
        mime_type: op.mime_type.clone(),
        media_type: op.media_type,
        parent_id: keep(&op.parent_id, |e| &e.parent_id),
        root_id: op.root_id.clone(),
        drive_id: keep(&op.drive_id, |e| &e.drive_id),
        created_time: keep(&op.created_time, |e| &e.created_time),
        modified_time: keep(&op.modified_time, |e| &e.modified_time),
        view_url: keep(&op.view_url, |e| &e.view_url),
        thumb_url: op.thumb_url.clone(),
        generation: Some(newest_generation(
            existing.and_then(|e| e.generation),
            op.generation,
        )),
        updated_at: now,
    }
}

/// Upserts never move a record's generation backwards.
fn newest_generation(stored: Option<i64>, incoming: i64) -> i64 {
    stored.map_or(incoming, |g| g.max(incoming))
}

fn is_stale(generation: Option<i64>, current: i64) -> bool {
    generation.map_or(true, |g| g < current)
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn commit_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let call = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_on_commit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&call)
        {
            return Err(StoreError::Message(format!(
                "injected commit failure on call {}",
                call
            )));
        }

        let now = self.clock.now().timestamp();
        let mut state = self.write()?;
        for op in ops {
            match op {
                WriteOp::UpsertFolder(f) => {
                    let merged = merge_folder(state.folders.get(&f.id), f, now);
                    state.folders.insert(f.id.clone(), merged);
                }
                WriteOp::UpsertFile(f) => {
                    let merged = merge_file(state.files.get(&f.id), f, now);
                    state.files.insert(f.id.clone(), merged);
                }
                WriteOp::Delete(key) => match key.kind {
                    RecordKind::Folder => {
                        state.folders.remove(&key.id);
                    }
                    RecordKind::File => {
                        state.files.remove(&key.id);
                    }
                },
            }
        }
        Ok(())
    }

    async fn stale_records(
        &self,
        root_id: &str,
        generation: i64,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let state = self.read()?;
        let folders = state
            .folders
            .values()
            .filter(|f| f.root_id == root_id && is_stale(f.generation, generation))
            .map(|f| RecordKey {
                kind: RecordKind::Folder,
                id: f.id.clone(),
            });
        let files = state
            .files
            .values()
            .filter(|f| f.root_id == root_id && is_stale(f.generation, generation))
            .map(|f| RecordKey {
                kind: RecordKind::File,
                id: f.id.clone(),
            });
        Ok(folders.chain(files).collect())
    }

    async fn folders_for_root(&self, root_id: &str) -> Result<Vec<FolderRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .folders
            .values()
            .filter(|f| f.root_id == root_id)
            .cloned()
            .collect())
    }

    async fn files_for_root(&self, root_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .files
            .values()
            .filter(|f| f.root_id == root_id)
            .cloned()
            .collect())
    }

    async fn files_in_folder(
        &self,
        root_id: &str,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .files
            .values()
            .filter(|f| f.root_id == root_id && f.parent_id.as_deref() == Some(folder_id))
            .cloned()
            .collect())
    }

    async fn get_meta(&self, root_id: &str) -> Result<Option<MetaRecord>, StoreError> {
        Ok(self.read()?.meta.get(root_id).cloned())
    }

    async fn put_meta(&self, meta: &MetaRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let last_generation = state
            .meta
            .get(&meta.root_id)
            .map_or(meta.last_generation, |m| {
                m.last_generation.max(meta.last_generation)
            });
        state.meta.insert(
            meta.root_id.clone(),
            MetaRecord {
                last_generation,
                ..meta.clone()
            },
        );
        Ok(())
    }

    async fn acquire_lease(
        &self,
        root_id: &str,
        generation: i64,
        now: i64,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome, StoreError> {
        let mut state = self.write()?;
        if let Some(lease) = state.leases.get(root_id) {
            if lease.generation != generation {
                if lease.expires_at > now {
                    return Ok(LeaseOutcome::Held {
                        generation: lease.generation,
                    });
                }
                if lease.generation > generation {
                    return Ok(LeaseOutcome::Superseded {
                        generation: lease.generation,
                    });
                }
            }
        }
        state.leases.insert(
            root_id.to_string(),
            Lease {
                generation,
                expires_at: now + ttl_secs,
            },
        );
        Ok(LeaseOutcome::Acquired)
    }

    async fn release_lease(&self, root_id: &str, generation: i64) -> Result<(), StoreError> {
        let mut state = self.write()?;
        // Expire rather than remove, so the last holder's generation stays
        // on record.
        if let Some(lease) = state
            .leases
            .get_mut(root_id)
            .filter(|l| l.generation == generation)
        {
            lease.expires_at = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::MediaType;
    use chrono::Duration;

    fn file_op(id: &str, generation: i64, created: Option<&str>) -> FileUpsert {
        FileUpsert {
            id: id.into(),
            name: format!("{}.jpg", id),
            mime_type: "image/jpeg".into(),
            media_type: MediaType::Photo,
            parent_id: Some("A".into()),
            root_id: "R".into(),
            drive_id: None,
            created_time: created.map(str::to_string),
            modified_time: None,
            view_url: Some(format!("https://drive.example/{}", id)),
            thumb_url: format!("/api/drive/thumb?id={}", id),
            generation,
        }
    }

    #[tokio::test]
    async fn merge_upsert_keeps_unspecified_fields() {
        let clock = Arc::new(ManualClock::at_epoch_secs(100));
        let store = InMemoryStore::with_clock(clock.clone());
        store
            .commit_batch(&[WriteOp::UpsertFile(file_op("f1", 1, Some("2026-01-01")))])
            .await
            .unwrap();

        clock.advance(Duration::seconds(5));
        let mut second = file_op("f1", 2, None);
        second.name = "renamed.jpg".into();
        store
            .commit_batch(&[WriteOp::UpsertFile(second)])
            .await
            .unwrap();

        let files = store.all_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "renamed.jpg");
        assert_eq!(files[0].created_time.as_deref(), Some("2026-01-01"));
        assert_eq!(files[0].generation, Some(2));
        assert_eq!(files[0].updated_at, 105);
    }

    #[tokio::test]
    async fn stale_records_include_missing_generation() {
        let store = InMemoryStore::new();
        store
            .commit_batch(&[
                WriteOp::UpsertFile(file_op("old", 1, None)),
                WriteOp::UpsertFile(file_op("new", 2, None)),
            ])
            .await
            .unwrap();
        store.seed_folder(FolderRecord {
            id: "legacy".into(),
            name: "legacy".into(),
            parent_id: None,
            root_id: "R".into(),
            drive_id: None,
            generation: None,
            updated_at: 0,
        });

        let mut stale: Vec<String> = store
            .stale_records("R", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.id)
            .collect();
        stale.sort();
        assert_eq!(stale, vec!["legacy", "old"]);
        assert!(store.stale_records("other-root", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_commit_failure_applies_nothing() {
        let store = InMemoryStore::new();
        store.fail_commit(1);
        let err = store
            .commit_batch(&[WriteOp::UpsertFile(file_op("f1", 1, None))])
            .await;
        assert!(err.is_err());
        assert!(store.all_files().is_empty());
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn lease_lifecycle() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.acquire_lease("R", 10, 1_000, 300).await.unwrap(),
            LeaseOutcome::Acquired
        );
        // renewal by the holder
        assert_eq!(
            store.acquire_lease("R", 10, 1_100, 300).await.unwrap(),
            LeaseOutcome::Acquired
        );
        // competing generation while live
        assert_eq!(
            store.acquire_lease("R", 11, 1_200, 300).await.unwrap(),
            LeaseOutcome::Held { generation: 10 }
        );
        // after expiry (1_100 + 300)
        assert_eq!(
            store.acquire_lease("R", 11, 1_400, 300).await.unwrap(),
            LeaseOutcome::Acquired
        );
        // release by a non-holder is ignored
        store.release_lease("R", 10).await.unwrap();
        assert_eq!(
            store.acquire_lease("R", 12, 1_450, 300).await.unwrap(),
            LeaseOutcome::Held { generation: 11 }
        );
        store.release_lease("R", 11).await.unwrap();
        assert_eq!(
            store.acquire_lease("R", 12, 1_450, 300).await.unwrap(),
            LeaseOutcome::Acquired
        );
    }

    #[tokio::test]
    async fn expired_lease_is_not_granted_to_an_older_generation() {
        let store = InMemoryStore::new();
        store.acquire_lease("R", 20, 1_000, 300).await.unwrap();
        assert_eq!(
            store.acquire_lease("R", 10, 2_000, 300).await.unwrap(),
            LeaseOutcome::Superseded { generation: 20 }
        );
        // the holder's generation is remembered after release
        store.release_lease("R", 20).await.unwrap();
        assert_eq!(
            store.acquire_lease("R", 10, 2_001, 300).await.unwrap(),
            LeaseOutcome::Superseded { generation: 20 }
        );
        assert_eq!(
            store.acquire_lease("R", 21, 2_001, 300).await.unwrap(),
            LeaseOutcome::Acquired
        );
    }

    #[tokio::test]
    async fn upsert_never_lowers_generation() {
        let store = InMemoryStore::new();
        store.seed_file(merge_file(None, &file_op("f1", 5, None), 0));
        store
            .commit_batch(&[WriteOp::UpsertFile(file_op("f1", 3, None))])
            .await
            .unwrap();
        assert_eq!(store.all_files()[0].generation, Some(5));
    }

    #[tokio::test]
    async fn meta_generation_never_regresses() {
        let store = InMemoryStore::new();
        let meta = |g| MetaRecord {
            root_id: "R".into(),
            drive_id: None,
            last_generation: g,
            last_run_by: Some("ops@example.org".into()),
            last_run_at: 0,
        };
        store.put_meta(&meta(5)).await.unwrap();
        store.put_meta(&meta(3)).await.unwrap();
        assert_eq!(store.get_meta("R").await.unwrap().unwrap().last_generation, 5);
    }
}
