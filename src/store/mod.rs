//! Document store abstraction.
//!
//! The [`IndexStore`] trait defines every storage operation the crawl
//! engine, the generation sweep, and the indexed query path need, so the
//! same code runs against SQLite in production and an in-memory store in
//! tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Write semantics
//!
//! Upserts are merge-upserts keyed by record id: a missing record is
//! created, an existing one has the supplied fields overlaid, and optional
//! fields the op leaves as `None` keep their stored value. A record's
//! generation never moves backwards. The write timestamp is assigned by the store, never taken from the op.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{FileRecord, FolderRecord, LeaseOutcome, MetaRecord, RecordKey, WriteOp};

/// Abstract storage backend for the index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`commit_batch`](IndexStore::commit_batch) | Apply upserts/deletes atomically |
/// | [`stale_records`](IndexStore::stale_records) | Records older than a generation |
/// | [`folders_for_root`](IndexStore::folders_for_root) | All folders under a root |
/// | [`files_for_root`](IndexStore::files_for_root) | All files under a root |
/// | [`files_in_folder`](IndexStore::files_in_folder) | Files directly in one folder |
/// | [`get_meta`](IndexStore::get_meta) / [`put_meta`](IndexStore::put_meta) | Last completed crawl |
/// | [`acquire_lease`](IndexStore::acquire_lease) / [`release_lease`](IndexStore::release_lease) | Single active crawl per root |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Apply every op in one atomic transaction.
    async fn commit_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError>;

    /// Keys of records under `root_id` whose generation is absent or
    /// strictly less than `generation`.
    async fn stale_records(
        &self,
        root_id: &str,
        generation: i64,
    ) -> Result<Vec<RecordKey>, StoreError>;

    async fn folders_for_root(&self, root_id: &str) -> Result<Vec<FolderRecord>, StoreError>;

    async fn files_for_root(&self, root_id: &str) -> Result<Vec<FileRecord>, StoreError>;

    async fn files_in_folder(
        &self,
        root_id: &str,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, StoreError>;

    async fn get_meta(&self, root_id: &str) -> Result<Option<MetaRecord>, StoreError>;

    /// Upsert the meta record. `last_generation` never moves backwards.
    async fn put_meta(&self, meta: &MetaRecord) -> Result<(), StoreError>;

    /// Take or renew the crawl lease for `root_id`.
    ///
    /// Granted when no lease exists, it is already held by `generation`
    /// (renewal), or it expired at or before `now` and was held by an older
    /// generation. An expired lease of a newer generation yields
    /// [`LeaseOutcome::Superseded`]. A granted lease expires at
    /// `now + ttl_secs`.
    async fn acquire_lease(
        &self,
        root_id: &str,
        generation: i64,
        now: i64,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome, StoreError>;

    /// Expire the lease if `generation` still holds it. The holder's
    /// generation stays on record.
    async fn release_lease(&self, root_id: &str, generation: i64) -> Result<(), StoreError>;
}
