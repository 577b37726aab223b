//! Generation sweep.
//!
//! Runs once a non-dry crawl reaches quiescence. Every folder or file
//! record under the root whose generation is absent or older than the
//! generation that just completed was not seen by that crawl: it was
//! deleted, trashed, or moved out of the root. Those records are removed
//! through the same batched write path the crawl uses.

use tracing::info;

use crate::buffer::WriteBuffer;
use crate::error::StoreError;
use crate::models::WriteOp;
use crate::store::IndexStore;

/// Delete records stamped before `generation`. Returns the number deleted.
pub async fn sweep_stale(
    store: &dyn IndexStore,
    root_id: &str,
    generation: i64,
    batch_size: usize,
) -> Result<u64, StoreError> {
    let stale = store.stale_records(root_id, generation).await?;
    if stale.is_empty() {
        return Ok(0);
    }

    let mut buffer = WriteBuffer::new(batch_size, false);
    for key in stale {
        buffer.enqueue(WriteOp::Delete(key));
    }
    buffer.flush(store).await?;

    let deleted = buffer.committed();
    info!(root = root_id, generation, deleted, "swept stale records");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FolderUpsert;
    use crate::store::memory::InMemoryStore;

    fn folder(id: &str, generation: i64) -> WriteOp {
        WriteOp::UpsertFolder(FolderUpsert {
            id: id.into(),
            name: id.into(),
            parent_id: Some("R".into()),
            root_id: "R".into(),
            drive_id: None,
            generation,
        })
    }

    #[tokio::test]
    async fn deletes_only_older_generations() {
        let store = InMemoryStore::new();
        store
            .commit_batch(&[folder("old", 1), folder("kept", 2), folder("future", 3)])
            .await
            .unwrap();

        let deleted = sweep_stale(&store, "R", 2, 450).await.unwrap();
        assert_eq!(deleted, 1);
        let ids: Vec<String> = store.all_folders().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["future", "kept"]);
    }

    #[tokio::test]
    async fn large_sweeps_are_batched() {
        let store = InMemoryStore::new();
        let ops: Vec<WriteOp> = (0..25).map(|i| folder(&format!("d{:02}", i), 1)).collect();
        store.commit_batch(&ops).await.unwrap();
        let before = store.commits();

        let deleted = sweep_stale(&store, "R", 2, 10).await.unwrap();
        assert_eq!(deleted, 25);
        assert_eq!(store.commits() - before, 3);
        assert!(store.all_folders().is_empty());
    }
}
