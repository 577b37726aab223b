//! Batched write buffer between the crawl engine and the store.
//!
//! Ops accumulate in memory and are committed in chunks of at most
//! `batch_size`, each chunk atomically. A dry-run buffer never touches the
//! store. A failed flush leaves every unflushed op (including the failed
//! chunk) pending and returns the error; retry happens through cursor
//! resumption, not here.

use tracing::debug;

use crate::error::StoreError;
use crate::models::WriteOp;
use crate::store::IndexStore;

pub struct WriteBuffer {
    pending: Vec<WriteOp>,
    batch_size: usize,
    dry_run: bool,
    committed: u64,
}

impl WriteBuffer {
    pub fn new(batch_size: usize, dry_run: bool) -> Self {
        Self {
            pending: Vec::new(),
            batch_size: batch_size.max(1),
            dry_run,
            committed: 0,
        }
    }

    pub fn enqueue(&mut self, op: WriteOp) {
        self.pending.push(op);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True once a full batch is waiting.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Ops committed to the store over this buffer's lifetime.
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Commit pending ops in batches. Dry-run buffers just discard them.
    pub async fn flush(&mut self, store: &dyn IndexStore) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            debug!(discarded = self.pending.len(), "dry run: skipping flush");
            self.pending.clear();
            return Ok(());
        }

        while !self.pending.is_empty() {
            let take = self.pending.len().min(self.batch_size);
            store.commit_batch(&self.pending[..take]).await?;
            self.pending.drain(..take);
            self.committed += take as u64;
            debug!(batch = take, remaining = self.pending.len(), "committed batch");
        }
        Ok(())
    }
}
