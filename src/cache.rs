//! Time-boxed memoization of indexed folder listings.
//!
//! Keyed by `(folder, scope)`; each entry remembers when it was filled and
//! is ignored once older than the TTL. Nothing invalidates entries when the
//! crawler writes: readers accept results up to one TTL stale. The cache is
//! an explicit dependency with an injected [`Clock`], never a global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::models::{FileRecord, SearchScope};

type Key = (String, SearchScope);

struct Entry {
    filled_at: DateTime<Utc>,
    files: Arc<Vec<FileRecord>>,
}

pub struct FolderCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl FolderCache {
    /// A `ttl_secs` of zero disables caching.
    pub fn new(ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.max(0)),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, folder_id: &str, scope: SearchScope) -> Option<Arc<Vec<FileRecord>>> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&(folder_id.to_string(), scope))
            .filter(|e| now - e.filled_at < self.ttl)
            .map(|e| Arc::clone(&e.files))
    }

    pub fn insert(
        &self,
        folder_id: &str,
        scope: SearchScope,
        files: Vec<FileRecord>,
    ) -> Arc<Vec<FileRecord>> {
        let files = Arc::new(files);
        if self.ttl <= Duration::zero() {
            return files;
        }
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| now - e.filled_at < self.ttl);
        entries.insert(
            (folder_id.to_string(), scope),
            Entry {
                filled_at: now,
                files: Arc::clone(&files),
            },
        );
        files
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
