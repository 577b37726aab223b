//! In-memory [`TreeProvider`] for tests and offline runs.
//!
//! Holds a flat list of entries with parent pointers and serves listings
//! with numeric page tokens. Page size can be capped below what callers
//! request to exercise multi-page folders, and failures can be injected to
//! exercise abort-and-resume paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{RemoteEntry, SortOrder, FOLDER_MIME};

use super::{ListPage, ListRequest, TreeProvider};

/// In-memory remote tree.
#[derive(Default)]
pub struct InMemoryTree {
    entries: RwLock<Vec<RemoteEntry>>,
    trashed: RwLock<HashSet<String>>,
    page_cap: Option<usize>,
    fail_on_call: Mutex<HashSet<usize>>,
    calls: AtomicUsize,
}

impl InMemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve at most `cap` entries per page regardless of the request.
    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = Some(cap.max(1));
        self
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) -> &Self {
        self.push(RemoteEntry {
            id: id.to_string(),
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME.to_string()),
            parents: vec![parent.to_string()],
            ..Default::default()
        })
    }

    pub fn add_file(
        &self,
        id: &str,
        name: &str,
        mime: &str,
        parent: &str,
        created: Option<&str>,
    ) -> &Self {
        self.push(RemoteEntry {
            id: id.to_string(),
            name: Some(name.to_string()),
            mime_type: Some(mime.to_string()),
            parents: vec![parent.to_string()],
            created_time: created.map(str::to_string),
            modified_time: created.map(str::to_string),
            web_view_link: Some(format!("https://drive.example/file/{}", id)),
        })
    }

    pub fn push(&self, entry: RemoteEntry) -> &Self {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        self
    }

    /// Delete an entry outright.
    pub fn remove(&self, id: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|e| e.id != id);
    }

    pub fn trash(&self, id: &str) {
        self.trashed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
    }

    pub fn rename(&self, id: &str, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            e.name = Some(name.to_string());
        }
    }

    pub fn move_to(&self, id: &str, new_parent: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            e.parents = vec![new_parent.to_string()];
        }
    }

    /// Make the listing call with this 1-based sequence number fail with a
    /// transient error.
    pub fn fail_call(&self, n: usize) {
        self.fail_on_call
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(n);
    }

    /// Number of listing calls served so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeProvider for InMemoryTree {
    async fn list_children(&self, request: &ListRequest) -> Result<ListPage, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_on_call
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&call)
        {
            return Err(ProviderError::Transient(format!(
                "injected failure on call {}",
                call
            )));
        }

        let start = match request.page_token.as_deref() {
            None => 0,
            Some(t) => t
                .strip_prefix('p')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ProviderError::Rejected {
                    status: 400,
                    message: format!("invalid page token: {}", t),
                })?,
        };

        let trashed = self.trashed.read().unwrap_or_else(|e| e.into_inner());
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<RemoteEntry> = entries
            .iter()
            .filter(|e| !trashed.contains(&e.id))
            .filter(|e| request.query.matches(e))
            .cloned()
            .collect();

        match request.order {
            Some(SortOrder::NewestFirst) => {
                matching.sort_by(|a, b| b.created_time.cmp(&a.created_time))
            }
            Some(SortOrder::OldestFirst) => {
                matching.sort_by(|a, b| a.created_time.cmp(&b.created_time))
            }
            None => {}
        }

        let mut size = request.page_size.max(1) as usize;
        if let Some(cap) = self.page_cap {
            size = size.min(cap);
        }
        let end = (start + size).min(matching.len());
        let page: Vec<RemoteEntry> = matching
            .get(start..end)
            .map(<[RemoteEntry]>::to_vec)
            .unwrap_or_default();
        let next_page_token = (end < matching.len()).then(|| format!("p{}", end));

        Ok(ListPage {
            entries: page,
            next_page_token,
        })
    }
}
