//! Media queries: live recursive walk, live flat listing, indexed search.
//!
//! # Live queries (`query-media`)
//!
//! With `recursive=1` the query walks the folder tree breadth-first
//! straight from the provider, filtering each file locally, until a page of
//! results is full. Progress lives in a [`WalkCursor`] so the next request
//! resumes at the exact entry where the last one stopped. Provider pages
//! are fetched in `internal_page_size` chunks regardless of the output page
//! size.
//!
//! Without `recursive` it lists one folder, pushing the name and MIME
//! filters down to the provider and passing the provider's page token
//! through as `nextPageToken`.
//!
//! # Indexed search (`search-media`)
//!
//! Reads the records the crawler stored instead of calling the provider.
//! The unfiltered file set for a `(folder, scope)` pair is memoized in the
//! [`FolderCache`]; filters, sorting, and offset pagination run over it.
//!
//! Inputs are always coerced: unknown types mean "all", unknown sorts mean
//! newest first, bad page sizes fall back to the default. Only backend
//! failures surface as errors.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::FolderCache;
use crate::config::{Config, QueryConfig};
use crate::cursor::{self, OffsetCursor, WalkCursor};
use crate::error::QueryError;
use crate::models::{
    FileRecord, MediaItem, MediaType, RemoteEntry, SearchScope, SortOrder, UNTITLED,
};
use crate::provider::{ListRequest, ProviderQuery, TreeProvider};
use crate::store::IndexStore;
use crate::tags::{extract_tags, has_all_tags, parse_tag_list};

/// Raw query parameters, as received over HTTP or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaParams {
    pub folder_id: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub sort: Option<String>,
    pub tags: Option<String>,
    pub recursive: Option<String>,
    pub cursor: Option<String>,
    pub page_token: Option<String>,
    pub page_size: Option<String>,
    pub scope: Option<String>,
    /// `sub=0` is an alias for `scope=flat`.
    pub sub: Option<String>,
}

/// Coerced filters shared by every query mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFilter {
    /// Trimmed; empty means no text filter.
    pub text: String,
    /// `None` means every media type.
    pub media_type: Option<MediaType>,
    pub sort: SortOrder,
    pub tags: Vec<String>,
    pub page_size: usize,
}

impl MediaFilter {
    pub fn from_params(params: &MediaParams, config: &QueryConfig) -> Self {
        Self {
            text: params.text.as_deref().unwrap_or("").trim().to_string(),
            media_type: params.media_type.as_deref().and_then(|t| MediaType::parse(t.trim())),
            sort: params
                .sort
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
            tags: params
                .tags
                .as_deref()
                .map(parse_tag_list)
                .unwrap_or_default(),
            page_size: config.clamp_page_size(params.page_size.as_deref()),
        }
    }

    fn type_matches(&self, media_type: MediaType) -> bool {
        self.media_type.map_or(true, |t| t == media_type)
    }

    fn name_matches(&self, name: &str) -> bool {
        self.text.is_empty() || name.to_lowercase().contains(&self.text.to_lowercase())
    }

    /// Text matches the title or any tag, case-insensitively.
    fn text_matches_item(&self, item: &MediaItem) -> bool {
        if self.text.is_empty() {
            return true;
        }
        let needle = self.text.to_lowercase();
        item.title.to_lowercase().contains(&needle) || item.tags.iter().any(|t| t.contains(&needle))
    }
}

/// A page of live query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MediaPage {
    /// Recursive walk; `nextCursor` is null once the subtree is exhausted.
    Walk {
        items: Vec<MediaItem>,
        #[serde(rename = "nextCursor")]
        next_cursor: Option<String>,
    },
    /// Single-folder provider listing.
    Listing {
        items: Vec<MediaItem>,
        #[serde(rename = "nextPageToken")]
        next_page_token: Option<String>,
    },
}

impl MediaPage {
    pub fn items(&self) -> &[MediaItem] {
        match self {
            MediaPage::Walk { items, .. } | MediaPage::Listing { items, .. } => items,
        }
    }

    /// The token to pass back for the next page, whichever kind it is.
    pub fn continuation(&self) -> Option<&str> {
        match self {
            MediaPage::Walk { next_cursor, .. } => next_cursor.as_deref(),
            MediaPage::Listing {
                next_page_token, ..
            } => next_page_token.as_deref(),
        }
    }
}

/// A page of indexed search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<MediaItem>,
    pub next_cursor: Option<String>,
    /// Matches across all pages.
    pub total: usize,
}

fn folder_or_root<'a>(params: &'a MediaParams, root_id: &'a str) -> &'a str {
    params
        .folder_id
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(root_id)
}

/// Live queries against the provider, plus the indexed search.
pub struct MediaService {
    provider: Arc<dyn TreeProvider>,
    index: IndexedSearch,
    root_id: String,
    config: QueryConfig,
}

impl MediaService {
    pub fn new(
        config: &Config,
        provider: Arc<dyn TreeProvider>,
        store: Arc<dyn IndexStore>,
        cache: Arc<FolderCache>,
    ) -> Self {
        Self {
            provider,
            index: IndexedSearch::new(config, store, cache),
            root_id: config.provider.root_folder_id.clone(),
            config: config.query.clone(),
        }
    }

    /// `search-media`; see [`IndexedSearch::search`].
    pub async fn search_indexed(&self, params: &MediaParams) -> Result<SearchPage, QueryError> {
        self.index.search(params).await
    }

    /// `query-media`: live walk when `recursive=1`, else a single-folder listing.
    pub async fn query_media(&self, params: &MediaParams) -> Result<MediaPage, QueryError> {
        let filter = MediaFilter::from_params(params, &self.config);
        let folder = folder_or_root(params, &self.root_id).to_string();
        if params.recursive.as_deref().map(str::trim) == Some("1") {
            self.walk(&folder, &filter, params.cursor.as_deref()).await
        } else {
            self.list_folder(&folder, &filter, params.page_token.as_deref())
                .await
        }
    }

    async fn list_folder(
        &self,
        folder: &str,
        filter: &MediaFilter,
        page_token: Option<&str>,
    ) -> Result<MediaPage, QueryError> {
        let query = ProviderQuery::children_of(folder)
            .files_only()
            .name_contains(&filter.text)
            .media_type(filter.media_type);
        let request = ListRequest::new(query, filter.page_size as u32)
            .page_token(page_token.filter(|t| !t.is_empty()).map(str::to_string))
            .order(filter.sort);
        let page = self.provider.list_children(&request).await?;

        let items = page
            .entries
            .iter()
            .filter(|e| !e.is_folder() && filter.type_matches(e.media_type()))
            .map(|e| self.item_from_entry(e))
            .filter(|item| has_all_tags(&item.tags, &filter.tags))
            .collect();

        Ok(MediaPage::Listing {
            items,
            next_page_token: page.next_page_token,
        })
    }

    async fn walk(
        &self,
        folder: &str,
        filter: &MediaFilter,
        token: Option<&str>,
    ) -> Result<MediaPage, QueryError> {
        let mut state =
            cursor::decode_opt::<WalkCursor>(token).unwrap_or_else(|| WalkCursor::new(folder));
        let mut items = Vec::new();

        'walk: while items.len() < filter.page_size {
            let current = match state.current.clone() {
                Some(current) => current,
                None => {
                    if state.queue.is_empty() {
                        break;
                    }
                    let next = state.queue.remove(0);
                    state.current = Some(next.clone());
                    state.page_token = None;
                    state.offset = 0;
                    next
                }
            };

            // Folders must always be listed so the walk can descend; the
            // name filter is applied locally to files only.
            let request = ListRequest::new(
                ProviderQuery::children_of(&current),
                self.config.internal_page_size,
            )
            .page_token(state.page_token.clone())
            .order(filter.sort);
            let page = self.provider.list_children(&request).await?;
            debug!(folder = %current, entries = page.entries.len(), "walk listed page");

            let start = state.offset.min(page.entries.len());
            for (index, entry) in page.entries.iter().enumerate().skip(start) {
                if entry.is_folder() {
                    state.queue.push(entry.id.clone());
                } else if filter.type_matches(entry.media_type())
                    && filter.name_matches(entry.display_name())
                {
                    let item = self.item_from_entry(entry);
                    if has_all_tags(&item.tags, &filter.tags) {
                        items.push(item);
                    }
                }

                if items.len() >= filter.page_size && index + 1 < page.entries.len() {
                    state.offset = index + 1;
                    break 'walk;
                }
            }

            state.offset = 0;
            match page.next_page_token {
                Some(next) => state.page_token = Some(next),
                None => {
                    state.current = None;
                    state.page_token = None;
                }
            }
        }

        let next_cursor = (!state.is_exhausted()).then(|| cursor::encode(&state));
        Ok(MediaPage::Walk { items, next_cursor })
    }

    fn item_from_entry(&self, entry: &RemoteEntry) -> MediaItem {
        let title = entry.display_name().to_string();
        MediaItem {
            id: entry.id.clone(),
            tags: extract_tags(&title),
            title,
            media_type: entry.media_type(),
            thumb_url: self.config.thumb_url(&entry.id),
            view_url: entry.web_view_link.clone(),
            created_at: entry.created_time.clone(),
        }
    }
}

/// Search over the records the crawler stored. Never calls the provider.
pub struct IndexedSearch {
    store: Arc<dyn IndexStore>,
    cache: Arc<FolderCache>,
    root_id: String,
    config: QueryConfig,
}

impl IndexedSearch {
    pub fn new(config: &Config, store: Arc<dyn IndexStore>, cache: Arc<FolderCache>) -> Self {
        Self {
            store,
            cache,
            root_id: config.provider.root_folder_id.clone(),
            config: config.query.clone(),
        }
    }

    /// Filtered, sorted, offset-paginated search. `folderId` defaults to the
    /// root; `scope=flat` (or `sub=0`) restricts it to direct children.
    pub async fn search(&self, params: &MediaParams) -> Result<SearchPage, QueryError> {
        let filter = MediaFilter::from_params(params, &self.config);
        let folder = folder_or_root(params, &self.root_id).to_string();
        let scope = if params.sub.as_deref().map(str::trim) == Some("0") {
            SearchScope::Flat
        } else {
            params
                .scope
                .as_deref()
                .map(SearchScope::parse)
                .unwrap_or_default()
        };

        let files = match self.cache.get(&folder, scope) {
            Some(files) => files,
            None => {
                let loaded = self.load_scope(&folder, scope).await?;
                debug!(folder = %folder, ?scope, files = loaded.len(), "filled folder cache");
                self.cache.insert(&folder, scope, loaded)
            }
        };

        let mut matched: Vec<(i64, MediaItem)> = files
            .iter()
            .filter(|f| filter.type_matches(f.media_type))
            .map(|f| (created_millis(f.created_time.as_deref()), item_from_record(f)))
            .filter(|(_, item)| filter.text_matches_item(item))
            .filter(|(_, item)| has_all_tags(&item.tags, &filter.tags))
            .collect();

        match filter.sort {
            SortOrder::NewestFirst => matched.sort_by(|a, b| b.0.cmp(&a.0)),
            SortOrder::OldestFirst => matched.sort_by(|a, b| a.0.cmp(&b.0)),
        }

        let total = matched.len();
        let start = cursor::decode_opt::<OffsetCursor>(params.cursor.as_deref())
            .map_or(0, |c| c.offset)
            .min(total);
        let end = (start + filter.page_size).min(total);
        let items = matched
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(|(_, item)| item)
            .collect();
        let next_cursor = (end < total).then(|| cursor::encode(&OffsetCursor { offset: end }));

        Ok(SearchPage {
            items,
            next_cursor,
            total,
        })
    }

    async fn load_scope(
        &self,
        folder: &str,
        scope: SearchScope,
    ) -> Result<Vec<FileRecord>, QueryError> {
        let files = match scope {
            SearchScope::Flat => self.store.files_in_folder(&self.root_id, folder).await?,
            SearchScope::Subtree if folder == self.root_id => {
                self.store.files_for_root(&self.root_id).await?
            }
            SearchScope::Subtree => {
                let folders = self.store.folders_for_root(&self.root_id).await?;
                let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
                for f in &folders {
                    if let Some(parent) = f.parent_id.as_deref() {
                        children.entry(parent).or_default().push(&f.id);
                    }
                }

                let mut subtree: HashSet<&str> = HashSet::from([folder]);
                let mut pending: VecDeque<&str> = VecDeque::from([folder]);
                while let Some(next) = pending.pop_front() {
                    for &child in children.get(next).into_iter().flatten() {
                        if subtree.insert(child) {
                            pending.push_back(child);
                        }
                    }
                }

                self.store
                    .files_for_root(&self.root_id)
                    .await?
                    .into_iter()
                    .filter(|f| {
                        f.parent_id
                            .as_deref()
                            .is_some_and(|p| subtree.contains(p))
                    })
                    .collect()
            }
        };
        Ok(files)
    }
}

fn item_from_record(file: &FileRecord) -> MediaItem {
    let title = if file.name.is_empty() {
        UNTITLED.to_string()
    } else {
        file.name.clone()
    };
    MediaItem {
        id: file.id.clone(),
        tags: extract_tags(&title),
        title,
        media_type: file.media_type,
        thumb_url: file.thumb_url.clone(),
        view_url: file.view_url.clone(),
        created_at: file.created_time.clone(),
    }
}

/// Creation time as epoch millis; missing or unparseable sorts as 0.
fn created_millis(created: Option<&str>) -> i64 {
    created
        .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
        .map_or(0, |t| t.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_coercion() {
        let config = QueryConfig::default();
        let params = MediaParams {
            text: Some("  beach ".into()),
            media_type: Some("sticker".into()),
            sort: Some("sideways".into()),
            tags: Some("2026, HackUTD,,".into()),
            page_size: Some("0".into()),
            ..Default::default()
        };
        let f = MediaFilter::from_params(&params, &config);
        assert_eq!(f.text, "beach");
        assert_eq!(f.media_type, None);
        assert_eq!(f.sort, SortOrder::NewestFirst);
        assert_eq!(f.tags, vec!["2026", "hackutd"]);
        assert_eq!(f.page_size, 60);
    }

    #[test]
    fn created_time_parsing() {
        assert_eq!(created_millis(None), 0);
        assert_eq!(created_millis(Some("yesterday")), 0);
        assert_eq!(created_millis(Some("1970-01-01T00:00:01.500Z")), 1500);
    }

    #[test]
    fn pages_serialize_with_their_own_token_names() {
        let walk = MediaPage::Walk {
            items: vec![],
            next_cursor: None,
        };
        let json = serde_json::to_value(&walk).unwrap();
        assert!(json["nextCursor"].is_null());
        assert!(json.get("nextPageToken").is_none());

        let listing = MediaPage::Listing {
            items: vec![],
            next_page_token: Some("t".into()),
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["nextPageToken"], "t");
    }
}
