//! Remote file-tree provider abstraction.
//!
//! The provider only exposes the tree through parent-pointer listings with
//! opaque page tokens. The [`TreeProvider`] trait captures exactly that, so
//! the crawl engine and the query traversal can run against the real Drive
//! API ([`drive::DriveClient`]) or an in-memory tree
//! ([`memory::InMemoryTree`]).

pub mod drive;
pub mod memory;
pub mod query;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{RemoteEntry, SortOrder};

pub use query::ProviderQuery;

/// One listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: ProviderQuery,
    pub page_token: Option<String>,
    pub page_size: u32,
    /// Order by creation time; `None` leaves the provider's default order.
    pub order: Option<SortOrder>,
}

impl ListRequest {
    pub fn new(query: ProviderQuery, page_size: u32) -> Self {
        Self {
            query,
            page_token: None,
            page_size,
            order: None,
        }
    }

    pub fn page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// A source of parent-pointer listings.
#[async_trait]
pub trait TreeProvider: Send + Sync {
    /// List one page of entries matching `request.query`.
    async fn list_children(&self, request: &ListRequest) -> Result<ListPage, ProviderError>;
}
