//! Folder browsing for navigation UIs.
//!
//! [`indexed_folders`] returns the whole indexed folder tree for the root
//! so a client can render it without touching the provider.
//! [`live_children`] lists one folder's immediate sub-folders straight from
//! the provider, following page tokens to the end.

use crate::error::QueryError;
use crate::models::FolderEntry;
use crate::provider::{ListRequest, ProviderQuery, TreeProvider};
use crate::store::IndexStore;

/// Page size used when paging through sub-folders.
const CHILD_PAGE_SIZE: u32 = 1000;

/// Every indexed folder under `root_id`, sorted by name (then id).
pub async fn indexed_folders(
    store: &dyn IndexStore,
    root_id: &str,
) -> Result<Vec<FolderEntry>, QueryError> {
    let mut folders: Vec<FolderEntry> = store
        .folders_for_root(root_id)
        .await?
        .into_iter()
        .map(|f| FolderEntry {
            id: f.id,
            name: f.name,
            parent_id: f.parent_id,
        })
        .collect();
    sort_by_name(&mut folders);
    Ok(folders)
}

/// Immediate sub-folders of `parent_id`, live from the provider.
pub async fn live_children(
    provider: &dyn TreeProvider,
    parent_id: &str,
) -> Result<Vec<FolderEntry>, QueryError> {
    let mut request = ListRequest::new(
        ProviderQuery::children_of(parent_id).folders_only(),
        CHILD_PAGE_SIZE,
    );
    let mut folders = Vec::new();

    loop {
        let page = provider.list_children(&request).await?;
        folders.extend(
            page.entries
                .into_iter()
                .filter(|e| e.is_folder())
                .map(|e| FolderEntry {
                    name: e.display_name().to_string(),
                    parent_id: Some(parent_id.to_string()),
                    id: e.id,
                }),
        );
        match page.next_page_token {
            Some(token) => request = request.page_token(Some(token)),
            None => break,
        }
    }

    sort_by_name(&mut folders);
    Ok(folders)
}

fn sort_by_name(folders: &mut [FolderEntry]) {
    folders.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::InMemoryTree;

    #[tokio::test]
    async fn live_children_pages_and_sorts() {
        let tree = InMemoryTree::new().with_page_cap(1);
        tree.add_folder("c", "charlie", "root");
        tree.add_folder("a", "Alpha", "root");
        tree.add_folder("b", "bravo", "root");
        tree.add_file("f", "file.jpg", "image/jpeg", "root", None);
        tree.add_folder("deep", "Deep", "a");

        let names: Vec<String> = live_children(&tree, "root")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "bravo", "charlie"]);
    }
}
