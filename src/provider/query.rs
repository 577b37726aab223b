//! Structured provider filter.
//!
//! Listing filters are assembled from typed clauses and rendered into the
//! provider's query language in one place. Every user- or provider-supplied
//! string goes through [`quote_literal`], so names containing quotes or
//! backslashes cannot change the shape of the query.

use crate::models::{MediaType, RemoteEntry, FOLDER_MIME};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    InParents(String),
    NotTrashed,
    IsFolder,
    NotFolder,
    NameContains(String),
    MimeEquals(String),
    MimeNotEquals(String),
    MimeContains(String),
}

/// A conjunction of listing clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderQuery {
    clauses: Vec<Clause>,
}

/// Quote a string literal for the provider query language.
///
/// Backslashes and single quotes are escaped with a backslash and the
/// result is wrapped in single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

impl ProviderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-trashed immediate children of `parent`.
    pub fn children_of(parent: &str) -> Self {
        Self::new().in_parents(parent).not_trashed()
    }

    pub fn in_parents(mut self, parent: &str) -> Self {
        self.clauses.push(Clause::InParents(parent.to_string()));
        self
    }

    pub fn not_trashed(mut self) -> Self {
        self.clauses.push(Clause::NotTrashed);
        self
    }

    pub fn folders_only(mut self) -> Self {
        self.clauses.push(Clause::IsFolder);
        self
    }

    pub fn files_only(mut self) -> Self {
        self.clauses.push(Clause::NotFolder);
        self
    }

    /// Adds a name filter; blank text adds nothing.
    pub fn name_contains(mut self, text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() {
            self.clauses.push(Clause::NameContains(text.to_string()));
        }
        self
    }

    pub fn mime_equals(mut self, mime: &str) -> Self {
        self.clauses.push(Clause::MimeEquals(mime.to_string()));
        self
    }

    pub fn mime_not_equals(mut self, mime: &str) -> Self {
        self.clauses.push(Clause::MimeNotEquals(mime.to_string()));
        self
    }

    pub fn mime_contains(mut self, fragment: &str) -> Self {
        self.clauses.push(Clause::MimeContains(fragment.to_string()));
        self
    }

    /// Narrow to one derived media type. `Other` has no MIME expression
    /// and is left to client-side filtering.
    pub fn media_type(self, media_type: Option<MediaType>) -> Self {
        match media_type {
            Some(MediaType::Photo) => self.mime_contains("image/").mime_not_equals("image/gif"),
            Some(MediaType::Gif) => self.mime_equals("image/gif"),
            Some(MediaType::Video) => self.mime_contains("video/"),
            Some(MediaType::Other) | None => self,
        }
    }

    /// The parent this query is scoped to, if any.
    pub fn parent(&self) -> Option<&str> {
        self.clauses.iter().find_map(|c| match c {
            Clause::InParents(p) => Some(p.as_str()),
            _ => None,
        })
    }

    /// Render to the provider's query language.
    pub fn render(&self) -> String {
        self.clauses
            .iter()
            .map(|c| match c {
                Clause::InParents(p) => format!("{} in parents", quote_literal(p)),
                Clause::NotTrashed => "trashed = false".to_string(),
                Clause::IsFolder => format!("mimeType = {}", quote_literal(FOLDER_MIME)),
                Clause::NotFolder => format!("mimeType != {}", quote_literal(FOLDER_MIME)),
                Clause::NameContains(t) => format!("name contains {}", quote_literal(t)),
                Clause::MimeEquals(m) => format!("mimeType = {}", quote_literal(m)),
                Clause::MimeNotEquals(m) => format!("mimeType != {}", quote_literal(m)),
                Clause::MimeContains(m) => format!("mimeType contains {}", quote_literal(m)),
            })
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Evaluate the query against an entry locally. Trash state is not
    /// part of [`RemoteEntry`]; callers holding trashed entries must drop
    /// them before matching. Name matching is case-insensitive.
    pub fn matches(&self, entry: &RemoteEntry) -> bool {
        self.clauses.iter().all(|c| match c {
            Clause::InParents(p) => entry.parents.iter().any(|x| x == p),
            Clause::NotTrashed => true,
            Clause::IsFolder => entry.is_folder(),
            Clause::NotFolder => !entry.is_folder(),
            Clause::NameContains(t) => entry
                .display_name()
                .to_lowercase()
                .contains(&t.to_lowercase()),
            Clause::MimeEquals(m) => entry.mime() == m,
            Clause::MimeNotEquals(m) => entry.mime() != m,
            Clause::MimeContains(m) => entry.mime().contains(m.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_quotes_and_backslashes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), r"'it\'s'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
        assert_eq!(quote_literal(r"\'"), r"'\\\''");
    }

    #[test]
    fn children_query_renders() {
        let q = ProviderQuery::children_of("abc123");
        assert_eq!(q.render(), "'abc123' in parents and trashed = false");
        assert_eq!(q.parent(), Some("abc123"));
    }

    #[test]
    fn hostile_name_stays_inside_literal() {
        let q = ProviderQuery::children_of("root").name_contains("x' or name contains '");
        assert_eq!(
            q.render(),
            r"'root' in parents and trashed = false and name contains 'x\' or name contains \''"
        );
    }

    #[test]
    fn blank_name_filter_is_dropped() {
        assert_eq!(
            ProviderQuery::children_of("r").name_contains("   "),
            ProviderQuery::children_of("r")
        );
    }

    #[test]
    fn media_type_clauses() {
        let photo = ProviderQuery::new().media_type(Some(MediaType::Photo)).render();
        assert_eq!(photo, "mimeType contains 'image/' and mimeType != 'image/gif'");
        let other = ProviderQuery::new().media_type(Some(MediaType::Other)).render();
        assert_eq!(other, "");
    }

    #[test]
    fn local_matching() {
        let entry = RemoteEntry {
            id: "f".into(),
            name: Some("Stage Photo.PNG".into()),
            mime_type: Some("image/png".into()),
            parents: vec!["p".into()],
            ..Default::default()
        };
        let q = ProviderQuery::children_of("p")
            .files_only()
            .name_contains("photo")
            .media_type(Some(MediaType::Photo));
        assert!(q.matches(&entry));
        assert!(!ProviderQuery::children_of("other").matches(&entry));
        assert!(!ProviderQuery::new().folders_only().matches(&entry));
    }
}
