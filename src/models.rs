//! Core data models used throughout the indexer.
//!
//! These types represent the provider listing entries the crawler reads,
//! the records it writes into the document store, and the media items
//! returned to query callers.

use serde::{Deserialize, Serialize};

/// MIME type the provider uses to mark folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Display name used when the provider omits one.
pub const UNTITLED: &str = "(untitled)";

/// One child returned by a provider listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME)
    }

    pub fn mime(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("")
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNTITLED)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn media_type(&self) -> MediaType {
        MediaType::from_mime(self.mime())
    }
}

/// Media classification derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Gif,
    Other,
}

impl MediaType {
    /// `image/gif` → gif, `image/*` → photo, `video/*` → video, else other.
    pub fn from_mime(mime: &str) -> Self {
        if mime == "image/gif" {
            MediaType::Gif
        } else if mime.starts_with("image/") {
            MediaType::Photo
        } else if mime.starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
            MediaType::Gif => "gif",
            MediaType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaType::Photo),
            "video" => Some(MediaType::Video),
            "gif" => Some(MediaType::Gif),
            "other" => Some(MediaType::Other),
            _ => None,
        }
    }
}

/// Ordering by provider creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    /// `"old"` sorts ascending; anything else falls back to newest first.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "old" => SortOrder::OldestFirst,
            _ => SortOrder::NewestFirst,
        }
    }
}

/// Which files an indexed search considers, relative to its folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Files directly inside the folder.
    Flat,
    /// Files anywhere below the folder.
    #[default]
    Subtree,
}

impl SearchScope {
    /// `"flat"` selects [`SearchScope::Flat`]; anything else is a subtree search.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "flat" => SearchScope::Flat,
            _ => SearchScope::Subtree,
        }
    }
}

/// Fields the crawler supplies for a folder upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderUpsert {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub root_id: String,
    pub drive_id: Option<String>,
    pub generation: i64,
}

/// A folder as stored in the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub root_id: String,
    pub drive_id: Option<String>,
    /// `None` for rows written before generations existed; always stale.
    pub generation: Option<i64>,
    /// Store-assigned write time (unix seconds).
    pub updated_at: i64,
}

/// Fields the crawler supplies for a file upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpsert {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    pub parent_id: Option<String>,
    pub root_id: String,
    pub drive_id: Option<String>,
    pub created_time: Option<String>,
    pub modified_time: Option<String>,
    pub view_url: Option<String>,
    pub thumb_url: String,
    pub generation: i64,
}

/// A media file as stored in the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub media_type: MediaType,
    /// Containing folder.
    pub parent_id: Option<String>,
    pub root_id: String,
    pub drive_id: Option<String>,
    pub created_time: Option<String>,
    pub modified_time: Option<String>,
    pub view_url: Option<String>,
    pub thumb_url: String,
    pub generation: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Folder,
    File,
}

/// Identifies a stored record for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: String,
}

/// A single pending store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    UpsertFolder(FolderUpsert),
    UpsertFile(FileUpsert),
    Delete(RecordKey),
}

/// Per-root record of the last completed crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaRecord {
    pub root_id: String,
    pub drive_id: Option<String>,
    pub last_generation: i64,
    pub last_run_by: Option<String>,
    pub last_run_at: i64,
}

/// Outcome of a lease acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    /// Another generation holds a lease that has not expired.
    Held { generation: i64 },
    /// The lease expired, but its last holder is newer than the caller.
    Superseded { generation: i64 },
}

/// A media file as returned to query callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub tags: Vec<String>,
    pub thumb_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A folder node returned by the browse endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Cumulative crawl counters, reported back to the trigger caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub folders: u64,
    pub files: u64,
    pub writes: u64,
}
