//! Opaque cursor codec.
//!
//! Traversal state is serialized to JSON, wrapped in an envelope naming the
//! cursor kind, and encoded as unpadded base64url so it fits in a single
//! query-string value. Decoding never fails loudly: anything malformed,
//! oversized, of the wrong kind, missing a required field, or violating
//! the state's own invariants decodes to `None`, and the caller starts
//! from its initial state.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Tokens longer than this are rejected on decode and logged on encode.
pub const MAX_CURSOR_LEN: usize = 32 * 1024;

/// A serializable traversal state with a stable kind tag.
pub trait CursorState: Serialize + DeserializeOwned {
    const KIND: &'static str;

    /// Structural invariants a decoded state must satisfy.
    fn is_valid(&self) -> bool {
        true
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    k: &'a str,
    #[serde(flatten)]
    state: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    k: String,
    #[serde(flatten)]
    state: T,
}

/// Encode a state into an opaque URL-safe token.
pub fn encode<T: CursorState>(state: &T) -> String {
    let envelope = EnvelopeRef {
        k: T::KIND,
        state,
    };
    // Serializing plain data structs into a Vec cannot fail.
    let json = serde_json::to_vec(&envelope).unwrap_or_default();
    let token = URL_SAFE_NO_PAD.encode(json);
    if token.len() > MAX_CURSOR_LEN {
        tracing::warn!(
            kind = T::KIND,
            len = token.len(),
            "cursor exceeds the decodable size limit"
        );
    }
    token
}

/// Decode a token produced by [`encode`]; `None` on any problem.
pub fn decode<T: CursorState>(token: &str) -> Option<T> {
    let token = token.trim().trim_end_matches('=');
    if token.is_empty() || token.len() > MAX_CURSOR_LEN {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes).ok()?;
    if envelope.k != T::KIND || !envelope.state.is_valid() {
        return None;
    }
    Some(envelope.state)
}

/// Decode an optional raw token, logging when one was supplied but rejected.
pub fn decode_opt<T: CursorState>(token: Option<&str>) -> Option<T> {
    let raw = token.filter(|t| !t.trim().is_empty())?;
    let decoded = decode(raw);
    if decoded.is_none() {
        tracing::warn!(kind = T::KIND, "ignoring malformed cursor; starting fresh");
    }
    decoded
}

/// Write-crawl progress. This is the entire state of a crawl between
/// invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlCursor {
    /// Folders still to be listed, FIFO.
    pub queue: Vec<String>,
    /// Folder currently being paged through.
    #[serde(default)]
    pub current: Option<String>,
    /// Provider token of the page of `current` being consumed.
    #[serde(default)]
    pub page_token: Option<String>,
    /// Entries of that page already consumed.
    pub offset: usize,
    pub generation: i64,
    /// Set for dry-run crawls; a dry cursor never resumes a real crawl.
    pub dry: bool,
    pub folders: u64,
    pub files: u64,
    pub writes: u64,
}

impl CrawlCursor {
    pub fn new(root_id: &str, generation: i64, dry: bool) -> Self {
        Self {
            queue: vec![root_id.to_string()],
            current: None,
            page_token: None,
            offset: 0,
            generation,
            dry,
            folders: 0,
            files: 0,
            writes: 0,
        }
    }

    /// No folder queued and none being paged.
    pub fn is_quiescent(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

impl CursorState for CrawlCursor {
    const KIND: &'static str = "crawl";

    fn is_valid(&self) -> bool {
        self.current.is_some() || (self.page_token.is_none() && self.offset == 0)
    }
}

/// Read-side recursive traversal progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkCursor {
    pub queue: Vec<String>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
    pub offset: usize,
}

impl WalkCursor {
    pub fn new(folder_id: &str) -> Self {
        Self {
            queue: vec![folder_id.to_string()],
            current: None,
            page_token: None,
            offset: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

impl CursorState for WalkCursor {
    const KIND: &'static str = "walk";

    fn is_valid(&self) -> bool {
        self.current.is_some() || (self.page_token.is_none() && self.offset == 0)
    }
}

/// Position within an already-materialized result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCursor {
    pub offset: usize,
}

impl CursorState for OffsetCursor {
    const KIND: &'static str = "offset";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CrawlCursor {
        CrawlCursor {
            queue: vec!["A".into(), "B'quote\\slash".into()],
            current: Some("R".into()),
            page_token: Some("tok/+=".into()),
            offset: 17,
            generation: 1_760_000_000_123,
            dry: false,
            folders: 4,
            files: 9,
            writes: 13,
        }
    }

    #[test]
    fn crawl_cursor_roundtrip() {
        let c = sample();
        let token = encode(&c);
        assert!(token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
        assert_eq!(decode::<CrawlCursor>(&token), Some(c));
    }

    #[test]
    fn fresh_cursor_roundtrip() {
        let c = CrawlCursor::new("root", 42, false);
        assert_eq!(decode::<CrawlCursor>(&encode(&c)), Some(c));
    }

    #[test]
    fn roundtrip_covers_every_valid_shape() {
        let mut empty_queue = sample();
        empty_queue.queue.clear();

        let mut current_only = sample();
        current_only.page_token = None;
        current_only.offset = 3;

        let mut quiescent = CrawlCursor::new("root", 7, true);
        quiescent.queue.clear();

        let mut unicode = sample();
        unicode.queue = vec!["Fotos 2026 ✓".into(), "日本語/フォルダ".into(), "".into()];
        unicode.current = Some("ü\"\n".into());

        let mut wide = CrawlCursor::new("root", i64::MAX, false);
        wide.queue = (0..600).map(|i| format!("1AbC-folder_{:05}", i)).collect();
        wide.writes = u64::MAX;

        for c in [empty_queue, current_only, quiescent, unicode, wide] {
            let token = encode(&c);
            assert!(token.len() <= MAX_CURSOR_LEN, "token too long: {}", token.len());
            assert_eq!(decode::<CrawlCursor>(&token), Some(c));
        }
    }

    #[test]
    fn walk_cursor_roundtrip() {
        let mut w = WalkCursor::new("A");
        w.current = Some("B".into());
        w.page_token = Some("next".into());
        w.offset = 2;
        assert_eq!(decode::<WalkCursor>(&encode(&w)), Some(w));
    }

    #[test]
    fn garbage_decodes_to_none() {
        assert_eq!(decode::<CrawlCursor>("not-base64"), None);
        assert_eq!(decode::<CrawlCursor>("!!!"), None);
        assert_eq!(decode::<CrawlCursor>(""), None);
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert_eq!(decode::<CrawlCursor>(&not_json), None);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let json = br#"{"k":"crawl","queue":["A"],"offset":0,"folders":0,"files":0,"writes":0}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert_eq!(decode::<CrawlCursor>(&token), None);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let walk = WalkCursor::new("A");
        assert_eq!(decode::<CrawlCursor>(&encode(&walk)), None);
        assert_eq!(decode::<WalkCursor>(&encode(&walk)), Some(walk));
    }

    #[test]
    fn page_token_without_current_is_rejected() {
        let mut c = CrawlCursor::new("root", 1, false);
        c.page_token = Some("p2".into());
        assert_eq!(decode::<CrawlCursor>(&encode(&c)), None);
    }

    #[test]
    fn padded_tokens_are_accepted() {
        let c = OffsetCursor { offset: 60 };
        let padded = format!("{}==", encode(&c));
        assert_eq!(decode::<OffsetCursor>(&padded), Some(c));
    }

    #[test]
    fn oversized_tokens_are_rejected() {
        let huge = "A".repeat(MAX_CURSOR_LEN + 4);
        assert_eq!(decode::<OffsetCursor>(&huge), None);
    }
}
