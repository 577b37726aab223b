//! Error types for the provider, store, crawl, and query seams.
//!
//! Command functions and the CLI use `anyhow`; these typed errors exist so
//! callers can decide whether a failure is worth retrying with the last
//! cursor they were handed.

use thiserror::Error;

/// Failures talking to the remote file-tree provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Rate limiting, server errors, timeouts, dropped connections.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider refused the request (bad query, missing access, ...).
    #[error("provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered with a body we could not understand.
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            classify_status(status.as_u16(), err.to_string())
        } else {
            // connect, timeout, body and request-building failures
            ProviderError::Transient(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to a provider error.
pub fn classify_status(status: u16, message: String) -> ProviderError {
    if status == 429 || status == 408 || status >= 500 {
        ProviderError::Transient(format!("HTTP {}: {}", status, message))
    } else {
        ProviderError::Rejected { status, message }
    }
}

/// Failures reading from or writing to the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("{0}")]
    Message(String),
}

/// Failures of a single crawl invocation.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A batch commit or sweep delete failed. Completed generations are
    /// untouched, so retrying from the last returned cursor is safe.
    #[error("store write failed: {0}")]
    StoreWrite(#[from] StoreError),

    /// Missing root identifier, missing credentials, invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Another crawl generation holds a live lease on this root.
    #[error("crawl generation {generation} is still in progress for this root")]
    CrawlInProgress { generation: i64 },
}

impl SyncError {
    /// Whether the trigger caller should retry with its last good cursor.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Provider(e) => e.is_transient(),
            SyncError::StoreWrite(_) => true,
            SyncError::Configuration(_) => false,
            SyncError::CrawlInProgress { .. } => true,
        }
    }
}

/// Failures of a media query. Filter and sort inputs are coerced, so only
/// backend availability can fail here.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify_status(429, "slow down".into()).is_transient());
        assert!(classify_status(503, "unavailable".into()).is_transient());
        assert!(!classify_status(404, "gone".into()).is_transient());
        assert!(!classify_status(403, "forbidden".into()).is_transient());
    }

    #[test]
    fn retryability() {
        assert!(SyncError::Provider(ProviderError::Transient("x".into())).is_retryable());
        assert!(!SyncError::Provider(ProviderError::Rejected {
            status: 400,
            message: "bad q".into()
        })
        .is_retryable());
        assert!(SyncError::StoreWrite(StoreError::Poisoned).is_retryable());
        assert!(!SyncError::Configuration("missing root".into()).is_retryable());
        assert!(SyncError::CrawlInProgress { generation: 7 }.is_retryable());
    }
}
