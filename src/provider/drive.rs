//! Google Drive v3 provider.
//!
//! Lists children through `files.list` with a structured `q` filter, a
//! fixed field projection, and shared-drive scoping. Authentication is a
//! bearer token read from the environment; issuing and refreshing that
//! token belongs to the session layer, not to this crate.
//!
//! # Configuration
//!
//! ```toml
//! [provider]
//! root_folder_id = "1AbCdEf"
//! drive_id = "0XyZ"                      # optional shared drive
//! access_token_env = "DRIVE_ACCESS_TOKEN"
//! ```
//!
//! # Errors
//!
//! HTTP 408/429/5xx and network failures become
//! [`ProviderError::Transient`]; other non-success statuses become
//! [`ProviderError::Rejected`] carrying the first 500 bytes of the body.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::{classify_status, ProviderError, SyncError};
use crate::models::{RemoteEntry, SortOrder};

use super::{ListPage, ListRequest, TreeProvider};

/// Field projection requested for every listing.
pub const LIST_FIELDS: &str =
    "nextPageToken, files(id,name,mimeType,parents,createdTime,modifiedTime,webViewLink)";

/// Drive REST client scoped to one (optional) shared drive.
pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    drive_id: Option<String>,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<RemoteEntry>,
}

impl DriveClient {
    /// Build a client from config, reading the token from the configured
    /// environment variable.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, SyncError> {
        let access_token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                SyncError::Configuration(format!(
                    "{} environment variable not set",
                    config.access_token_env
                ))
            })?;
        Self::new(config, access_token)
    }

    pub fn new(config: &ProviderConfig, access_token: String) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            drive_id: config.drive_id.clone(),
            access_token,
        })
    }

    fn query_params(&self, request: &ListRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", request.query.render()),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", request.page_size.to_string()),
            ("supportsAllDrives", "true".to_string()),
        ];

        if let Some(ref token) = request.page_token {
            params.push(("pageToken", token.clone()));
        }

        match request.order {
            Some(SortOrder::NewestFirst) => params.push(("orderBy", "createdTime desc".to_string())),
            Some(SortOrder::OldestFirst) => params.push(("orderBy", "createdTime asc".to_string())),
            None => {}
        }

        if let Some(ref drive_id) = self.drive_id {
            params.push(("corpora", "drive".to_string()));
            params.push(("driveId", drive_id.clone()));
            params.push(("includeItemsFromAllDrives", "true".to_string()));
        }

        params
    }
}

#[async_trait]
impl TreeProvider for DriveClient {
    async fn list_children(&self, request: &ListRequest) -> Result<ListPage, ProviderError> {
        let url = format!("{}/files", self.base_url);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&self.query_params(request))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                body.chars().take(500).collect::<String>(),
            ));
        }

        let list: FileList = resp.json().await?;
        Ok(ListPage {
            entries: list.files.into_iter().filter(|f| !f.id.is_empty()).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}
