//! HTTP API.
//!
//! Exposes the crawl trigger, the live and indexed media queries, and the
//! folder browse endpoints as JSON over HTTP.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`/`POST` | `/trigger-sync` | Run one bounded crawl invocation |
//! | `GET`  | `/query-media` | Live listing (`recursive=1` walks the subtree) |
//! | `GET`  | `/search-media` | Search over the indexed records |
//! | `GET`  | `/folders` | Every indexed folder under the root |
//! | `GET`  | `/folders/children` | Live sub-folders of `parentId` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "provider_unavailable", "message": "...", "retryable": true } }
//! ```
//!
//! Error codes: `crawl_in_progress` (409), `configuration` (500),
//! `provider_unavailable` (503), `provider_error` (502),
//! `store_unavailable` (503). A retryable failure leaves the caller's last
//! cursor valid; retry with it.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::browse;
use crate::cache::FolderCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crawl::{CrawlOptions, CrawlOutcome, Crawler};
use crate::db;
use crate::error::{ProviderError, QueryError, SyncError};
use crate::media::{MediaPage, MediaParams, MediaService, SearchPage};
use crate::models::FolderEntry;
use crate::provider::drive::DriveClient;
use crate::provider::TreeProvider;
use crate::store::sqlite::SqliteStore;
use crate::store::IndexStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    provider: Arc<dyn TreeProvider>,
    store: Arc<dyn IndexStore>,
    crawler: Arc<Crawler>,
    media: Arc<MediaService>,
}

impl AppState {
    pub fn new(
        config: Config,
        provider: Arc<dyn TreeProvider>,
        store: Arc<dyn IndexStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(FolderCache::new(config.query.cache_ttl_secs, clock.clone()));
        let crawler = Crawler::new(&config, provider.clone(), store.clone(), clock);
        let media = MediaService::new(&config, provider.clone(), store.clone(), cache);
        Self {
            config: Arc::new(config),
            provider,
            store,
            crawler: Arc::new(crawler),
            media: Arc::new(media),
        }
    }
}

/// Build the router over an already-assembled state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/trigger-sync",
            get(handle_trigger_sync).post(handle_trigger_sync),
        )
        .route("/query-media", get(handle_query_media))
        .route("/search-media", get(handle_search_media))
        .route("/folders", get(handle_folders))
        .route("/folders/children", get(handle_folder_children))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server against the SQLite index and the Drive API.
///
/// Binds to `[server].bind` and runs until the process is terminated.
/// A missing access token is a configuration error and fails startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let provider = DriveClient::from_config(&config.provider)?;
    let pool = db::connect(config).await?;
    let state = AppState::new(
        config.clone(),
        Arc::new(provider),
        Arc::new(SqliteStore::new(pool)),
        Arc::new(SystemClock),
    );

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("drive index listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    retryable: bool,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                retryable: self.retryable,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn provider_error(err: &ProviderError) -> AppError {
    if err.is_transient() {
        AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "provider_unavailable",
            message: err.to_string(),
            retryable: true,
        }
    } else {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "provider_error",
            message: err.to_string(),
            retryable: false,
        }
    }
}

fn store_unavailable(message: String) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "store_unavailable",
        message,
        retryable: true,
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        error!(error = %err, retryable = err.is_retryable(), "crawl invocation failed");
        match &err {
            SyncError::Provider(e) => provider_error(e),
            SyncError::StoreWrite(_) => store_unavailable(err.to_string()),
            SyncError::Configuration(_) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "configuration",
                message: err.to_string(),
                retryable: false,
            },
            SyncError::CrawlInProgress { .. } => AppError {
                status: StatusCode::CONFLICT,
                code: "crawl_in_progress",
                message: err.to_string(),
                retryable: true,
            },
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        error!(error = %err, "query failed");
        match &err {
            QueryError::Provider(e) => provider_error(e),
            QueryError::Store(_) => store_unavailable(err.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET|POST /trigger-sync ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerParams {
    cursor: Option<String>,
    dry: Option<String>,
    max_writes: Option<String>,
    by: Option<String>,
}

#[derive(Serialize)]
struct TriggerResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: CrawlOutcome,
}

async fn handle_trigger_sync(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<TriggerResponse>, AppError> {
    let options = CrawlOptions {
        cursor: params.cursor.filter(|c| !c.is_empty()),
        max_writes: state
            .config
            .sync
            .clamp_max_writes(params.max_writes.as_deref()),
        dry_run: params.dry.as_deref().map(str::trim) == Some("1"),
        triggered_by: params.by.filter(|b| !b.trim().is_empty()),
    };
    let outcome = state.crawler.run(options).await?;
    Ok(Json(TriggerResponse { ok: true, outcome }))
}

// ============ GET /query-media, /search-media ============

async fn handle_query_media(
    State(state): State<AppState>,
    Query(params): Query<MediaParams>,
) -> Result<Json<MediaPage>, AppError> {
    Ok(Json(state.media.query_media(&params).await?))
}

async fn handle_search_media(
    State(state): State<AppState>,
    Query(params): Query<MediaParams>,
) -> Result<Json<SearchPage>, AppError> {
    Ok(Json(state.media.search_indexed(&params).await?))
}

// ============ GET /folders, /folders/children ============

#[derive(Serialize)]
struct FoldersResponse {
    folders: Vec<FolderEntry>,
}

async fn handle_folders(
    State(state): State<AppState>,
) -> Result<Json<FoldersResponse>, AppError> {
    let folders =
        browse::indexed_folders(state.store.as_ref(), &state.config.provider.root_folder_id)
            .await?;
    Ok(Json(FoldersResponse { folders }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildrenParams {
    parent_id: Option<String>,
}

async fn handle_folder_children(
    State(state): State<AppState>,
    Query(params): Query<ChildrenParams>,
) -> Result<Json<FoldersResponse>, AppError> {
    let parent = params
        .parent_id
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.config.provider.root_folder_id.clone());
    let folders = browse::live_children(state.provider.as_ref(), &parent).await?;
    Ok(Json(FoldersResponse { folders }))
}
