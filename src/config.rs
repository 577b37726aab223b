use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Hard store-imposed ceiling on operations per atomic commit.
pub const STORE_BATCH_LIMIT: usize = 500;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub query: QueryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// The configured crawl root; every stored record is scoped to it.
    pub root_folder_id: String,
    /// Shared drive to scope listings to.
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}
fn default_access_token_env() -> String {
    "DRIVE_ACCESS_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_max_writes")]
    pub default_max_writes: u64,
    #[serde(default = "default_max_writes_ceiling")]
    pub max_writes_ceiling: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: u32,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_max_writes: default_max_writes(),
            max_writes_ceiling: default_max_writes_ceiling(),
            batch_size: default_batch_size(),
            list_page_size: default_list_page_size(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

fn default_max_writes() -> u64 {
    800
}
fn default_max_writes_ceiling() -> u64 {
    4000
}
fn default_batch_size() -> usize {
    450
}
fn default_list_page_size() -> u32 {
    1000
}
fn default_lease_ttl_secs() -> i64 {
    300
}

impl SyncConfig {
    /// Coerce a requested write budget into `[1, ceiling]`; absent, zero,
    /// or unparseable values fall back to the default.
    pub fn clamp_max_writes(&self, requested: Option<&str>) -> u64 {
        let ceiling = self.max_writes_ceiling as i64;
        coerce_int(requested, self.default_max_writes as i64).clamp(1, ceiling) as u64
    }
}

fn coerce_int(requested: Option<&str>, default: i64) -> i64 {
    requested
        .and_then(|r| r.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(default)
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Provider page size used while walking folders.
    #[serde(default = "default_internal_page_size")]
    pub internal_page_size: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_thumb_url_base")]
    pub thumb_url_base: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            internal_page_size: default_internal_page_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            thumb_url_base: default_thumb_url_base(),
        }
    }
}

fn default_page_size() -> usize {
    60
}
fn default_max_page_size() -> usize {
    200
}
fn default_internal_page_size() -> u32 {
    200
}
fn default_cache_ttl_secs() -> i64 {
    300
}
fn default_thumb_url_base() -> String {
    "/api/drive/thumb".to_string()
}

impl QueryConfig {
    /// Coerce a requested page size into `[1, max_page_size]`.
    pub fn clamp_page_size(&self, requested: Option<&str>) -> usize {
        let max = self.max_page_size as i64;
        coerce_int(requested, self.default_page_size as i64).clamp(1, max) as usize
    }

    /// Locally proxied thumbnail URL for a file.
    pub fn thumb_url(&self, file_id: &str) -> String {
        format!("{}?id={}", self.thumb_url_base, urlencoding::encode(file_id))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Config {
    /// A configuration with every optional section defaulted, for tests
    /// and embedding.
    pub fn minimal(db_path: PathBuf, root_folder_id: &str) -> Self {
        Self {
            db: DbConfig { path: db_path },
            provider: ProviderConfig {
                root_folder_id: root_folder_id.to_string(),
                drive_id: None,
                base_url: default_base_url(),
                access_token_env: default_access_token_env(),
                timeout_secs: default_timeout_secs(),
            },
            sync: SyncConfig::default(),
            query: QueryConfig::default(),
            server: ServerConfig {
                bind: "127.0.0.1:7341".to_string(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.provider.root_folder_id.trim().is_empty() {
        anyhow::bail!("provider.root_folder_id must be set");
    }

    // Validate sync
    let sync = &config.sync;
    if sync.default_max_writes == 0 || sync.max_writes_ceiling == 0 {
        anyhow::bail!("sync write budgets must be > 0");
    }
    if sync.default_max_writes > sync.max_writes_ceiling {
        anyhow::bail!("sync.default_max_writes must not exceed sync.max_writes_ceiling");
    }
    if sync.batch_size == 0 || sync.batch_size > STORE_BATCH_LIMIT {
        anyhow::bail!(
            "sync.batch_size must be in [1, {}], got {}",
            STORE_BATCH_LIMIT,
            sync.batch_size
        );
    }
    if sync.list_page_size == 0 {
        anyhow::bail!("sync.list_page_size must be > 0");
    }
    if sync.lease_ttl_secs <= 0 {
        anyhow::bail!("sync.lease_ttl_secs must be > 0");
    }

    // Validate query
    let query = &config.query;
    if query.default_page_size == 0 || query.max_page_size == 0 {
        anyhow::bail!("query page sizes must be > 0");
    }
    if query.internal_page_size == 0 {
        anyhow::bail!("query.internal_page_size must be > 0");
    }
    if query.cache_ttl_secs < 0 {
        anyhow::bail!("query.cache_ttl_secs must be >= 0");
    }

    Ok(())
}
