//! CLI command implementations.
//!
//! Each `run_*` function wires the SQLite store and the Drive client from
//! config, performs one command, and prints a human-readable report to
//! stdout (or JSON with `--json`).

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::browse;
use crate::cache::FolderCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crawl::{CrawlOptions, Crawler};
use crate::db;
use crate::media::{IndexedSearch, MediaParams, MediaService};
use crate::models::MediaItem;
use crate::provider::drive::DriveClient;
use crate::provider::TreeProvider;
use crate::store::sqlite::SqliteStore;
use crate::store::IndexStore;

/// Hard stop for `sync --until-done`, in invocations.
const MAX_CHAINED_INVOCATIONS: usize = 10_000;

async fn open_store(config: &Config) -> Result<Arc<dyn IndexStore>> {
    let pool = db::connect(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn open_provider(config: &Config) -> Result<Arc<dyn TreeProvider>> {
    Ok(Arc::new(DriveClient::from_config(&config.provider)?))
}

fn media_service(
    config: &Config,
    provider: Arc<dyn TreeProvider>,
    store: Arc<dyn IndexStore>,
) -> MediaService {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(FolderCache::new(config.query.cache_ttl_secs, clock));
    MediaService::new(config, provider, store, cache)
}

/// Options for `didx sync`.
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub cursor: Option<String>,
    pub dry_run: bool,
    pub max_writes: Option<String>,
    pub until_done: bool,
    pub by: Option<String>,
}

pub async fn run_sync(config: &Config, args: SyncArgs) -> Result<()> {
    let provider = open_provider(config)?;
    let store = open_store(config).await?;
    let crawler = Crawler::new(config, provider, store, Arc::new(SystemClock));

    let max_writes = config.sync.clamp_max_writes(args.max_writes.as_deref());
    let mut cursor = args.cursor;

    for invocation in 1..=MAX_CHAINED_INVOCATIONS {
        let outcome = crawler
            .run(CrawlOptions {
                cursor: cursor.clone(),
                max_writes,
                dry_run: args.dry_run,
                triggered_by: args.by.clone(),
            })
            .await
            .map_err(|e| {
                let hint = if e.is_retryable() {
                    match &cursor {
                        Some(c) => format!(" (retryable; resume with --cursor {})", c),
                        None => " (retryable)".to_string(),
                    }
                } else {
                    String::new()
                };
                anyhow::anyhow!("sync failed: {}{}", e, hint)
            })?;

        println!(
            "sync{} #{}: generation {}, {} folders, {} files, {} writes",
            if outcome.dry { " (dry run)" } else { "" },
            invocation,
            outcome.generation,
            outcome.scanned.folders,
            outcome.scanned.files,
            outcome.scanned.writes
        );

        match outcome.next_cursor {
            Some(next) if args.until_done => cursor = Some(next),
            Some(next) => {
                println!("  more work remains; resume with:");
                if outcome.dry {
                    println!("  --dry-run --cursor {}", next);
                } else {
                    println!("  --cursor {}", next);
                }
                return Ok(());
            }
            None => {
                if let Some(swept) = outcome.swept {
                    println!("  crawl complete, swept {} stale records", swept);
                } else {
                    println!("  crawl complete");
                }
                return Ok(());
            }
        }
    }

    bail!(
        "sync did not finish within {} invocations",
        MAX_CHAINED_INVOCATIONS
    )
}

fn print_items(items: &[MediaItem]) {
    for item in items {
        println!(
            "{:<6} {}  {}  [{}]",
            item.media_type.as_str(),
            item.id,
            item.title,
            item.tags.join(", ")
        );
        if let Some(created) = &item.created_at {
            println!("       created {}", created);
        }
    }
}

pub async fn run_query(config: &Config, params: MediaParams, json: bool) -> Result<()> {
    let provider = open_provider(config)?;
    let store = open_store(config).await?;
    let page = media_service(config, provider, store)
        .query_media(&params)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items().is_empty() {
        println!("No media found.");
    } else {
        print_items(page.items());
    }
    if let Some(next) = page.continuation() {
        println!();
        println!("next: {}", next);
    }
    Ok(())
}

pub async fn run_search(config: &Config, params: MediaParams, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let cache = Arc::new(FolderCache::new(0, Arc::new(SystemClock)));
    let page = IndexedSearch::new(config, store, cache)
        .search(&params)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    println!("{} matching items", page.total);
    print_items(&page.items);
    if let Some(next) = &page.next_cursor {
        println!();
        println!("next: {}", next);
    }
    Ok(())
}

pub async fn run_folders(
    config: &Config,
    live: bool,
    parent: Option<String>,
    json: bool,
) -> Result<()> {
    let folders = if live {
        let provider = open_provider(config)?;
        let parent = parent.unwrap_or_else(|| config.provider.root_folder_id.clone());
        browse::live_children(provider.as_ref(), &parent).await?
    } else {
        let store = open_store(config).await?;
        browse::indexed_folders(store.as_ref(), &config.provider.root_folder_id).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }

    if folders.is_empty() {
        println!("No folders.");
    }
    for f in &folders {
        println!(
            "{}  {}  (parent: {})",
            f.id,
            f.name,
            f.parent_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn run_status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let root = &config.provider.root_folder_id;
    let folders = store.folders_for_root(root).await?.len();
    let files = store.files_for_root(root).await?.len();

    println!("Root:    {}", root);
    if let Some(drive) = &config.provider.drive_id {
        println!("Drive:   {}", drive);
    }
    println!("Folders: {}", folders);
    println!("Files:   {}", files);

    match store.get_meta(root).await? {
        Some(meta) => {
            let when = chrono::DateTime::from_timestamp(meta.last_run_at, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| meta.last_run_at.to_string());
            println!("Last completed generation: {}", meta.last_generation);
            println!("Completed at: {}", when);
            println!(
                "Triggered by: {}",
                meta.last_run_by.as_deref().unwrap_or("(unknown)")
            );
        }
        None => println!("No crawl has completed yet."),
    }
    Ok(())
}
