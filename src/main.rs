//! # Drive Index CLI (`didx`)
//!
//! ## Usage
//!
//! ```bash
//! didx --config ./config/didx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `didx init` | Create the SQLite database and run schema migrations |
//! | `didx sync` | Run one crawl invocation (or chain them with `--until-done`) |
//! | `didx query` | Live media query against the provider |
//! | `didx search` | Search the indexed records |
//! | `didx folders` | List indexed folders, or live sub-folders with `--live` |
//! | `didx status` | Show record counts and the last completed crawl |
//! | `didx serve` | Start the HTTP server |
//!
//! The Drive bearer token is read from the environment variable named by
//! `provider.access_token_env` (default `DRIVE_ACCESS_TOKEN`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use drive_index::commands::{self, SyncArgs};
use drive_index::media::MediaParams;
use drive_index::{config, migrate, server};

/// Drive Index CLI: crawl a remote folder tree into a local index and
/// query it.
#[derive(Parser)]
#[command(
    name = "didx",
    about = "Resumable indexer and media search for a remote folder tree",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/didx.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Filters shared by `query` and `search`.
#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Folder to query (defaults to the configured root).
    #[arg(long)]
    folder: Option<String>,

    /// Substring to match against names.
    #[arg(long)]
    text: Option<String>,

    /// Media type: all, photo, video, gif, other.
    #[arg(long = "type")]
    media_type: Option<String>,

    /// Sort by creation time: new or old.
    #[arg(long)]
    sort: Option<String>,

    /// Comma-separated tags that must all be present.
    #[arg(long)]
    tags: Option<String>,

    /// Continuation cursor from a previous page.
    #[arg(long)]
    cursor: Option<String>,

    /// Results per page.
    #[arg(long)]
    page_size: Option<String>,

    /// Print the raw JSON response.
    #[arg(long)]
    json: bool,
}

impl FilterArgs {
    fn params(&self) -> MediaParams {
        MediaParams {
            folder_id: self.folder.clone(),
            text: self.text.clone(),
            media_type: self.media_type.clone(),
            sort: self.sort.clone(),
            tags: self.tags.clone(),
            cursor: self.cursor.clone(),
            page_size: self.page_size.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run a crawl invocation against the configured root.
    ///
    /// Without `--until-done`, performs one bounded invocation and prints
    /// the cursor to resume from.
    Sync {
        /// Cursor returned by the previous invocation.
        #[arg(long)]
        cursor: Option<String>,

        /// List and classify without writing, sweeping, or leasing.
        #[arg(long)]
        dry_run: bool,

        /// Write budget per invocation.
        #[arg(long)]
        max_writes: Option<String>,

        /// Keep invoking until the crawl is complete.
        #[arg(long)]
        until_done: bool,

        /// Identity recorded as the trigger of the crawl.
        #[arg(long)]
        by: Option<String>,
    },

    /// Live media query against the provider.
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        /// Walk the whole subtree instead of one folder.
        #[arg(long)]
        recursive: bool,

        /// Provider page token (non-recursive listing).
        #[arg(long)]
        page_token: Option<String>,
    },

    /// Search the indexed records.
    Search {
        #[command(flatten)]
        filter: FilterArgs,

        /// `flat` (direct children only) or `subtree`.
        #[arg(long)]
        scope: Option<String>,
    },

    /// List folders.
    Folders {
        /// List sub-folders live from the provider instead of the index.
        #[arg(long)]
        live: bool,

        /// Parent folder for `--live` (defaults to the root).
        #[arg(long)]
        parent: Option<String>,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show record counts and the last completed crawl.
    Status,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            cursor,
            dry_run,
            max_writes,
            until_done,
            by,
        } => {
            commands::run_sync(
                &cfg,
                SyncArgs {
                    cursor,
                    dry_run,
                    max_writes,
                    until_done,
                    by,
                },
            )
            .await?;
        }
        Commands::Query {
            filter,
            recursive,
            page_token,
        } => {
            let params = MediaParams {
                recursive: recursive.then(|| "1".to_string()),
                page_token,
                ..filter.params()
            };
            commands::run_query(&cfg, params, filter.json).await?;
        }
        Commands::Search { filter, scope } => {
            let params = MediaParams {
                scope,
                ..filter.params()
            };
            commands::run_search(&cfg, params, filter.json).await?;
        }
        Commands::Folders { live, parent, json } => {
            commands::run_folders(&cfg, live, parent, json).await?;
        }
        Commands::Status => {
            commands::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
