//! # Drive Index
//!
//! Indexes a remote folder tree (folders and media files held by a file
//! storage provider) into a local document store, so search and browse
//! requests can be answered without a provider round trip per request.
//!
//! The provider only exposes the tree through parent-pointer listings with
//! opaque page tokens, and each invocation has a tight time budget, so the
//! crawl is resumable: every call does a bounded amount of work and hands
//! back an opaque cursor for the next one.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Provider  │──▶│ Crawl engine │──▶│ Write buffer│──▶│  SQLite  │
//! │ (Drive v3) │   │ BFS + cursor │   │  ≤450/batch │   │  index   │
//! └─────┬──────┘   └──────┬───────┘   └─────────────┘   └────┬─────┘
//!       │                 └── quiescent ──▶ generation sweep ─┤
//!       │                                                     │
//!       └──────▶ live query walk          indexed search ◀────┘
//!                       │                        │
//!                  ┌────┴────┐              ┌────┴────┐
//!                  │   CLI   │              │  HTTP   │
//!                  │ (didx)  │              │ (axum)  │
//!                  └─────────┘              └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! didx init                          # create database
//! didx sync --until-done --by ops    # crawl the configured root
//! didx search --tags 2026 --type photo
//! didx serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Provider, store, crawl, and query errors |
//! | [`clock`] | Injectable time source |
//! | [`models`] | Core data types |
//! | [`cursor`] | Opaque cursor codec |
//! | [`provider`] | Remote tree listing (Drive, in-memory) |
//! | [`store`] | Document store (SQLite, in-memory) |
//! | [`buffer`] | Batched write buffer |
//! | [`crawl`] | Resumable BFS crawl engine |
//! | [`sweep`] | Generation sweep |
//! | [`media`] | Live and indexed media queries |
//! | [`cache`] | TTL folder cache |
//! | [`browse`] | Folder browsing |
//! | [`tags`] | Tag extraction from names |
//! | [`commands`] | CLI command bodies |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod browse;
pub mod buffer;
pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod cursor;
pub mod db;
pub mod error;
pub mod media;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod server;
pub mod store;
pub mod sweep;
pub mod tags;
