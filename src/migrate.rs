use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Folder records; `generation` is NULL for rows predating generations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT,
            root_id TEXT NOT NULL,
            drive_id TEXT,
            generation INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            media_type TEXT NOT NULL,
            parent_id TEXT,
            root_id TEXT NOT NULL,
            drive_id TEXT,
            created_time TEXT,
            modified_time TEXT,
            view_url TEXT,
            thumb_url TEXT NOT NULL,
            generation INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            root_id TEXT PRIMARY KEY,
            drive_id TEXT,
            last_generation INTEGER NOT NULL,
            last_run_by TEXT,
            last_run_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawl_leases (
            root_id TEXT PRIMARY KEY,
            generation INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_folders_root ON folders(root_id, generation)",
        "CREATE INDEX IF NOT EXISTS idx_files_root ON files(root_id, generation)",
        "CREATE INDEX IF NOT EXISTS idx_files_parent ON files(root_id, parent_id)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
