//! SQLite-backed [`IndexStore`] implementation.
//!
//! Each [`commit_batch`](IndexStore::commit_batch) runs in one transaction.
//! Merge-upserts use `ON CONFLICT ... DO UPDATE` with `COALESCE` so optional
//! columns the op leaves NULL keep their stored value. `updated_at` comes
//! from SQLite's own clock.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::models::{
    FileRecord, FolderRecord, LeaseOutcome, MediaType, MetaRecord, RecordKey, RecordKind, WriteOp,
};

use super::IndexStore;

/// SQLite store over a pool created by [`crate::db::connect`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn folder_from_row(row: &SqliteRow) -> FolderRecord {
    FolderRecord {
        id: row.get("id"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        root_id: row.get("root_id"),
        drive_id: row.get("drive_id"),
        generation: row.get("generation"),
        updated_at: row.get("updated_at"),
    }
}

fn file_from_row(row: &SqliteRow) -> FileRecord {
    let media_type: String = row.get("media_type");
    FileRecord {
        id: row.get("id"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        media_type: MediaType::parse(&media_type).unwrap_or(MediaType::Other),
        parent_id: row.get("parent_id"),
        root_id: row.get("root_id"),
        drive_id: row.get("drive_id"),
        created_time: row.get("created_time"),
        modified_time: row.get("modified_time"),
        view_url: row.get("view_url"),
        thumb_url: row.get("thumb_url"),
        generation: row.get("generation"),
        updated_at: row.get("updated_at"),
    }
}

const FOLDER_COLUMNS: &str = "id, name, parent_id, root_id, drive_id, generation, updated_at";
const FILE_COLUMNS: &str = "id, name, mime_type, media_type, parent_id, root_id, drive_id, \
     created_time, modified_time, view_url, thumb_url, generation, updated_at";

#[async_trait]
impl IndexStore for SqliteStore {
    async fn commit_batch(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for op in ops {
            match op {
                WriteOp::UpsertFolder(f) => {
                    sqlx::query(
                        r#"
                        INSERT INTO folders (id, name, parent_id, root_id, drive_id, generation, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, CAST(strftime('%s','now') AS INTEGER))
                        ON CONFLICT(id) DO UPDATE SET
                            name = excluded.name,
                            parent_id = COALESCE(excluded.parent_id, folders.parent_id),
                            root_id = excluded.root_id,
                            drive_id = COALESCE(excluded.drive_id, folders.drive_id),
                            generation = MAX(COALESCE(folders.generation, excluded.generation), excluded.generation),
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(&f.id)
                    .bind(&f.name)
                    .bind(&f.parent_id)
                    .bind(&f.root_id)
                    .bind(&f.drive_id)
                    .bind(f.generation)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::UpsertFile(f) => {
                    sqlx::query(
                        r#"
                        INSERT INTO files (id, name, mime_type, media_type, parent_id, root_id, drive_id,
                                           created_time, modified_time, view_url, thumb_url, generation, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(strftime('%s','now') AS INTEGER))
                        ON CONFLICT(id) DO UPDATE SET
                            name = excluded.name,
                            mime_type = excluded.mime_type,
                            media_type = excluded.media_type,
                            parent_id = COALESCE(excluded.parent_id, files.parent_id),
                            root_id = excluded.root_id,
                            drive_id = COALESCE(excluded.drive_id, files.drive_id),
                            created_time = COALESCE(excluded.created_time, files.created_time),
                            modified_time = COALESCE(excluded.modified_time, files.modified_time),
                            view_url = COALESCE(excluded.view_url, files.view_url),
                            thumb_url = excluded.thumb_url,
                            generation = MAX(COALESCE(files.generation, excluded.generation), excluded.generation),
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(&f.id)
                    .bind(&f.name)
                    .bind(&f.mime_type)
                    .bind(f.media_type.as_str())
                    .bind(&f.parent_id)
                    .bind(&f.root_id)
                    .bind(&f.drive_id)
                    .bind(&f.created_time)
                    .bind(&f.modified_time)
                    .bind(&f.view_url)
                    .bind(&f.thumb_url)
                    .bind(f.generation)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Delete(key) => {
                    let sql = match key.kind {
                        RecordKind::Folder => "DELETE FROM folders WHERE id = ?",
                        RecordKind::File => "DELETE FROM files WHERE id = ?",
                    };
                    sqlx::query(sql).bind(&key.id).execute(&mut *tx).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn stale_records(
        &self,
        root_id: &str,
        generation: i64,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let mut keys = Vec::new();
        for (table, kind) in [("folders", RecordKind::Folder), ("files", RecordKind::File)] {
            let ids: Vec<String> = sqlx::query_scalar(&format!(
                "SELECT id FROM {} WHERE root_id = ? AND (generation IS NULL OR generation < ?) ORDER BY id",
                table
            ))
            .bind(root_id)
            .bind(generation)
            .fetch_all(&self.pool)
            .await?;
            keys.extend(ids.into_iter().map(|id| RecordKey { kind, id }));
        }
        Ok(keys)
    }

    async fn folders_for_root(&self, root_id: &str) -> Result<Vec<FolderRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM folders WHERE root_id = ? ORDER BY id",
            FOLDER_COLUMNS
        ))
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(folder_from_row).collect())
    }

    async fn files_for_root(&self, root_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM files WHERE root_id = ? ORDER BY id",
            FILE_COLUMNS
        ))
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(file_from_row).collect())
    }

    async fn files_in_folder(
        &self,
        root_id: &str,
        folder_id: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM files WHERE root_id = ? AND parent_id = ? ORDER BY id",
            FILE_COLUMNS
        ))
        .bind(root_id)
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(file_from_row).collect())
    }

    async fn get_meta(&self, root_id: &str) -> Result<Option<MetaRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT root_id, drive_id, last_generation, last_run_by, last_run_at FROM index_meta WHERE root_id = ?",
        )
        .bind(root_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| MetaRecord {
            root_id: row.get("root_id"),
            drive_id: row.get("drive_id"),
            last_generation: row.get("last_generation"),
            last_run_by: row.get("last_run_by"),
            last_run_at: row.get("last_run_at"),
        }))
    }

    async fn put_meta(&self, meta: &MetaRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (root_id, drive_id, last_generation, last_run_by, last_run_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(root_id) DO UPDATE SET
                drive_id = excluded.drive_id,
                last_generation = MAX(index_meta.last_generation, excluded.last_generation),
                last_run_by = excluded.last_run_by,
                last_run_at = excluded.last_run_at
            "#,
        )
        .bind(&meta.root_id)
        .bind(&meta.drive_id)
        .bind(meta.last_generation)
        .bind(&meta.last_run_by)
        .bind(meta.last_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn acquire_lease(
        &self,
        root_id: &str,
        generation: i64,
        now: i64,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome, StoreError> {
        // Conditional upsert: takes the row when absent, when already ours,
        // or when expired and last held by an older generation.
        let result = sqlx::query(
            r#"
            INSERT INTO crawl_leases (root_id, generation, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(root_id) DO UPDATE SET
                generation = excluded.generation,
                expires_at = excluded.expires_at
            WHERE crawl_leases.generation = excluded.generation
               OR (crawl_leases.expires_at <= ? AND crawl_leases.generation < excluded.generation)
            "#,
        )
        .bind(root_id)
        .bind(generation)
        .bind(now + ttl_secs)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(LeaseOutcome::Acquired);
        }

        let row = sqlx::query("SELECT generation, expires_at FROM crawl_leases WHERE root_id = ?")
            .bind(root_id)
            .fetch_one(&self.pool)
            .await?;
        let holder: i64 = row.get("generation");
        let expires_at: i64 = row.get("expires_at");
        if expires_at > now {
            Ok(LeaseOutcome::Held { generation: holder })
        } else {
            Ok(LeaseOutcome::Superseded { generation: holder })
        }
    }

    async fn release_lease(&self, root_id: &str, generation: i64) -> Result<(), StoreError> {
        // Expire rather than delete, so the last holder's generation stays
        // on record.
        sqlx::query("UPDATE crawl_leases SET expires_at = 0 WHERE root_id = ? AND generation = ?")
            .bind(root_id)
            .bind(generation)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
