//! Postgres-backed file catalog.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use chunkr_core::{AppResult, FinalizedFile, StorageClass};

use crate::traits::MetadataStore;

const FILE_COLUMNS: &str = "file_path, original_filename, file_size, content_type, content_hash, \
     folder_path, bucket_name, storage_class, created_at, last_accessed_at, visit_count";

#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn file_from_row(row: &PgRow) -> AppResult<FinalizedFile> {
    Ok(FinalizedFile {
        file_path: row.try_get("file_path")?,
        original_filename: row.try_get("original_filename")?,
        file_size: row.try_get("file_size")?,
        content_type: row.try_get("content_type")?,
        content_hash: row.try_get("content_hash")?,
        folder_path: row.try_get("folder_path")?,
        bucket_name: row.try_get("bucket_name")?,
        storage_class: row.try_get("storage_class")?,
        created_at: row.try_get("created_at")?,
        last_accessed_at: row.try_get("last_accessed_at")?,
        visit_count: row.try_get("visit_count")?,
    })
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn save(&self, file: &FinalizedFile) -> AppResult<bool> {
        // The (content_hash, storage_class) primary key makes this the
        // idempotency point for re-delivered merge signals.
        let result = sqlx::query(
            r#"
            INSERT INTO finalized_files (
                file_path, original_filename, file_size, content_type, content_hash,
                folder_path, bucket_name, storage_class, created_at, last_accessed_at, visit_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (content_hash, storage_class) DO NOTHING
            "#,
        )
        .bind(&file.file_path)
        .bind(&file.original_filename)
        .bind(file.file_size)
        .bind(&file.content_type)
        .bind(&file.content_hash)
        .bind(&file.folder_path)
        .bind(&file.bucket_name)
        .bind(file.storage_class)
        .bind(file.created_at)
        .bind(file.last_accessed_at)
        .bind(file.visit_count)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_hash(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM finalized_files \
             WHERE content_hash = $1 AND storage_class = $2"
        ))
        .bind(content_hash)
        .bind(class)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn touch_access(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE finalized_files
            SET visit_count = visit_count + 1, last_accessed_at = NOW()
            WHERE content_hash = $1 AND storage_class = $2
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(content_hash)
        .bind(class)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn delete_by_hash(&self, content_hash: &str, class: StorageClass) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM finalized_files WHERE content_hash = $1 AND storage_class = $2",
        )
        .bind(content_hash)
        .bind(class)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, class: Option<StorageClass>) -> AppResult<Vec<FinalizedFile>> {
        let rows = match class {
            Some(class) => {
                sqlx::query(&format!(
                    "SELECT {FILE_COLUMNS} FROM finalized_files \
                     WHERE storage_class = $1 ORDER BY created_at DESC"
                ))
                .bind(class)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {FILE_COLUMNS} FROM finalized_files ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(file_from_row).collect()
    }
}
