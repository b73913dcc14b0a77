//! Postgres-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use chunkr_core::{AppError, AppResult, SessionStatus, UploadSession};

use crate::traits::SessionStore;

const SESSION_COLUMNS: &str = "session_id, file_name, file_hash, file_size, content_type, \
     folder_path, bucket_name, storage_class, total_chunks, uploaded_count, \
     chunk_paths, status, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &PgRow) -> AppResult<UploadSession> {
    let chunk_paths: serde_json::Value = row.try_get("chunk_paths")?;
    Ok(UploadSession {
        session_id: row.try_get("session_id")?,
        file_name: row.try_get("file_name")?,
        file_hash: row.try_get("file_hash")?,
        file_size: row.try_get("file_size")?,
        content_type: row.try_get("content_type")?,
        folder_path: row.try_get("folder_path")?,
        bucket_name: row.try_get("bucket_name")?,
        storage_class: row.try_get("storage_class")?,
        total_chunks: row.try_get("total_chunks")?,
        uploaded_count: row.try_get("uploaded_count")?,
        chunk_paths: serde_json::from_value(chunk_paths)?,
        status: row.try_get("status")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &UploadSession) -> AppResult<()> {
        let chunk_paths = serde_json::to_value(&session.chunk_paths)?;
        let result = sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                session_id, file_name, file_hash, file_size, content_type,
                folder_path, bucket_name, storage_class, total_chunks,
                uploaded_count, chunk_paths, status, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.file_name)
        .bind(&session.file_hash)
        .bind(session.file_size)
        .bind(&session.content_type)
        .bind(&session.folder_path)
        .bind(&session.bucket_name)
        .bind(session.storage_class)
        .bind(session.total_chunks)
        .bind(session.uploaded_count)
        .bind(chunk_paths)
        .bind(session.status)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                format!("session {} already exists", session.session_id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<UploadSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn record_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        chunk_path: &str,
    ) -> AppResult<UploadSession> {
        let mut tx = self.pool.begin().await?;

        // Row lock for the read-modify-write; concurrent chunk recordings
        // for the same session serialize here.
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions WHERE session_id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        let mut session = session_from_row(&row)?;

        if chunk_number < 1 || chunk_number > session.total_chunks {
            return Err(AppError::InvalidArgument(format!(
                "chunk number {} out of range 1..={}",
                chunk_number, session.total_chunks
            )));
        }
        if !matches!(
            session.status,
            SessionStatus::Init | SessionStatus::Uploading
        ) {
            return Err(AppError::Conflict(format!(
                "session {} is {}, not accepting chunks",
                session_id, session.status
            )));
        }

        let slot = (chunk_number - 1) as usize;
        if session.chunk_paths[slot].is_none() {
            session.chunk_paths[slot] = Some(chunk_path.to_string());
        }
        session.uploaded_count = session
            .chunk_paths
            .iter()
            .filter(|slot| slot.is_some())
            .count() as i32;
        session.status = if session.all_chunks_recorded() {
            SessionStatus::ReadyToMerge
        } else {
            SessionStatus::Uploading
        };
        session.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE upload_sessions
            SET chunk_paths = $2, uploaded_count = $3, status = $4, updated_at = $5
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(serde_json::to_value(&session.chunk_paths)?)
        .bind(session.uploaded_count)
        .bind(session.status)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn begin_merge(&self, session_id: &str) -> AppResult<Option<UploadSession>> {
        // Single-statement compare-and-set; the RETURNING row is the
        // post-claim state, so exactly one caller observes the transition.
        let row = sqlx::query(&format!(
            r#"
            UPDATE upload_sessions
            SET status = 'merging', updated_at = NOW()
            WHERE session_id = $1 AND status = 'ready_to_merge'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM upload_sessions WHERE session_id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        let current: SessionStatus = row.try_get("status")?;
        if !current.can_transition(status) {
            return Err(AppError::Conflict(format!(
                "session {}: invalid transition {} -> {}",
                session_id, current, status
            )));
        }

        sqlx::query(
            "UPDATE upload_sessions SET status = $2, updated_at = NOW() WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM upload_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<UploadSession>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE upload_sessions
            SET status = 'expired', updated_at = NOW()
            WHERE expires_at <= $1 AND status NOT IN ('merged', 'failed', 'expired')
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(session_from_row).collect()
    }
}
