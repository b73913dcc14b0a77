//! Session coordinator: init with dedup short-circuit, chunk intake, status.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use validator::Validate;

use chunkr_core::{
    paths, AppError, AppResult, InitUploadRequest, SessionStatus, SessionView, UploadSession,
};
use chunkr_db::{MetadataStore, SessionStore};

use crate::bindings::{store_error, BucketBindings};

#[derive(Clone)]
pub struct SessionCoordinator {
    sessions: Arc<dyn SessionStore>,
    metadata: Arc<dyn MetadataStore>,
    bindings: BucketBindings,
    session_ttl: Duration,
}

impl SessionCoordinator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        metadata: Arc<dyn MetadataStore>,
        bindings: BucketBindings,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            metadata,
            bindings,
            session_ttl,
        }
    }

    /// Open or resume an upload session.
    ///
    /// When the catalog already holds this `(file_hash, storage_class)`, no
    /// session is created at all: the caller gets a synthetic `Merged` view
    /// and transfers zero bytes.
    #[tracing::instrument(skip(self, request), fields(file_hash = %request.file_hash))]
    pub async fn init(&self, request: &InitUploadRequest) -> AppResult<SessionView> {
        request.validate()?;

        if self
            .metadata
            .find_by_hash(&request.file_hash, request.storage_class)
            .await?
            .is_some()
        {
            tracing::info!(
                file_hash = %request.file_hash,
                storage_class = %request.storage_class,
                "Content already cataloged, instant upload"
            );
            return Ok(SessionView::deduplicated(
                &request.file_hash,
                request.total_chunks,
            ));
        }

        let now = Utc::now();
        if let Some(existing) = self.sessions.get(&request.file_hash).await? {
            let reusable = !existing.is_expired(now)
                && !matches!(
                    existing.status,
                    SessionStatus::Failed | SessionStatus::Expired
                );

            if reusable {
                if existing.total_chunks != request.total_chunks {
                    return Err(AppError::InvalidArgument(format!(
                        "session {} was opened with total_chunks={}, got {}",
                        existing.session_id, existing.total_chunks, request.total_chunks
                    )));
                }
                if existing.storage_class != request.storage_class {
                    return Err(AppError::InvalidArgument(format!(
                        "session {} was opened with storage class {}, got {}",
                        existing.session_id, existing.storage_class, request.storage_class
                    )));
                }
                tracing::info!(
                    session_id = %existing.session_id,
                    uploaded = existing.uploaded_count,
                    total = existing.total_chunks,
                    "Resuming upload session"
                );
                return Ok(SessionView::from_session(&existing));
            }

            tracing::info!(
                session_id = %existing.session_id,
                status = %existing.status,
                "Discarding dead session and starting over"
            );
            self.sessions.delete(&existing.session_id).await?;
        }

        let binding = self.bindings.for_class(request.storage_class)?;
        let session = UploadSession::new(request, &binding.profile.bucket, self.session_ttl, now);
        self.sessions.create(&session).await?;

        tracing::info!(
            session_id = %session.session_id,
            total_chunks = session.total_chunks,
            bucket = %session.bucket_name,
            "Upload session created"
        );
        Ok(SessionView::from_session(&session))
    }

    /// Write one chunk's bytes to the store and record it on the session.
    #[tracing::instrument(skip(self, data), fields(session_id = %session_id, chunk_number))]
    pub async fn upload_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        data: Bytes,
    ) -> AppResult<SessionView> {
        let session = self.fetch_live(session_id).await?;

        if chunk_number < 1 || chunk_number > session.total_chunks {
            return Err(AppError::InvalidArgument(format!(
                "chunk number {} out of range 1..={}",
                chunk_number, session.total_chunks
            )));
        }

        let binding = self.bindings.for_class(session.storage_class)?;
        let chunk_path = paths::chunk_object_path(session_id, chunk_number);
        binding
            .store
            .put(&chunk_path, data, &session.content_type)
            .await
            .map_err(store_error)?;

        self.record_chunk(session_id, chunk_number, &chunk_path).await
    }

    /// Record a chunk that was uploaded out-of-band (e.g. via presigned PUT).
    pub async fn record_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        chunk_path: &str,
    ) -> AppResult<SessionView> {
        let session = self
            .sessions
            .record_chunk(session_id, chunk_number, chunk_path)
            .await?;

        tracing::debug!(
            session_id = %session_id,
            chunk_number,
            uploaded = session.uploaded_count,
            total = session.total_chunks,
            status = %session.status,
            "Chunk recorded"
        );
        Ok(SessionView::from_session(&session))
    }

    pub async fn status(&self, session_id: &str) -> AppResult<SessionView> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
        Ok(SessionView::from_session(&session))
    }

    /// Completeness is recomputed from the slots, not trusted from the
    /// status column, and an expired session is never ready.
    pub async fn is_ready_to_merge(&self, session_id: &str) -> AppResult<bool> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        Ok(session.status == SessionStatus::ReadyToMerge
            && session.all_chunks_recorded()
            && !session.is_expired(Utc::now()))
    }

    /// Fetch a session that can still accept chunks, expiring it on the spot
    /// when its deadline has passed.
    async fn fetch_live(&self, session_id: &str) -> AppResult<UploadSession> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        if session.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "session {} is {}",
                session_id, session.status
            )));
        }
        if session.is_expired(Utc::now()) {
            self.sessions
                .set_status(session_id, SessionStatus::Expired)
                .await?;
            return Err(AppError::Conflict(format!(
                "session {} expired at {}",
                session_id, session.expires_at
            )));
        }
        Ok(session)
    }
}
