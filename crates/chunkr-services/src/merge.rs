//! Merge engine: claim, validate, compose, signal.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use chunkr_core::{
    paths, AppError, AppResult, FinalizedFile, MergedEvent, SessionStatus, UploadSession,
};
use chunkr_db::SessionStore;

use crate::bindings::BucketBindings;

#[derive(Clone)]
pub struct MergeEngine {
    sessions: Arc<dyn SessionStore>,
    bindings: BucketBindings,
    events: mpsc::Sender<MergedEvent>,
}

impl MergeEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        bindings: BucketBindings,
        events: mpsc::Sender<MergedEvent>,
    ) -> Self {
        Self {
            sessions,
            bindings,
            events,
        }
    }

    /// Assemble a completed session's chunks into the final object.
    ///
    /// Readiness is observed on the row returned by the merge claim itself,
    /// never on an earlier read, so exactly one concurrent caller proceeds.
    /// The caller sees `Merged` as soon as compose succeeds; metadata
    /// persistence and chunk cleanup happen asynchronously downstream.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn merge(&self, session_id: &str, expected_hash: &str) -> AppResult<FinalizedFile> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        if session.file_hash != expected_hash {
            return Err(AppError::InvalidArgument(format!(
                "session {} holds hash {}, caller expected {}",
                session_id, session.file_hash, expected_hash
            )));
        }

        let Some(session) = self.sessions.begin_merge(session_id).await? else {
            let current = self
                .sessions
                .get(session_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;
            return Err(AppError::PreconditionFailed {
                status: current.status,
                uploaded: current.uploaded_count,
                total: current.total_chunks,
            });
        };

        let chunk_paths = match self.validate_parts(&session).await {
            Ok(paths) => paths,
            // A recoverable error here means the store listing failed, not
            // that the parts are bad; keep the session retryable.
            Err(e) if e.is_recoverable() => {
                self.release_claim(session_id).await;
                return Err(e);
            }
            Err(e) => {
                self.mark_failed(session_id).await;
                return Err(e);
            }
        };

        let binding = self.bindings.for_class(session.storage_class)?;
        let final_path = paths::final_object_path(
            &session.folder_path,
            &session.file_hash,
            &session.file_name,
        );

        if let Err(e) = binding
            .store
            .compose(&chunk_paths, &final_path, &session.content_type)
            .await
        {
            return Err(self.handle_compose_failure(session_id, e).await);
        }

        let file = FinalizedFile::from_session(&session, final_path.clone());
        self.sessions
            .set_status(session_id, SessionStatus::Merged)
            .await?;

        tracing::info!(
            session_id = %session_id,
            file_path = %final_path,
            parts = chunk_paths.len(),
            "Chunks merged"
        );

        let event = MergedEvent {
            session_id: session_id.to_string(),
            file: file.clone(),
            chunk_paths,
        };
        if let Err(e) = self.events.send(event).await {
            // The composed object stays in the store without metadata; the
            // orphan sweep will find it.
            tracing::error!(
                error = %e,
                session_id = %session_id,
                "Merge signal dropped, pipeline unavailable"
            );
        }

        Ok(file)
    }

    /// Re-validate completeness against the claimed row and confirm every
    /// chunk object actually exists in the store. A slot can be recorded
    /// while the underlying upload was truncated; this check closes that gap.
    async fn validate_parts(&self, session: &UploadSession) -> AppResult<Vec<String>> {
        let missing = session.missing_chunk_numbers();
        if !missing.is_empty() {
            return Err(AppError::PartInvalid(format!(
                "session {}: chunk slots empty: {:?}",
                session.session_id, missing
            )));
        }
        let chunk_paths = session.ordered_chunk_paths().ok_or_else(|| {
            AppError::Internal(format!(
                "session {}: slot state inconsistent",
                session.session_id
            ))
        })?;

        let binding = self.bindings.for_class(session.storage_class)?;
        let prefix = format!("{}/", session.session_id);
        let listed = binding
            .store
            .list(Some(&prefix))
            .await
            .map_err(|e| AppError::MergeFailed(e.to_string()))?;
        let present: HashSet<&str> = listed.iter().map(|object| object.path.as_str()).collect();

        let absent: Vec<&str> = chunk_paths
            .iter()
            .map(|path| path.as_str())
            .filter(|path| !present.contains(path))
            .collect();
        if !absent.is_empty() {
            return Err(AppError::SourceMissing(format!(
                "session {}: chunk objects gone: {:?}",
                session.session_id, absent
            )));
        }

        Ok(chunk_paths)
    }

    /// Permanent store rejections fail the session; anything else releases
    /// the merge claim so the caller may retry.
    async fn handle_compose_failure(
        &self,
        session_id: &str,
        err: chunkr_storage::StorageError,
    ) -> AppError {
        use chunkr_storage::StorageError;

        tracing::error!(error = %err, session_id = %session_id, "Compose failed");
        match err {
            StorageError::SourceMissing(path) => {
                self.mark_failed(session_id).await;
                AppError::SourceMissing(path)
            }
            StorageError::InvalidRequest(msg) | StorageError::NotFound(msg) => {
                self.mark_failed(session_id).await;
                AppError::PartInvalid(msg)
            }
            other => {
                self.release_claim(session_id).await;
                AppError::MergeFailed(other.to_string())
            }
        }
    }

    async fn mark_failed(&self, session_id: &str) {
        if let Err(e) = self
            .sessions
            .set_status(session_id, SessionStatus::Failed)
            .await
        {
            tracing::error!(error = %e, session_id = %session_id, "Failed to mark session failed");
        }
    }

    async fn release_claim(&self, session_id: &str) {
        if let Err(e) = self
            .sessions
            .set_status(session_id, SessionStatus::ReadyToMerge)
            .await
        {
            tracing::error!(error = %e, session_id = %session_id, "Failed to release merge claim");
        }
    }
}
