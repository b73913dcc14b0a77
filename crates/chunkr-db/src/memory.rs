//! In-memory session and catalog stores.
//!
//! Back the service test suites and local development. Each store keeps its
//! state behind a single mutex, which is what gives `record_chunk` and
//! `begin_merge` the same atomicity the Postgres stores get from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use chunkr_core::{
    AppError, AppResult, FinalizedFile, SessionStatus, StorageClass, UploadSession,
};

use crate::traits::{MetadataStore, SessionStore};

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, UploadSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &UploadSession) -> AppResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&session.session_id) {
            return Err(AppError::Conflict(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> AppResult<Option<UploadSession>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions.get(session_id).cloned())
    }

    async fn record_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        chunk_path: &str,
    ) -> AppResult<UploadSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

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

        Ok(session.clone())
    }

    async fn begin_merge(&self, session_id: &str) -> AppResult<Option<UploadSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(session_id) {
            Some(session) if session.status == SessionStatus::ReadyToMerge => {
                session.status = SessionStatus::Merging;
                session.updated_at = Utc::now();
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> AppResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {}", session_id)))?;

        if !session.status.can_transition(status) {
            return Err(AppError::Conflict(format!(
                "session {}: invalid transition {} -> {}",
                session_id, session.status, status
            )));
        }
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> AppResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<UploadSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut expired = Vec::new();
        for session in sessions.values_mut() {
            if !session.status.is_terminal() && session.is_expired(now) {
                session.status = SessionStatus::Expired;
                session.updated_at = now;
                expired.push(session.clone());
            }
        }
        Ok(expired)
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    files: Mutex<HashMap<(String, StorageClass), FinalizedFile>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn save(&self, file: &FinalizedFile) -> AppResult<bool> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let key = (file.content_hash.clone(), file.storage_class);
        if files.contains_key(&key) {
            return Ok(false);
        }
        files.insert(key, file.clone());
        Ok(true)
    }

    async fn find_by_hash(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files.get(&(content_hash.to_string(), class)).cloned())
    }

    async fn touch_access(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files
            .get_mut(&(content_hash.to_string(), class))
            .map(|file| {
                file.visit_count += 1;
                file.last_accessed_at = Some(Utc::now());
                file.clone()
            }))
    }

    async fn delete_by_hash(&self, content_hash: &str, class: StorageClass) -> AppResult<bool> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files.remove(&(content_hash.to_string(), class)).is_some())
    }

    async fn list(&self, class: Option<StorageClass>) -> AppResult<Vec<FinalizedFile>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = files
            .values()
            .filter(|file| class.is_none_or(|c| file.storage_class == c))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
