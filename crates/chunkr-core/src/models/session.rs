use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::storage::StorageClass;

/// Upload session lifecycle.
///
/// ```text
/// Init -> Uploading -> ReadyToMerge -> Merging -> Merged
/// ```
///
/// `Failed` and `Expired` are reachable from any non-terminal state. `Merged`,
/// `Failed` and `Expired` are terminal: no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "session_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Init,
    Uploading,
    ReadyToMerge,
    Merging,
    Merged,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Merged | SessionStatus::Failed | SessionStatus::Expired
        )
    }

    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, Failed) | (_, Expired) => true,
            (Init, Uploading) => true,
            (Init, ReadyToMerge) | (Uploading, ReadyToMerge) => true,
            (ReadyToMerge, Merging) => true,
            (Merging, Merged) => true,
            // Transient compose failure releases the merge claim.
            (Merging, ReadyToMerge) => true,
            _ => false,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            SessionStatus::Init => "init",
            SessionStatus::Uploading => "uploading",
            SessionStatus::ReadyToMerge => "ready_to_merge",
            SessionStatus::Merging => "merging",
            SessionStatus::Merged => "merged",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Durable record of one in-flight chunked upload.
///
/// `chunk_paths` has exactly `total_chunks` slots; slot `i` holds the store
/// path of chunk `i + 1` once that chunk has arrived. `uploaded_count` always
/// equals the number of filled slots; the stores enforce this by recomputing
/// the count inside the same atomic update that fills a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Caller-supplied id; by convention the content hash, which is what makes
    /// dedup keying natural.
    pub session_id: String,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub content_type: String,
    pub folder_path: String,
    pub bucket_name: String,
    pub storage_class: StorageClass,
    pub total_chunks: i32,
    pub uploaded_count: i32,
    pub chunk_paths: Vec<Option<String>>,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        request: &InitUploadRequest,
        bucket_name: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: request.file_hash.clone(),
            file_name: request.file_name.clone(),
            file_hash: request.file_hash.clone(),
            file_size: request.file_size,
            content_type: request.content_type.clone(),
            folder_path: request.folder_path.clone(),
            bucket_name: bucket_name.into(),
            storage_class: request.storage_class,
            total_chunks: request.total_chunks,
            uploaded_count: 0,
            chunk_paths: vec![None; request.total_chunks as usize],
            status: SessionStatus::Init,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// 1-based numbers of the chunks already recorded, in order.
    pub fn recorded_chunk_numbers(&self) -> Vec<i32> {
        self.chunk_paths
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| i as i32 + 1)
            .collect()
    }

    /// 1-based numbers of the chunks still missing, in order.
    pub fn missing_chunk_numbers(&self) -> Vec<i32> {
        self.chunk_paths
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as i32 + 1)
            .collect()
    }

    /// The complete ordered chunk path list, or `None` if any slot is empty.
    pub fn ordered_chunk_paths(&self) -> Option<Vec<String>> {
        self.chunk_paths
            .iter()
            .map(|slot| slot.clone())
            .collect::<Option<Vec<_>>>()
    }

    /// Recompute completeness from the slots themselves rather than trusting
    /// a possibly stale status column.
    pub fn all_chunks_recorded(&self) -> bool {
        self.uploaded_count == self.total_chunks
            && self.chunk_paths.iter().all(|slot| slot.is_some())
    }
}

/// Parameters for opening (or resuming) an upload session.
///
/// The hash and path fields feed directly into object paths, so validation
/// here must match the shapes the reconciler's path classifier recognizes.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitUploadRequest {
    #[validate(
        length(min = 1, max = 255, message = "File name must be 1-255 characters"),
        custom(function = validate_file_name)
    )]
    pub file_name: String,
    #[validate(
        length(min = 8, max = 128, message = "File hash must be 8-128 characters"),
        custom(function = validate_file_hash)
    )]
    pub file_hash: String,
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub file_size: i64,
    #[validate(length(min = 1, max = 255, message = "Content type must be 1-255 characters"))]
    pub content_type: String,
    #[validate(
        length(min = 1, max = 255, message = "Folder path must be 1-255 characters"),
        custom(function = validate_folder_path)
    )]
    pub folder_path: String,
    #[validate(range(min = 1, max = 10000, message = "Total chunks must be 1-10000"))]
    pub total_chunks: i32,
    pub storage_class: StorageClass,
}

fn validate_file_hash(hash: &str) -> Result<(), ValidationError> {
    if hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(());
    }
    let mut err = ValidationError::new("file_hash");
    err.message = Some("File hash must be hexadecimal".into());
    Err(err)
}

fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if !name.contains('/') && name != "." && name != ".." {
        return Ok(());
    }
    let mut err = ValidationError::new("file_name");
    err.message = Some("File name must be a single path segment".into());
    Err(err)
}

fn validate_folder_path(path: &str) -> Result<(), ValidationError> {
    let trimmed = path.trim_matches('/');
    if !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
    {
        return Ok(());
    }
    let mut err = ValidationError::new("folder_path");
    err.message = Some("Folder path segments must be non-empty and must not traverse".into());
    Err(err)
}

/// Caller-facing snapshot of a session's progress.
///
/// `uploaded_chunk_numbers` lets a resuming client skip chunks that already
/// arrived instead of re-sending everything.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_chunks: i32,
    pub uploaded_count: i32,
    pub uploaded_chunk_numbers: Vec<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionView {
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            total_chunks: session.total_chunks,
            uploaded_count: session.uploaded_count,
            uploaded_chunk_numbers: session.recorded_chunk_numbers(),
            expires_at: Some(session.expires_at),
        }
    }

    /// Synthetic already-merged view for the dedup short-circuit: the content
    /// already exists, so the caller sees a terminal session with every chunk
    /// accounted for and uploads nothing.
    pub fn deduplicated(file_hash: &str, total_chunks: i32) -> Self {
        Self {
            session_id: file_hash.to_string(),
            status: SessionStatus::Merged,
            total_chunks,
            uploaded_count: total_chunks,
            uploaded_chunk_numbers: (1..=total_chunks).collect(),
            expires_at: None,
        }
    }
}
