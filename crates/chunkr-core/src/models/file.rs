use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::UploadSession;
use super::storage::StorageClass;

/// Catalog record of a fully assembled file.
///
/// At most one record ever exists per `(content_hash, storage_class)` pair;
/// the catalog enforces this with a unique constraint, which is what makes
/// both deduplication and signal re-delivery safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedFile {
    /// Object key of the composed file in its bucket.
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
    pub content_hash: String,
    pub folder_path: String,
    pub bucket_name: String,
    pub storage_class: StorageClass,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub visit_count: i64,
}

impl FinalizedFile {
    /// Build the (not yet persisted) record for a session whose chunks were
    /// just composed into `file_path`.
    pub fn from_session(session: &UploadSession, file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            original_filename: session.file_name.clone(),
            file_size: session.file_size,
            content_type: session.content_type.clone(),
            content_hash: session.file_hash.clone(),
            folder_path: session.folder_path.clone(),
            bucket_name: session.bucket_name.clone(),
            storage_class: session.storage_class,
            created_at: Utc::now(),
            last_accessed_at: None,
            visit_count: 0,
        }
    }
}
