use serde::{Deserialize, Serialize};

use super::file::FinalizedFile;

/// Completion signal emitted by the merge engine once compose has succeeded.
///
/// One immutable message, two independent subscribers: metadata persistence
/// and chunk cleanup. Each must be idempotent because the signal may be
/// re-delivered after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedEvent {
    pub session_id: String,
    pub file: FinalizedFile,
    /// Chunk object paths in part order, kept on the event because the
    /// session row may be gone by the time cleanup runs.
    pub chunk_paths: Vec<String>,
}
