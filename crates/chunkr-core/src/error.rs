//! Error types module
//!
//! All coordinator and merge errors are unified under the `AppError` enum.
//! Validation errors (`NotFound`, `InvalidArgument`, `PreconditionFailed`)
//! are returned synchronously and never retried; `TransientStore` and
//! `MergeFailed` are retryable by the caller; `PartInvalid` and
//! `SourceMissing` are permanent store rejections. `MetadataPersist` is only
//! ever handled inside the consistency pipeline and never reaches the upload
//! caller.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the
//! `postgres` feature.

use crate::models::SessionStatus;

#[cfg(feature = "postgres")]
use sqlx::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session not ready to merge: status={status}, uploaded {uploaded}/{total}")]
    PreconditionFailed {
        status: SessionStatus,
        uploaded: i32,
        total: i32,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient storage error: {0}")]
    TransientStore(String),

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Invalid part: {0}")]
    PartInvalid(String),

    #[error("Source chunk missing: {0}")]
    SourceMissing(String),

    #[error("Metadata persist failed: {0}")]
    MetadataPersist(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type used throughout the coordinator and services.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(feature = "postgres")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidArgument(format!("Validation error: {}", err))
    }
}

impl AppError {
    /// Whether a caller may retry the failed operation as-is.
    pub fn is_recoverable(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            AppError::Database(_) => true,
            AppError::TransientStore(_)
            | AppError::MergeFailed(_)
            | AppError::MetadataPersist(_) => true,
            _ => false,
        }
    }

    /// Machine-readable error code, stable across message changes.
    pub fn error_code(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            AppError::MergeFailed(_) => "MERGE_FAILED",
            AppError::PartInvalid(_) => "PART_INVALID",
            AppError::SourceMissing(_) => "SOURCE_MISSING",
            AppError::MetadataPersist(_) => "METADATA_PERSIST_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_failed_reports_progress() {
        let err = AppError::PreconditionFailed {
            status: SessionStatus::Uploading,
            uploaded: 2,
            total: 5,
        };
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");
        assert!(!err.is_recoverable());
        let msg = err.to_string();
        assert!(msg.contains("2/5"));
        assert!(msg.contains("uploading"));
    }

    #[test]
    fn transient_errors_are_recoverable() {
        assert!(AppError::TransientStore("timeout".into()).is_recoverable());
        assert!(AppError::MergeFailed("connection reset".into()).is_recoverable());
        assert!(!AppError::PartInvalid("part 3".into()).is_recoverable());
        assert!(!AppError::SourceMissing("abc/3".into()).is_recoverable());
        assert!(!AppError::NotFound("session".into()).is_recoverable());
    }
}
