//! Object store abstraction
//!
//! This module defines the ObjectStore trait that all store backends must
//! implement. The merge engine, the coordinator and the reconciler only ever
//! talk to this trait, so the same service code runs against S3-compatible
//! providers in production and the in-memory backend in tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

use chunkr_core::StoreObject;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Compose source missing: {0}")]
    SourceMissing(String),

    #[error("Invalid store request: {0}")]
    InvalidRequest(String),

    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Store configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_) | StorageError::Io(_))
    }
}

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object store abstraction
///
/// One instance is bound to one bucket. Paths are bucket-relative keys; the
/// naming conventions for chunk and final objects live in `chunkr_core::paths`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object at `path`, replacing any existing object.
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Read a whole object.
    async fn get(&self, path: &str) -> StorageResult<Bytes>;

    /// Server-side concatenation of `sources` (in order) into `target`.
    ///
    /// Sources are left in place; callers delete them separately once the
    /// composed object is durable. A missing source fails the whole compose
    /// with `SourceMissing` and must leave no partial `target` visible.
    async fn compose(
        &self,
        sources: &[String],
        target: &str,
        content_type: &str,
    ) -> StorageResult<()>;

    /// List objects under `prefix` (all objects when `None`), with size and
    /// last-modified time for each.
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<StoreObject>>;

    /// Delete one object. Deleting a missing object is an error.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Delete many objects, skipping ones that are already gone. Used by
    /// cleanup paths, which must tolerate partial prior runs.
    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Generate a presigned GET URL for direct download.
    ///
    /// Only supported by S3 backends; other backends return `Config`.
    async fn presigned_get_url(&self, path: &str, expires_in: Duration) -> StorageResult<String>;

    /// Bucket this store instance is bound to.
    fn bucket(&self) -> &str;
}
