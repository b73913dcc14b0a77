//! Store traits for session state and the file catalog.
//!
//! The services only ever depend on these traits, so the same coordinator
//! runs against Postgres in production and the in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chunkr_core::{AppResult, FinalizedFile, SessionStatus, StorageClass, UploadSession};

/// Durable store for in-flight upload sessions.
///
/// Implementations must make `record_chunk` atomic: two concurrent calls for
/// the same session may interleave in any order but the final row always has
/// `uploaded_count` equal to the number of filled slots, and the session
/// reaches `ReadyToMerge` exactly when the last distinct chunk lands.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly initialized session. Fails with `Conflict` when a
    /// session with the same id already exists.
    async fn create(&self, session: &UploadSession) -> AppResult<()>;

    async fn get(&self, session_id: &str) -> AppResult<Option<UploadSession>>;

    /// Record one uploaded chunk and return the updated session.
    ///
    /// Idempotent per chunk number: re-recording a chunk that already has a
    /// path leaves the row unchanged. Rejects out-of-range chunk numbers with
    /// `InvalidArgument` and sessions outside `Init`/`Uploading` with
    /// `Conflict`.
    async fn record_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        chunk_path: &str,
    ) -> AppResult<UploadSession>;

    /// Atomically claim a session for merging.
    ///
    /// Compare-and-set from `ReadyToMerge` to `Merging`; returns the claimed
    /// session, or `None` when the session is missing, not yet complete, or
    /// another worker already claimed it. Exactly one concurrent caller wins.
    async fn begin_merge(&self, session_id: &str) -> AppResult<Option<UploadSession>>;

    /// Move a session to `status`, enforcing the lifecycle transitions.
    /// Invalid transitions fail with `Conflict`.
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> AppResult<()>;

    /// Remove a session row. Deleting a missing session is a no-op, so
    /// cleanup paths can re-run safely.
    async fn delete(&self, session_id: &str) -> AppResult<()>;

    /// Mark every non-terminal session past its deadline as `Expired` and
    /// return the affected rows, chunk paths included, for cleanup.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<UploadSession>>;
}

/// Catalog of fully assembled files, keyed by `(content_hash, storage_class)`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a catalog record. Returns `false` when a record for the same
    /// `(content_hash, storage_class)` already exists, leaving the existing
    /// record untouched. This is what makes re-delivered merge signals safe.
    async fn save(&self, file: &FinalizedFile) -> AppResult<bool>;

    async fn find_by_hash(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>>;

    /// Bump the visit counter and access timestamp, returning the updated
    /// record, or `None` when no record exists.
    async fn touch_access(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>>;

    /// Remove a catalog record. Returns whether a record was deleted.
    async fn delete_by_hash(&self, content_hash: &str, class: StorageClass) -> AppResult<bool>;

    /// All records, optionally limited to one storage class.
    async fn list(&self, class: Option<StorageClass>) -> AppResult<Vec<FinalizedFile>>;
}
