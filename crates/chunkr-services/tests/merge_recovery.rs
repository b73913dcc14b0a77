//! Merge claim release on transient store failures.

mod helpers;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use tokio::sync::mpsc;

use chunkr_core::{BucketProfile, SessionStatus, StorageClass, StoreObject};
use chunkr_db::{MemoryMetadataStore, MemorySessionStore, SessionStore};
use chunkr_services::{BucketBinding, BucketBindings, MergeEngine, SessionCoordinator};
use chunkr_storage::{MemoryObjectStore, ObjectStore, StorageError, StorageResult};
use helpers::init_request;

const HASH: &str = "cf17ce6f77e88fefd44ccb2f0e751967";

/// Object store whose listings fail a set number of times.
struct FlakyListStore {
    inner: MemoryObjectStore,
    failures_left: AtomicU32,
}

impl FlakyListStore {
    fn failing(bucket: &str, times: u32) -> Self {
        Self {
            inner: MemoryObjectStore::new(bucket),
            failures_left: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyListStore {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.inner.put(path, data, content_type).await
    }

    async fn get(&self, path: &str) -> StorageResult<Bytes> {
        self.inner.get(path).await
    }

    async fn compose(
        &self,
        sources: &[String],
        target: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        self.inner.compose(sources, target, content_type).await
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<StoreObject>> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::Transient("listing timed out".into()));
        }
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.inner.delete(path).await
    }

    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()> {
        self.inner.delete_batch(paths).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.inner.exists(path).await
    }

    async fn presigned_get_url(&self, path: &str, expires_in: StdDuration) -> StorageResult<String> {
        self.inner.presigned_get_url(path, expires_in).await
    }

    fn bucket(&self) -> &str {
        self.inner.bucket()
    }
}

#[tokio::test]
async fn transient_listing_failure_releases_the_merge_claim() {
    let sessions = Arc::new(MemorySessionStore::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let store = Arc::new(FlakyListStore::failing("private-files", 1));
    let bindings = BucketBindings::new(vec![BucketBinding::new(
        BucketProfile::new(StorageClass::Private, "private-files"),
        store.clone(),
    )]);

    let (tx, mut rx) = mpsc::channel(16);
    let coordinator = SessionCoordinator::new(
        sessions.clone(),
        metadata,
        bindings.clone(),
        Duration::hours(24),
    );
    let merge = MergeEngine::new(sessions.clone(), bindings, tx);

    coordinator
        .init(&init_request(HASH, 1, StorageClass::Private))
        .await
        .unwrap();
    coordinator
        .upload_chunk(HASH, 1, Bytes::from_static(b"payload"))
        .await
        .unwrap();

    // The store flakes on the part check: the session must stay retryable
    // rather than being failed terminally.
    let err = merge.merge(HASH, HASH).await.unwrap_err();
    assert_eq!(err.error_code(), "MERGE_FAILED");
    assert!(err.is_recoverable());

    let session = sessions.get(HASH).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::ReadyToMerge);

    // The very next attempt succeeds.
    let file = merge.merge(HASH, HASH).await.unwrap();
    assert!(store.exists(&file.file_path).await.unwrap());
    let _ = rx.recv().await.unwrap();
}
