//! Reconciliation sweeps: stale chunks, orphaned objects, expired sessions.

mod helpers;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use chunkr_core::{AppError, AppResult, FinalizedFile, StorageClass};
use chunkr_db::{MemoryMetadataStore, MetadataStore, SessionStore};
use chunkr_storage::ObjectStore;
use helpers::{harness, harness_with, init_request};

const HASH: &str = "cf17ce6f77e88fefd44ccb2f0e751967";

#[tokio::test]
async fn stale_chunk_sweep_spares_fresh_and_final_objects() {
    let h = harness();

    h.private_store
        .put("deadbeef00000001/1", Bytes::from_static(b"old"), "a/b")
        .await
        .unwrap();
    h.private_store
        .put("deadbeef00000001/2", Bytes::from_static(b"fresh"), "a/b")
        .await
        .unwrap();
    h.private_store
        .put(
            &format!("docs/2025/08/01/{HASH}/report.pdf"),
            Bytes::from_static(b"final"),
            "application/pdf",
        )
        .await
        .unwrap();

    // Chunk 1 and the final object are both old; only the chunk qualifies.
    let old = Utc::now() - Duration::hours(48);
    assert!(h.private_store.backdate("deadbeef00000001/1", old));
    assert!(h
        .private_store
        .backdate(&format!("docs/2025/08/01/{HASH}/report.pdf"), old));

    // Catalog the final object so the orphan sweep leaves it alone too.
    let mut file = finalized(HASH);
    file.file_path = format!("docs/2025/08/01/{HASH}/report.pdf");
    h.metadata.save(&file).await.unwrap();

    h.reconciler.run_once(Utc::now()).await.unwrap();

    assert!(!h.private_store.exists("deadbeef00000001/1").await.unwrap());
    assert!(h.private_store.exists("deadbeef00000001/2").await.unwrap());
    assert!(h
        .private_store
        .exists(&format!("docs/2025/08/01/{HASH}/report.pdf"))
        .await
        .unwrap());
}

#[tokio::test]
async fn orphan_sweep_deletes_uncataloged_final_objects() {
    let h = harness();

    let orphan_path = format!("docs/2025/08/01/{HASH}/report.pdf");
    h.private_store
        .put(&orphan_path, Bytes::from_static(b"data"), "application/pdf")
        .await
        .unwrap();

    let kept_hash = "aa17ce6f77e88fefd44ccb2f0e751967";
    let kept_path = format!("docs/2025/08/01/{kept_hash}/other.pdf");
    h.private_store
        .put(&kept_path, Bytes::from_static(b"data"), "application/pdf")
        .await
        .unwrap();
    let mut kept = finalized(kept_hash);
    kept.file_path = kept_path.clone();
    h.metadata.save(&kept).await.unwrap();

    h.reconciler.run_once(Utc::now()).await.unwrap();

    assert!(!h.private_store.exists(&orphan_path).await.unwrap());
    assert!(h.private_store.exists(&kept_path).await.unwrap());
}

#[tokio::test]
async fn expired_session_sweep_removes_rows_and_chunks() {
    let h = harness();
    h.coordinator
        .init(&init_request(HASH, 2, StorageClass::Private))
        .await
        .unwrap();
    h.coordinator
        .upload_chunk(HASH, 1, Bytes::from_static(b"part"))
        .await
        .unwrap();

    let live_hash = "bb17ce6f77e88fefd44ccb2f0e751967";
    h.coordinator
        .init(&init_request(live_hash, 2, StorageClass::Private))
        .await
        .unwrap();

    // Sweep as if the first session's 24h TTL has long passed.
    h.reconciler
        .sweep_expired_sessions(Utc::now() + Duration::hours(48))
        .await
        .unwrap();

    assert!(h.sessions.get(HASH).await.unwrap().is_none());
    assert!(!h.private_store.exists(&format!("{HASH}/1")).await.unwrap());
    // Both sessions shared the 24h TTL, so sweeping 48h out takes the live
    // one too; sweeping now takes neither.
    let h = harness();
    h.coordinator
        .init(&init_request(live_hash, 2, StorageClass::Private))
        .await
        .unwrap();
    h.reconciler.sweep_expired_sessions(Utc::now()).await.unwrap();
    assert!(h.sessions.get(live_hash).await.unwrap().is_some());
}

/// Metadata store whose saves fail a configurable number of times.
struct FlakyMetadataStore {
    inner: MemoryMetadataStore,
    failures_left: AtomicU32,
}

impl FlakyMetadataStore {
    fn failing(times: u32) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            failures_left: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn save(&self, file: &FinalizedFile) -> AppResult<bool> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::MetadataPersist("catalog unavailable".into()));
        }
        self.inner.save(file).await
    }

    async fn find_by_hash(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        self.inner.find_by_hash(content_hash, class).await
    }

    async fn touch_access(
        &self,
        content_hash: &str,
        class: StorageClass,
    ) -> AppResult<Option<FinalizedFile>> {
        self.inner.touch_access(content_hash, class).await
    }

    async fn delete_by_hash(&self, content_hash: &str, class: StorageClass) -> AppResult<bool> {
        self.inner.delete_by_hash(content_hash, class).await
    }

    async fn list(&self, class: Option<StorageClass>) -> AppResult<Vec<FinalizedFile>> {
        self.inner.list(class).await
    }
}

#[tokio::test]
async fn persist_exhaustion_orphans_the_object_until_the_sweep() {
    // Every save attempt fails, so the pipeline gives up.
    let mut h = harness_with(Arc::new(FlakyMetadataStore::failing(u32::MAX)));

    h.coordinator
        .init(&init_request(HASH, 1, StorageClass::Private))
        .await
        .unwrap();
    h.coordinator
        .upload_chunk(HASH, 1, Bytes::from_static(b"payload"))
        .await
        .unwrap();
    let file = h.merge.merge(HASH, HASH).await.unwrap();

    let event = h.events.recv().await.unwrap();
    h.pipeline.handle(&event).await;

    // Chunks were still cleaned up, no metadata row, object orphaned.
    assert!(!h.private_store.exists(&format!("{HASH}/1")).await.unwrap());
    assert!(h
        .metadata
        .find_by_hash(HASH, StorageClass::Private)
        .await
        .unwrap()
        .is_none());
    assert!(h.private_store.exists(&file.file_path).await.unwrap());

    // Next reconciliation run deletes the orphan.
    h.reconciler.run_once(Utc::now()).await.unwrap();
    assert!(!h.private_store.exists(&file.file_path).await.unwrap());
}

#[tokio::test]
async fn file_service_delete_and_download_url() {
    let h = harness();

    let path = format!("docs/2025/08/01/{HASH}/report.pdf");
    h.public_store
        .put(&path, Bytes::from_static(b"data"), "application/pdf")
        .await
        .unwrap();
    let mut file = finalized(HASH);
    file.file_path = path.clone();
    file.storage_class = StorageClass::Public;
    file.bucket_name = "public-files".into();
    h.metadata.save(&file).await.unwrap();

    let url = h
        .files
        .download_url(&path, StorageClass::Public)
        .await
        .unwrap();
    assert_eq!(
        url,
        format!("http://localhost:9000/public-files/{path}")
    );

    // The access counter is bumped off the request path.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let touched = h
        .metadata
        .find_by_hash(HASH, StorageClass::Public)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(touched.visit_count, 1);

    h.files.delete(&path, StorageClass::Public).await.unwrap();
    assert!(!h.public_store.exists(&path).await.unwrap());
    assert!(h
        .metadata
        .find_by_hash(HASH, StorageClass::Public)
        .await
        .unwrap()
        .is_none());
}

fn finalized(hash: &str) -> FinalizedFile {
    FinalizedFile {
        file_path: format!("docs/2025/08/01/{hash}/report.pdf"),
        original_filename: "report.pdf".into(),
        file_size: 4,
        content_type: "application/pdf".into(),
        content_hash: hash.into(),
        folder_path: "docs".into(),
        bucket_name: "private-files".into(),
        storage_class: StorageClass::Private,
        created_at: Utc::now(),
        last_accessed_at: None,
        visit_count: 0,
    }
}
