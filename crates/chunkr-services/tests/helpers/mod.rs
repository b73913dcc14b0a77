#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;

use chunkr_core::{BucketProfile, InitUploadRequest, MergedEvent, StorageClass};
use chunkr_db::{MemoryMetadataStore, MemorySessionStore, MetadataStore};
use chunkr_services::{
    BucketBinding, BucketBindings, ConsistencyPipeline, FileService, MergeEngine, Reconciler,
    SessionCoordinator,
};
use chunkr_storage::MemoryObjectStore;

pub const PERSIST_MAX_ATTEMPTS: u32 = 1;

pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub merge: MergeEngine,
    pub pipeline: ConsistencyPipeline,
    pub reconciler: Reconciler,
    pub files: FileService,
    pub sessions: Arc<MemorySessionStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub public_store: Arc<MemoryObjectStore>,
    pub private_store: Arc<MemoryObjectStore>,
    pub events: mpsc::Receiver<MergedEvent>,
}

/// Opt-in test logging: `RUST_LOG=debug cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryMetadataStore::new()))
}

/// Build the full service stack on in-memory backends, with a caller-chosen
/// metadata store so tests can inject persist failures.
pub fn harness_with(metadata: Arc<dyn MetadataStore>) -> Harness {
    init_tracing();
    let sessions = Arc::new(MemorySessionStore::new());
    let public_store = Arc::new(MemoryObjectStore::new("public-files"));
    let private_store = Arc::new(MemoryObjectStore::new("private-files"));

    let bindings = BucketBindings::new(vec![
        BucketBinding::new(
            BucketProfile::new(StorageClass::Public, "public-files")
                .with_public_base_url("http://localhost:9000/public-files"),
            public_store.clone(),
        ),
        BucketBinding::new(
            BucketProfile::new(StorageClass::Private, "private-files"),
            private_store.clone(),
        ),
    ]);

    let (tx, rx) = mpsc::channel(16);

    let coordinator = SessionCoordinator::new(
        sessions.clone(),
        metadata.clone(),
        bindings.clone(),
        Duration::hours(24),
    );
    let merge = MergeEngine::new(sessions.clone(), bindings.clone(), tx);
    let pipeline = ConsistencyPipeline::new(
        metadata.clone(),
        sessions.clone(),
        bindings.clone(),
        PERSIST_MAX_ATTEMPTS,
        300,
    );
    let reconciler = Reconciler::new(
        sessions.clone(),
        metadata.clone(),
        bindings.clone(),
        Duration::hours(24),
        3600,
    );
    let files = FileService::new(
        metadata.clone(),
        bindings,
        std::time::Duration::from_secs(900),
    );

    Harness {
        coordinator,
        merge,
        pipeline,
        reconciler,
        files,
        sessions,
        metadata,
        public_store,
        private_store,
        events: rx,
    }
}

pub fn init_request(file_hash: &str, total_chunks: i32, class: StorageClass) -> InitUploadRequest {
    InitUploadRequest {
        file_name: "report.pdf".to_string(),
        file_hash: file_hash.to_string(),
        file_size: 3 * 1024,
        content_type: "application/pdf".to_string(),
        folder_path: "docs".to_string(),
        total_chunks,
        storage_class: class,
    }
}
