//! Consistency pipeline: asynchronous reactions to merge completion.
//!
//! One immutable `MergedEvent` per merge, two independent reactions per
//! event: catalog the finalized file, and delete the now-unreferenced chunk
//! objects. Neither blocks or rolls back the other; both are idempotent so a
//! re-delivered signal after a restart is harmless.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use chunkr_core::MergedEvent;
use chunkr_db::{MetadataStore, SessionStore};

use crate::bindings::BucketBindings;

/// Backoff in seconds for a given retry attempt (exponential with cap).
#[inline]
fn persist_backoff_seconds(attempt: u32, cap_secs: u64) -> u64 {
    1_u64.checked_shl(attempt).unwrap_or(u64::MAX).min(cap_secs)
}

#[derive(Clone)]
pub struct ConsistencyPipeline {
    metadata: Arc<dyn MetadataStore>,
    sessions: Arc<dyn SessionStore>,
    bindings: BucketBindings,
    persist_max_attempts: u32,
    persist_backoff_cap_secs: u64,
}

impl ConsistencyPipeline {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        sessions: Arc<dyn SessionStore>,
        bindings: BucketBindings,
        persist_max_attempts: u32,
        persist_backoff_cap_secs: u64,
    ) -> Self {
        Self {
            metadata,
            sessions,
            bindings,
            persist_max_attempts,
            persist_backoff_cap_secs,
        }
    }

    /// Consume merge signals until the sender side closes.
    /// Returns a JoinHandle for graceful shutdown.
    pub fn start(self, mut events: mpsc::Receiver<MergedEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(&event).await;
            }
            tracing::info!("Merge signal channel closed, pipeline stopping");
        })
    }

    /// Run both reactions for one signal.
    #[tracing::instrument(skip(self, event), fields(session_id = %event.session_id))]
    pub async fn handle(&self, event: &MergedEvent) {
        // Deliberately concurrent and independent: a persist failure never
        // delays or cancels chunk cleanup.
        tokio::join!(self.persist_metadata(event), self.cleanup_chunks(event));
    }

    /// Catalog the finalized file, retrying with exponential backoff.
    ///
    /// Exhausting every attempt leaves the composed object in the store
    /// without a catalog row; that orphan is logged here and owned by the
    /// reconciler's orphan sweep, never rolled back synchronously.
    async fn persist_metadata(&self, event: &MergedEvent) {
        for attempt in 0..self.persist_max_attempts {
            match self.metadata.save(&event.file).await {
                Ok(inserted) => {
                    if inserted {
                        tracing::info!(
                            session_id = %event.session_id,
                            file_path = %event.file.file_path,
                            "File cataloged"
                        );
                    } else {
                        tracing::debug!(
                            session_id = %event.session_id,
                            content_hash = %event.file.content_hash,
                            "File already cataloged, signal re-delivery ignored"
                        );
                    }
                    return;
                }
                Err(e) if attempt + 1 < self.persist_max_attempts => {
                    let delay = persist_backoff_seconds(attempt, self.persist_backoff_cap_secs);
                    tracing::warn!(
                        error = %e,
                        session_id = %event.session_id,
                        attempt = attempt + 1,
                        retry_in_secs = delay,
                        "Metadata persist failed, retrying"
                    );
                    sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        session_id = %event.session_id,
                        file_path = %event.file.file_path,
                        content_hash = %event.file.content_hash,
                        attempts = self.persist_max_attempts,
                        "Metadata persist exhausted retries, object orphaned"
                    );
                    return;
                }
            }
        }
    }

    /// Delete the source chunk objects and drop the session row. Both are
    /// no-ops on re-delivery.
    async fn cleanup_chunks(&self, event: &MergedEvent) {
        let binding = match self.bindings.for_class(event.file.storage_class) {
            Ok(binding) => binding,
            Err(e) => {
                tracing::error!(error = %e, session_id = %event.session_id, "Chunk cleanup skipped");
                return;
            }
        };

        match binding.store.delete_batch(&event.chunk_paths).await {
            Ok(()) => {
                tracing::info!(
                    session_id = %event.session_id,
                    chunks = event.chunk_paths.len(),
                    "Chunk objects deleted"
                );
            }
            Err(e) => {
                // Leftovers are picked up by the stale-chunk sweep.
                tracing::error!(
                    error = %e,
                    session_id = %event.session_id,
                    "Chunk cleanup failed"
                );
                return;
            }
        }

        if let Err(e) = self.sessions.delete(&event.session_id).await {
            tracing::error!(error = %e, session_id = %event.session_id, "Session row cleanup failed");
        }
    }
}
