//! Reconciler: scheduled sweeps that recover storage from failed flows.
//!
//! Three sweeps, all read-list-then-delete with no transactional guarantee
//! against concurrent writes landing in the same window; the age threshold
//! must stay generous relative to expected upload and merge duration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use chunkr_core::paths;
use chunkr_db::{MetadataStore, SessionStore};

use crate::bindings::BucketBindings;

#[derive(Clone)]
pub struct Reconciler {
    sessions: Arc<dyn SessionStore>,
    metadata: Arc<dyn MetadataStore>,
    bindings: BucketBindings,
    stale_chunk_threshold: Duration,
    interval_secs: u64,
}

impl Reconciler {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        metadata: Arc<dyn MetadataStore>,
        bindings: BucketBindings,
        stale_chunk_threshold: Duration,
        interval_secs: u64,
    ) -> Self {
        Self {
            sessions,
            metadata,
            bindings,
            stale_chunk_threshold,
            interval_secs,
        }
    }

    /// Start the background sweep loop.
    /// Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));

            loop {
                sweep_interval.tick().await;

                tracing::info!("Starting reconciliation sweeps");
                if let Err(e) = self.run_once(Utc::now()).await {
                    tracing::error!(error = %e, "Reconciliation run failed");
                }
            }
        })
    }

    /// One full reconciliation pass. Each sweep failure is logged and does
    /// not stop the others.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<(), anyhow::Error> {
        let expired = match self.sweep_expired_sessions(now).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Expired-session sweep failed");
                0
            }
        };

        let mut stale_chunks = 0;
        let mut orphans = 0;
        for binding in self.bindings.iter() {
            let class = binding.profile.class;
            match self.sweep_stale_chunks(binding, now).await {
                Ok(count) => stale_chunks += count,
                Err(e) => {
                    tracing::error!(error = %e, storage_class = %class, "Stale-chunk sweep failed")
                }
            }
            match self.sweep_orphan_objects(binding).await {
                Ok(count) => orphans += count,
                Err(e) => {
                    tracing::error!(error = %e, storage_class = %class, "Orphan sweep failed")
                }
            }
        }

        tracing::info!(
            expired_sessions = expired,
            stale_chunks,
            orphan_objects = orphans,
            "Reconciliation completed"
        );
        Ok(())
    }

    /// Expire overdue sessions, delete their chunk objects and drop the rows.
    pub async fn sweep_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, anyhow::Error> {
        let expired = self.sessions.expire_overdue(now).await?;
        let count = expired.len();

        for session in expired {
            tracing::info!(
                session_id = %session.session_id,
                expires_at = %session.expires_at,
                uploaded = session.uploaded_count,
                "Cleaning up expired session"
            );

            let recorded: Vec<String> = session.chunk_paths.iter().flatten().cloned().collect();
            if !recorded.is_empty() {
                let binding = self.bindings.for_class(session.storage_class)?;
                if let Err(e) = binding.store.delete_batch(&recorded).await {
                    tracing::error!(
                        error = %e,
                        session_id = %session.session_id,
                        "Failed to delete expired session chunks, leaving for stale sweep"
                    );
                    continue;
                }
            }

            if let Err(e) = self.sessions.delete(&session.session_id).await {
                tracing::error!(error = %e, session_id = %session.session_id, "Failed to delete session row");
            }
        }

        Ok(count)
    }

    /// Delete non-final-pattern objects older than the threshold. These are
    /// chunks of sessions that never completed.
    pub async fn sweep_stale_chunks(
        &self,
        binding: &crate::bindings::BucketBinding,
        now: DateTime<Utc>,
    ) -> Result<usize, anyhow::Error> {
        let cutoff = now - self.stale_chunk_threshold;
        let objects = binding.store.list(None).await?;

        let stale: Vec<String> = objects
            .into_iter()
            .filter(|object| {
                !paths::is_final_object_path(&object.path) && object.last_modified <= cutoff
            })
            .map(|object| object.path)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        tracing::info!(
            bucket = %binding.store.bucket(),
            count = stale.len(),
            cutoff = %cutoff,
            "Deleting stale chunk objects"
        );
        binding.store.delete_batch(&stale).await?;
        Ok(stale.len())
    }

    /// Delete final-pattern objects whose embedded content hash has no
    /// catalog row. These come from merges whose metadata persist
    /// permanently failed.
    pub async fn sweep_orphan_objects(
        &self,
        binding: &crate::bindings::BucketBinding,
    ) -> Result<usize, anyhow::Error> {
        let objects = binding.store.list(None).await?;
        let class = binding.profile.class;
        let mut deleted = 0;

        for object in objects {
            let Some(hash) = paths::extract_content_hash(&object.path) else {
                continue;
            };
            if self.metadata.find_by_hash(hash, class).await?.is_some() {
                continue;
            }

            tracing::warn!(
                bucket = %binding.store.bucket(),
                path = %object.path,
                content_hash = %hash,
                "Deleting orphaned object with no catalog row"
            );
            match binding.store.delete(&object.path).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::error!(error = %e, path = %object.path, "Failed to delete orphan")
                }
            }
        }

        Ok(deleted)
    }
}
