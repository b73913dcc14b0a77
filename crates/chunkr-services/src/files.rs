//! File service: access to finalized files.

use std::sync::Arc;
use std::time::Duration;

use chunkr_core::{paths, AppError, AppResult, FinalizedFile, StorageClass};
use chunkr_db::MetadataStore;

use crate::bindings::{store_error, BucketBindings};

#[derive(Clone)]
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    bindings: BucketBindings,
    presign_ttl: Duration,
}

impl FileService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        bindings: BucketBindings,
        presign_ttl: Duration,
    ) -> Self {
        Self {
            metadata,
            bindings,
            presign_ttl,
        }
    }

    /// URL for downloading a finalized object: direct for public buckets,
    /// presigned for private ones. Bumps the access counter off the request
    /// path; a counter failure never fails the download.
    #[tracing::instrument(skip(self), fields(path = %path, storage_class = %class))]
    pub async fn download_url(&self, path: &str, class: StorageClass) -> AppResult<String> {
        let binding = self.bindings.for_class(class)?;

        let url = match binding.profile.public_base_url.as_deref() {
            Some(base) if binding.profile.is_public() => {
                format!("{}/{}", base.trim_end_matches('/'), encode_path(path))
            }
            _ => binding
                .store
                .presigned_get_url(path, self.presign_ttl)
                .await
                .map_err(store_error)?,
        };

        if let Some(hash) = paths::extract_content_hash(path) {
            let metadata = Arc::clone(&self.metadata);
            let hash = hash.to_string();
            tokio::spawn(async move {
                if let Err(e) = metadata.touch_access(&hash, class).await {
                    tracing::warn!(error = %e, content_hash = %hash, "Access counter update failed");
                }
            });
        }

        Ok(url)
    }

    /// Delete a finalized object and its catalog row. The content hash is
    /// recovered from the path itself, no lookup needed.
    #[tracing::instrument(skip(self), fields(path = %path, storage_class = %class))]
    pub async fn delete(&self, path: &str, class: StorageClass) -> AppResult<()> {
        let hash = paths::extract_content_hash(path).ok_or_else(|| {
            AppError::InvalidArgument(format!("not a finalized object path: {}", path))
        })?;

        let binding = self.bindings.for_class(class)?;
        match binding.store.delete(path).await {
            Ok(()) => {}
            // Already gone is fine; the catalog row still has to go.
            Err(chunkr_storage::StorageError::NotFound(_)) => {
                tracing::debug!(path = %path, "Object already absent");
            }
            Err(e) => return Err(store_error(e)),
        }

        let removed = self.metadata.delete_by_hash(hash, class).await?;
        tracing::info!(
            path = %path,
            content_hash = %hash,
            catalog_row_removed = removed,
            "Finalized file deleted"
        );
        Ok(())
    }

    pub async fn list(&self, class: Option<StorageClass>) -> AppResult<Vec<FinalizedFile>> {
        self.metadata.list(class).await
    }
}

/// Percent-encode each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
