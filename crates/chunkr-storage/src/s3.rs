use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{
    ObjectStore as _, ObjectStoreExt, PutPayload, Result as ObjectResult, WriteMultipart,
};
use std::time::Duration;

use chunkr_core::StoreObject;

use crate::traits::{ObjectStore, StorageError, StorageResult};

/// S3-compatible object store backend.
///
/// One instance per bucket. Works against AWS S3 and S3-compatible providers
/// (MinIO, DigitalOcean Spaces) via a custom endpoint.
#[derive(Clone)]
pub struct S3ObjectStore {
    store: AmazonS3,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore bound to `bucket`.
    ///
    /// Credentials come from the environment (standard AWS variables).
    /// `endpoint_url` switches to an S3-compatible provider, e.g.
    /// "http://localhost:9000" for MinIO.
    pub fn new(
        bucket: String,
        region: Option<String>,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket.clone());

        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(S3ObjectStore { store, bucket })
    }

    fn map_err(path: &str, err: ObjectStoreError) -> StorageError {
        match err {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => StorageError::Transient(other.to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, path: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let size = data.len() as u64;
        let location = Path::from(path.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %path,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            StorageError::Transient(e.to_string())
        })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let location = Path::from(path.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| Self::map_err(path, e))?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))
    }

    async fn compose(
        &self,
        sources: &[String],
        target: &str,
        _content_type: &str,
    ) -> StorageResult<()> {
        if sources.is_empty() {
            return Err(StorageError::InvalidRequest(
                "compose requires at least one source".to_string(),
            ));
        }

        let location = Path::from(target.to_string());
        let start = std::time::Instant::now();

        // Streamed into a multipart upload of the target; the composed object
        // only becomes visible when the upload completes, so an aborted
        // compose leaves no partial target behind.
        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?;
        let mut write = WriteMultipart::new(upload);

        for source in sources {
            let src_location = Path::from(source.to_string());
            let result = self.store.get(&src_location).await.map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => StorageError::SourceMissing(source.clone()),
                other => StorageError::Transient(other.to_string()),
            })?;

            let mut stream = result.into_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StorageError::Transient(e.to_string()))?;
                write.write(&chunk);
            }
        }

        write
            .finish()
            .await
            .map_err(|e| StorageError::Transient(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            target = %target,
            parts = sources.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 compose successful"
        );

        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<StoreObject>> {
        let prefix_path = prefix.map(|p| Path::from(p.to_string()));
        let mut stream = self.store.list(prefix_path.as_ref());

        let mut objects = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| StorageError::Transient(e.to_string()))?;
            objects.push(StoreObject {
                path: meta.location.to_string(),
                size: meta.size,
                last_modified: meta.last_modified,
            });
        }
        Ok(objects)
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let location = Path::from(path.to_string());
        let result: ObjectResult<_> = self.store.delete(&location).await;
        result.map_err(|e| Self::map_err(path, e))
    }

    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()> {
        for path in paths {
            match self.delete(path).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let location = Path::from(path.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Transient(e.to_string())),
        }
    }

    async fn presigned_get_url(&self, path: &str, expires_in: Duration) -> StorageResult<String> {
        let location = Path::from(path.to_string());
        let url_result: ObjectResult<_> = self
            .store
            .signed_url(Method::GET, &location, expires_in)
            .await;

        Ok(url_result
            .map_err(|e| StorageError::Transient(e.to_string()))?
            .to_string())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
