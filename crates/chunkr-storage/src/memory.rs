//! In-memory object store backend.
//!
//! Used by the service test suites and by local development without an
//! S3-compatible provider. Honors the same semantics as the S3 backend,
//! including atomic compose (no partial target on failure).

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chunkr_core::StoreObject;

use crate::traits::{ObjectStore, StorageError, StorageResult};

#[derive(Clone)]
struct Entry {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        MemoryObjectStore {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Rewrite an object's last-modified time. Test hook for age-based
    /// sweep logic, which otherwise would need to actually wait.
    pub fn backdate(&self, path: &str, last_modified: DateTime<Utc>) -> bool {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        match objects.get_mut(path) {
            Some(entry) => {
                entry.last_modified = last_modified;
                true
            }
            None => false,
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Content type recorded for an object, as an S3 HEAD would report it.
    pub fn content_type(&self, path: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(path).map(|entry| entry.content_type.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if path.is_empty() || path.starts_with('/') {
            return Err(StorageError::InvalidRequest(format!(
                "invalid object path: {path:?}"
            )));
        }
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            path.to_string(),
            Entry {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn compose(
        &self,
        sources: &[String],
        target: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        if sources.is_empty() {
            return Err(StorageError::InvalidRequest(
                "compose requires at least one source".to_string(),
            ));
        }
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());

        // Gather every source before touching the target so a missing part
        // never leaves a partial composed object behind.
        let mut combined = BytesMut::new();
        for source in sources {
            let entry = objects
                .get(source)
                .ok_or_else(|| StorageError::SourceMissing(source.clone()))?;
            combined.extend_from_slice(&entry.data);
        }

        objects.insert(
            target.to_string(),
            Entry {
                data: combined.freeze(),
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<StoreObject>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects
            .iter()
            .filter(|(path, _)| prefix.is_none_or(|p| path.starts_with(p)))
            .map(|(path, entry)| StoreObject {
                path: path.clone(),
                size: entry.data.len() as u64,
                last_modified: entry.last_modified,
            })
            .collect())
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete_batch(&self, paths: &[String]) -> StorageResult<()> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects.contains_key(path))
    }

    async fn presigned_get_url(&self, _path: &str, _expires_in: Duration) -> StorageResult<String> {
        Err(StorageError::Config(
            "presigned URLs are not supported by the in-memory backend".to_string(),
        ))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("abc/1", Bytes::from_static(b"hello"), "application/octet-stream")
            .await
            .unwrap();

        assert!(store.exists("abc/1").await.unwrap());
        assert_eq!(store.get("abc/1").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(
            store.content_type("abc/1").as_deref(),
            Some("application/octet-stream")
        );

        store.delete("abc/1").await.unwrap();
        assert!(!store.exists("abc/1").await.unwrap());
        assert!(matches!(
            store.delete("abc/1").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn compose_concatenates_in_order() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("s/1", Bytes::from_static(b"foo"), "text/plain")
            .await
            .unwrap();
        store
            .put("s/2", Bytes::from_static(b"bar"), "text/plain")
            .await
            .unwrap();

        store
            .compose(
                &["s/1".to_string(), "s/2".to_string()],
                "final/out.txt",
                "text/plain",
            )
            .await
            .unwrap();

        assert_eq!(
            store.get("final/out.txt").await.unwrap(),
            Bytes::from_static(b"foobar")
        );
        // The target carries the compose content type, not the sources'.
        assert_eq!(
            store.content_type("final/out.txt").as_deref(),
            Some("text/plain")
        );
        // Sources stay in place until cleanup.
        assert!(store.exists("s/1").await.unwrap());
    }

    #[tokio::test]
    async fn compose_with_missing_source_leaves_no_target() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("s/1", Bytes::from_static(b"foo"), "text/plain")
            .await
            .unwrap();

        let err = store
            .compose(
                &["s/1".to_string(), "s/2".to_string()],
                "final/out.txt",
                "text/plain",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::SourceMissing(ref p) if p == "s/2"));
        assert!(!store.exists("final/out.txt").await.unwrap());
    }

    #[tokio::test]
    async fn delete_batch_skips_missing_objects() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("s/1", Bytes::from_static(b"foo"), "text/plain")
            .await
            .unwrap();

        store
            .delete_batch(&["s/1".to_string(), "s/2".to_string()])
            .await
            .unwrap();
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryObjectStore::new("test-bucket");
        store
            .put("abc/1", Bytes::from_static(b"a"), "text/plain")
            .await
            .unwrap();
        store
            .put("abc/2", Bytes::from_static(b"bb"), "text/plain")
            .await
            .unwrap();
        store
            .put("xyz/1", Bytes::from_static(b"c"), "text/plain")
            .await
            .unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let scoped = store.list(Some("abc/")).await.unwrap();
        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped[0].path, "abc/1");
        assert_eq!(scoped[0].size, 1);
    }
}
