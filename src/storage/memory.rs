use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::error::StorageError;
use crate::observability::metrics as obs_metrics;

use super::{ObjectStore, StorageReference};

// ---------------------------------------------------------------------------
// InMemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store for development and tests.
///
/// Objects live in a `HashMap` behind a `RwLock`, keyed by object key within
/// a single bucket. Paired with `HmacUrlSigner` and the `/assets` route so
/// signed URLs resolve without S3.
pub struct InMemoryObjectStore {
    bucket: String,
    base_url: String,
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

/// One stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: &str, base_url: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch an object by bucket and key.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let not_found = || StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        if bucket != self.bucket {
            return Err(not_found());
        }
        let objects = self.objects.read().await;
        objects.get(key).cloned().ok_or_else(not_found)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<StorageReference, StorageError> {
        let reference = StorageReference::new(self.bucket.as_str(), key)?;
        let start = Instant::now();

        let data = Bytes::from(tokio::fs::read(local_path).await?);
        let size = data.len() as u64;

        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                created_at: Utc::now(),
            },
        );
        drop(objects);

        obs_metrics::record_storage_put_duration(self.backend(), start.elapsed().as_secs_f64());
        obs_metrics::add_storage_put_bytes(self.backend(), size);
        debug!(object_key = key, size, "object stored in memory");
        Ok(reference)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/assets/{}/{}", self.base_url, self.bucket, key)
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryObjectStore {
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryObjectStore {
        InMemoryObjectStore::new("media", "http://localhost:8091/")
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.mp4");
        std::fs::write(&path, b"moov-first").unwrap();

        let store = store();
        let reference = store
            .put("landscape/abc.mp4", &path, "video/mp4")
            .await
            .unwrap();
        assert_eq!(reference.encode(), "media,landscape/abc.mp4");

        let obj = store.get("media", "landscape/abc.mp4").await.unwrap();
        assert_eq!(obj.data.as_ref(), b"moov-first");
        assert_eq!(obj.content_type, "video/mp4");
        assert_eq!(store.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_wrong_bucket() {
        let store = store();
        assert!(matches!(
            store.get("other", "x").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_missing_file_is_io_error() {
        let store = store();
        let err = store
            .put("k.mp4", Path::new("/nonexistent/tubely"), "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!store.exists("k.mp4").await);
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            store().public_url("abc.png"),
            "http://localhost:8091/assets/media/abc.png"
        );
    }
}
