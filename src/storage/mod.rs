pub mod memory;
pub mod reference;
#[cfg(feature = "s3")]
pub mod s3;
pub mod signer;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::StorageConfig;
use crate::core::error::StorageError;

pub use memory::InMemoryObjectStore;
pub use reference::StorageReference;
pub use signer::{HmacUrlSigner, SignedUrlIssuer, UrlSigner, SIGNED_URL_TTL};

// ---------------------------------------------------------------------------
// ObjectStore trait
// ---------------------------------------------------------------------------

/// Remote object store holding finished media files.
///
/// `put` is the only producer of `StorageReference` values; the returned
/// reference is what gets persisted on the video record.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend label for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Bucket every object is written to.
    fn bucket(&self) -> &str;

    /// Upload the file at `local_path` under `key`, streaming it as the body.
    async fn put(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<StorageReference, StorageError>;

    /// Unsigned URL of an object, for publicly readable assets.
    fn public_url(&self, key: &str) -> String;

    /// Cheap reachability check for readiness probes.
    async fn health_check(&self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Backend factory
// ---------------------------------------------------------------------------

/// A connected storage backend: the store, its URL signer, and for the
/// in-memory backend the concrete handles the `/assets` route needs.
#[derive(Clone)]
pub struct StorageBackend {
    pub store: Arc<dyn ObjectStore>,
    pub signer: Arc<dyn UrlSigner>,
    pub local: Option<LocalDelivery>,
}

/// Concrete in-memory store plus HMAC signer, used to serve signed objects.
#[derive(Clone)]
pub struct LocalDelivery {
    pub store: Arc<InMemoryObjectStore>,
    pub signer: Arc<HmacUrlSigner>,
}

impl StorageBackend {
    /// Build the in-memory backend with its HMAC signer.
    pub fn in_memory(config: &StorageConfig) -> Result<Self, StorageError> {
        let store = Arc::new(InMemoryObjectStore::new(
            &config.bucket,
            &config.public_base_url,
        ));
        let signer = Arc::new(HmacUrlSigner::new(
            config.signing_secret.as_bytes(),
            &config.public_base_url,
        )?);
        Ok(Self {
            store: store.clone(),
            signer: signer.clone(),
            local: Some(LocalDelivery { store, signer }),
        })
    }
}

/// Connect the storage backend named by `config.backend`.
pub async fn connect(config: &StorageConfig) -> Result<StorageBackend, StorageError> {
    match config.backend.as_str() {
        "memory" => {
            if config.signing_secret.is_empty() {
                return Err(StorageError::Config {
                    reason: "storage.signing_secret is required for the memory backend"
                        .to_string(),
                });
            }
            StorageBackend::in_memory(config)
        }

        #[cfg(feature = "s3")]
        "s3" => {
            let store = s3::S3ObjectStore::new(config).await?;
            let signer = Arc::new(s3::S3UrlSigner::new(store.client()));
            Ok(StorageBackend {
                store: Arc::new(store),
                signer,
                local: None,
            })
        }

        #[cfg(not(feature = "s3"))]
        "s3" => Err(StorageError::Config {
            reason: "S3 backend not available (s3 feature not enabled)".to_string(),
        }),

        other => Err(StorageError::Config {
            reason: format!("unknown storage backend '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = AppConfig::default().storage;
        let backend = connect(&config).await.unwrap();
        assert_eq!(backend.store.backend(), "memory");
        assert_eq!(backend.store.bucket(), "tubely-media");
        assert!(backend.local.is_some());
    }

    #[tokio::test]
    async fn test_memory_backend_requires_secret() {
        let mut config = AppConfig::default().storage;
        config.signing_secret.clear();
        assert!(matches!(
            connect(&config).await,
            Err(StorageError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let mut config = AppConfig::default().storage;
        config.backend = "ftp".to_string();
        assert!(connect(&config).await.is_err());
    }
}
