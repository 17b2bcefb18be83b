use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, error};

use crate::core::config::StorageConfig;
use crate::core::error::{SignError, StorageError};
use crate::observability::metrics as obs_metrics;

use super::signer::UrlSigner;
use super::{ObjectStore, StorageReference};

// ---------------------------------------------------------------------------
// S3ObjectStore
// ---------------------------------------------------------------------------

/// Production object store wrapping `aws-sdk-s3`.
///
/// Supports AWS S3 and S3-compatible stores (MinIO, R2, etc.) via a
/// configurable endpoint and path-style addressing. Failed PUTs are not
/// retried; the caller sees the error and the record stays untouched.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: String,
    path_style: bool,
    request_timeout: Duration,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore from configuration.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.region.is_empty() {
            return Err(StorageError::Config {
                reason: "storage.region is required for the s3 backend".to_string(),
            });
        }

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if !config.access_key_id.is_empty() {
            let credentials = Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "tubely-config",
            );
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        }

        if !config.endpoint.is_empty() {
            s3_config_builder = s3_config_builder.endpoint_url(&config.endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            path_style: config.path_style,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend(&self) -> &'static str {
        "s3"
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

        let size = tokio::fs::metadata(local_path).await?.len();
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::PutFailed {
                key: key.to_string(),
                reason: format!("cannot open body: {}", e),
            })?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send();

        let result = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StorageError::PutFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(StorageError::PutFailed {
                key: key.to_string(),
                reason: format!("timed out after {}s", self.request_timeout.as_secs()),
            }),
        };

        if let Err(e) = result {
            obs_metrics::inc_storage_error("put", "s3");
            error!(object_key = key, error = %e, "S3 PUT failed");
            return Err(e);
        }

        obs_metrics::record_storage_put_duration(self.backend(), start.elapsed().as_secs_f64());
        obs_metrics::add_storage_put_bytes(self.backend(), size);
        debug!(object_key = key, size, "S3 PUT complete");
        Ok(reference)
    }

    fn public_url(&self, key: &str) -> String {
        if self.endpoint.is_empty() {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        } else if self.path_style {
            format!("{}/{}/{}", self.endpoint, self.bucket, key)
        } else {
            match self.endpoint.split_once("://") {
                Some((scheme, host)) => format!("{}://{}.{}/{}", scheme, self.bucket, host, key),
                None => format!("{}/{}/{}", self.endpoint, self.bucket, key),
            }
        }
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let request = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StorageError::Unavailable {
                reason: e.to_string(),
            }),
            Err(_) => Err(StorageError::Unavailable {
                reason: "head_bucket timed out".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// S3 presigner
// ---------------------------------------------------------------------------

/// `UrlSigner` producing SigV4 presigned GET URLs.
pub struct S3UrlSigner {
    client: Client,
}

impl S3UrlSigner {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SignError> {
        let presign_error = |reason: String| SignError::Presign {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| presign_error(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| presign_error(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::storage::SignedUrlIssuer;
    use std::sync::Arc;

    fn s3_config() -> StorageConfig {
        let mut config = AppConfig::default().storage;
        config.backend = "s3".to_string();
        config.bucket = "tubely-test".to_string();
        config.region = "us-east-2".to_string();
        config.access_key_id = "AKIDEXAMPLE".to_string();
        config.secret_access_key = "wJalrXUtnFEMI/K7MDENG".to_string();
        config
    }

    #[tokio::test]
    async fn test_public_url_virtual_hosted() {
        let store = S3ObjectStore::new(&s3_config()).await.unwrap();
        assert_eq!(
            store.public_url("abc.png"),
            "https://tubely-test.s3.us-east-2.amazonaws.com/abc.png"
        );
    }

    #[tokio::test]
    async fn test_public_url_path_style_endpoint() {
        let mut config = s3_config();
        config.endpoint = "http://localhost:9000/".to_string();
        config.path_style = true;
        let store = S3ObjectStore::new(&config).await.unwrap();
        assert_eq!(
            store.public_url("abc.png"),
            "http://localhost:9000/tubely-test/abc.png"
        );
    }

    #[tokio::test]
    async fn test_presigned_url_offline() {
        let store = S3ObjectStore::new(&s3_config()).await.unwrap();
        let issuer = SignedUrlIssuer::new(Arc::new(S3UrlSigner::new(store.client())));

        let url = issuer
            .issue("tubely-test,landscape/abc.mp4")
            .await
            .unwrap();
        assert!(url.contains("landscape/abc.mp4"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=300"));
    }

    #[tokio::test]
    async fn test_missing_region_rejected() {
        let mut config = s3_config();
        config.region.clear();
        assert!(matches!(
            S3ObjectStore::new(&config).await,
            Err(StorageError::Config { .. })
        ));
    }
}
