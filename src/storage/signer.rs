use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::core::error::{SignError, StorageError};
use crate::core::redact::redact_signed_url;
use crate::core::security::{SIGNED_URL_NONCE_BYTES, SIGNED_URL_TTL_SECS};
use crate::observability::metrics as obs_metrics;

use super::StorageReference;

type HmacSha256 = Hmac<Sha256>;

/// Validity window of every issued retrieval URL.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(SIGNED_URL_TTL_SECS);

// ---------------------------------------------------------------------------
// UrlSigner trait
// ---------------------------------------------------------------------------

/// Produces a time-limited retrieval URL for one object.
///
/// Implementations are pure functions of (bucket, key, ttl, clock,
/// credentials) and safe to call concurrently.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SignError>;
}

// ---------------------------------------------------------------------------
// Signed URL issuer
// ---------------------------------------------------------------------------

/// Turns a persisted `"bucket,key"` reference into a fresh signed URL.
///
/// Called on every read; nothing is cached between requests.
#[derive(Clone)]
pub struct SignedUrlIssuer {
    signer: Arc<dyn UrlSigner>,
    ttl: Duration,
}

impl SignedUrlIssuer {
    pub fn new(signer: Arc<dyn UrlSigner>) -> Self {
        Self {
            signer,
            ttl: SIGNED_URL_TTL,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue(&self, encoded: &str) -> Result<String, SignError> {
        let reference: StorageReference = encoded.parse().map_err(|e| {
            obs_metrics::inc_signed_url_error("malformed_reference");
            warn!(error = %e, "stored video reference is malformed");
            SignError::Reference(e)
        })?;

        let url = self
            .signer
            .sign(reference.bucket(), reference.key(), self.ttl)
            .await
            .inspect_err(|_| obs_metrics::inc_signed_url_error("presign"))?;

        obs_metrics::inc_signed_url_issued(self.signer.backend());
        debug!(url = %redact_signed_url(&url), "signed URL issued");
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// HMAC signer (in-memory backend)
// ---------------------------------------------------------------------------

/// Outcome of checking a signed `/assets` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Expired,
    Invalid,
}

/// HMAC-SHA256 URL signer for the in-memory backend.
///
/// URL shape: `<base>/assets/<bucket>/<key>?expires=<unix>&nonce=<hex>&signature=<hex>`.
/// A fresh random nonce per call makes every URL distinct even within the
/// same second.
pub struct HmacUrlSigner {
    keyed: HmacSha256,
    base_url: String,
}

impl HmacUrlSigner {
    pub fn new(secret: &[u8], base_url: &str) -> Result<Self, StorageError> {
        let keyed = HmacSha256::new_from_slice(secret).map_err(|e| StorageError::Config {
            reason: format!("invalid signing secret: {}", e),
        })?;
        Ok(Self {
            keyed,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64, nonce: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(bucket.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(nonce.as_bytes());
        mac
    }

    /// Sign for an explicit expiry timestamp.
    pub fn sign_until(&self, bucket: &str, key: &str, expires: i64) -> String {
        let mut nonce = [0u8; SIGNED_URL_NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);
        let nonce = hex::encode(nonce);
        let signature = hex::encode(self.mac(bucket, key, expires, &nonce).finalize().into_bytes());
        format!(
            "{}/assets/{}/{}?expires={}&nonce={}&signature={}",
            self.base_url, bucket, key, expires, nonce, signature
        )
    }

    /// Check a signature in constant time, then the expiry against `now`.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        nonce: &str,
        signature: &str,
        now: i64,
    ) -> Verification {
        let Ok(tag) = hex::decode(signature) else {
            return Verification::Invalid;
        };
        if self
            .mac(bucket, key, expires, nonce)
            .verify_slice(&tag)
            .is_err()
        {
            return Verification::Invalid;
        }
        if now > expires {
            return Verification::Expired;
        }
        Verification::Valid
    }
}

#[async_trait]
impl UrlSigner for HmacUrlSigner {
    fn backend(&self) -> &'static str {
        "hmac"
    }

    async fn sign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String, SignError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(self.sign_until(bucket, key, expires))
    }
}
