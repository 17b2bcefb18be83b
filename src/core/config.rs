use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::redact::Redacted;
use super::security;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub media: MediaConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_cors_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory for temporary upload spools. Empty means the OS temp dir.
    #[serde(default)]
    pub spool_dir: PathBuf,
    pub max_video_bytes: u64,
    pub max_thumbnail_bytes: u64,
    pub upload_timeout_secs: u64,
}

impl UploadConfig {
    pub fn spool_dir(&self) -> PathBuf {
        if self.spool_dir.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            self.spool_dir.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub probe_timeout_secs: u64,
    pub remux_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `"s3"` or `"memory"`.
    pub backend: String,
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Base URL the in-memory backend uses for public and signed object URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// HMAC key for the in-memory backend's URL signer.
    #[serde(default)]
    pub signing_secret: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_public_base_url() -> String {
    "http://localhost:8091".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &Redacted::new(&self.secret_access_key))
            .field("path_style", &self.path_style)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("public_base_url", &self.public_base_url)
            .field("signing_secret", &Redacted::new(&self.signing_secret))
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &Redacted::new(&self.jwt_secret))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on TUBELY_ENV)
    /// 3. Environment variables (TUBELY_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config"))
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let default_path = dir.join("default.toml");
        let default_content = std::fs::read_to_string(&default_path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", default_path.display(), e))?;

        let mut config: AppConfig = toml::from_str(&default_content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?;

        // Layer 2: environment-specific overrides
        let env_name = std::env::var("TUBELY_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = dir.join(format!("{}.toml", env_name));
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_config: AppConfig = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path.display(), e))?;
            config = env_config;
        }

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("TUBELY_SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = std::env::var("TUBELY_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("TUBELY_UPLOAD_SPOOL_DIR") {
            config.upload.spool_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TUBELY_MEDIA_FFPROBE_PATH") {
            config.media.ffprobe_path = v;
        }
        if let Ok(v) = std::env::var("TUBELY_MEDIA_FFMPEG_PATH") {
            config.media.ffmpeg_path = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_BACKEND") {
            config.storage.backend = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_BUCKET") {
            config.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_REGION") {
            config.storage.region = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_ACCESS_KEY_ID") {
            config.storage.access_key_id = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_SECRET_ACCESS_KEY") {
            config.storage.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_PUBLIC_BASE_URL") {
            config.storage.public_base_url = v;
        }
        if let Ok(v) = std::env::var("TUBELY_STORAGE_SIGNING_SECRET") {
            config.storage.signing_secret = v;
        }
        if let Ok(v) = std::env::var("TUBELY_AUTH_JWT_SECRET") {
            config.auth.jwt_secret = v;
        }
        if let Ok(v) = std::env::var("TUBELY_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
        if let Ok(v) = std::env::var("TUBELY_OBSERVABILITY_LOG_FORMAT") {
            config.observability.log_format = v;
        }
    }

    /// Reject combinations the service cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.bucket.is_empty() || self.storage.bucket.contains(',') {
            anyhow::bail!(
                "storage.bucket must be non-empty and must not contain ',' (got {:?})",
                self.storage.bucket
            );
        }
        match self.storage.backend.as_str() {
            "s3" | "memory" => {}
            other => anyhow::bail!("unknown storage.backend {:?}", other),
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret must be set");
        }
        if self.upload.max_video_bytes == 0 || self.upload.max_thumbnail_bytes == 0 {
            anyhow::bail!("upload size ceilings must be non-zero");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8091,
                cors_allowed_origins: default_cors_allowed_origins(),
            },
            upload: UploadConfig {
                spool_dir: PathBuf::new(),
                max_video_bytes: security::MAX_VIDEO_UPLOAD_BYTES,
                max_thumbnail_bytes: security::MAX_THUMBNAIL_UPLOAD_BYTES,
                upload_timeout_secs: 600,
            },
            media: MediaConfig {
                ffprobe_path: "ffprobe".to_string(),
                ffmpeg_path: "ffmpeg".to_string(),
                probe_timeout_secs: 30,
                remux_timeout_secs: 300,
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
                bucket: "tubely-media".to_string(),
                region: "us-east-1".to_string(),
                endpoint: String::new(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                path_style: false,
                request_timeout_secs: 30,
                public_base_url: default_public_base_url(),
                signing_secret: "dev-signing-secret".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: "dev-jwt-secret".to_string(),
                token_ttl_secs: 3600,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "json".to_string(),
                metrics_enabled: true,
            },
        }
    }
}
