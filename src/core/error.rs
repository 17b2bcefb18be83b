use thiserror::Error;

use super::types::{UserId, VideoId};

// ---------------------------------------------------------------------------
// Ingest errors
// ---------------------------------------------------------------------------

/// Errors raised while receiving a multipart upload and spooling it to disk.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed multipart body: {reason}")]
    MalformedMultipart { reason: String },

    #[error("upload exceeds the {max_bytes} byte limit")]
    UploadTooLarge { max_bytes: u64 },

    #[error("missing form field '{field}'")]
    MissingField { field: String },

    #[error("missing Content-Type for form field '{field}'")]
    MissingContentType { field: String },

    #[error("invalid Content-Type '{value}'")]
    InvalidContentType { value: String },

    #[error("unsupported media type '{media_type}'")]
    UnsupportedMediaType { media_type: String },

    #[error("uploaded file is empty")]
    EmptyUpload,

    #[error("ingest I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Media errors (probe + fast-start remux)
// ---------------------------------------------------------------------------

/// Errors from the external media tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout {
        tool: &'static str,
        timeout_secs: u64,
    },

    #[error("unparseable probe output: {reason}")]
    InvalidProbeOutput { reason: String },

    #[error("no video stream found")]
    NoVideoStream,

    #[error("invalid video geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("remux produced no output at {path}")]
    MissingOutput { path: String },

    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::Spawn { .. } => "spawn",
            MediaError::ToolFailed { .. } => "exit_status",
            MediaError::Timeout { .. } => "timeout",
            MediaError::InvalidProbeOutput { .. } => "invalid_output",
            MediaError::NoVideoStream => "no_video_stream",
            MediaError::InvalidGeometry { .. } => "invalid_geometry",
            MediaError::MissingOutput { .. } => "missing_output",
            MediaError::Io(_) => "io",
        }
    }
}

// ---------------------------------------------------------------------------
// Storage reference + signing errors
// ---------------------------------------------------------------------------

/// Errors decoding or building a persisted `"bucket,key"` reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("expected exactly one ',' in storage reference, found {found}")]
    DelimiterCount { found: usize },

    #[error("storage reference has an empty {part}")]
    EmptyPart { part: &'static str },

    #[error("storage reference {part} contains the ',' delimiter")]
    DelimiterInPart { part: &'static str },
}

/// Errors producing a signed retrieval URL.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("malformed storage reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("presigning failed for {bucket}/{key}: {reason}")]
    Presign {
        bucket: String,
        key: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors originating from an object store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object PUT failed for key {key}: {reason}")]
    PutFailed { key: String, reason: String },

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("storage configuration error: {reason}")]
    Config { reason: String },

    #[error("invalid storage reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Auth errors
// ---------------------------------------------------------------------------

/// Errors from bearer token handling.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingToken,

    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("failed to issue token: {reason}")]
    IssueFailed { reason: String },
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors from the video metadata store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("video not found: {video_id}")]
    NotFound { video_id: VideoId },

    #[error("metadata store error: {reason}")]
    Backend { reason: String },
}

// ---------------------------------------------------------------------------
// Upload errors (request level)
// ---------------------------------------------------------------------------

/// Request-level error for the upload and read endpoints.
///
/// Wraps the component errors and decides the HTTP status and the short
/// message a client sees.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid video ID '{value}'")]
    InvalidVideoId { value: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("video not found: {video_id}")]
    VideoNotFound { video_id: VideoId },

    #[error("user {user_id} does not own video {video_id}")]
    NotOwner { user_id: UserId, video_id: VideoId },

    #[error("upload timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for UploadError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { video_id } => UploadError::VideoNotFound { video_id },
            other => UploadError::Repository(other),
        }
    }
}

impl UploadError {
    /// Map to an HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::InvalidVideoId { .. } | UploadError::InvalidRequest { .. } => 400,
            UploadError::Ingest(IngestError::UploadTooLarge { .. }) => 413,
            UploadError::Ingest(IngestError::Io(_)) => 500,
            UploadError::Ingest(_) => 400,
            UploadError::Auth(AuthError::IssueFailed { .. }) => 500,
            UploadError::Auth(_) | UploadError::NotOwner { .. } => 401,
            UploadError::VideoNotFound { .. } => 404,
            UploadError::Timeout { .. }
            | UploadError::Media(_)
            | UploadError::Storage(_)
            | UploadError::Sign(_)
            | UploadError::Repository(_) => 500,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            UploadError::InvalidVideoId { .. } => "invalid_video_id",
            UploadError::InvalidRequest { .. } => "invalid_request",
            UploadError::VideoNotFound { .. } => "video_not_found",
            UploadError::NotOwner { .. } => "unauthorized",
            UploadError::Timeout { .. } => "upload_timeout",
            UploadError::Auth(AuthError::IssueFailed { .. }) => "internal_error",
            UploadError::Auth(_) => "unauthorized",
            UploadError::Ingest(e) => match e {
                IngestError::MalformedMultipart { .. } => "malformed_multipart",
                IngestError::UploadTooLarge { .. } => "payload_too_large",
                IngestError::MissingField { .. } => "missing_file",
                IngestError::MissingContentType { .. } => "missing_content_type",
                IngestError::InvalidContentType { .. } => "invalid_content_type",
                IngestError::UnsupportedMediaType { .. } => "unsupported_media_type",
                IngestError::EmptyUpload => "empty_upload",
                IngestError::Io(_) => "io_error",
            },
            UploadError::Media(_) => "processing_error",
            UploadError::Storage(_) => "storage_error",
            UploadError::Sign(_) => "signing_error",
            UploadError::Repository(_) => "metadata_store_error",
        }
    }

    /// Short human-readable message for the response body.
    ///
    /// Client errors echo the error itself; internal failures name the step
    /// that failed without exposing tool output or backend details.
    pub fn public_message(&self) -> String {
        match self {
            UploadError::Ingest(IngestError::Io(_)) => "Error saving file to disk".to_string(),
            UploadError::Auth(AuthError::IssueFailed { .. }) => "Error issuing token".to_string(),
            UploadError::NotOwner { .. } => "Unauthorized".to_string(),
            UploadError::Timeout { .. } => "Upload timed out".to_string(),
            UploadError::Media(MediaError::Timeout { tool, .. })
            | UploadError::Media(MediaError::Spawn { tool, .. })
            | UploadError::Media(MediaError::ToolFailed { tool, .. }) => {
                format!("Error processing video file ({})", tool)
            }
            UploadError::Media(_) => "Error processing video file".to_string(),
            UploadError::Storage(_) => "Error uploading file to storage".to_string(),
            UploadError::Sign(_) => "Error generating video URL".to_string(),
            UploadError::Repository(_) => "Error updating video record".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_400() {
        let cases = [
            UploadError::InvalidVideoId {
                value: "x".to_string(),
            },
            UploadError::Ingest(IngestError::EmptyUpload),
            UploadError::Ingest(IngestError::UnsupportedMediaType {
                media_type: "video/avi".to_string(),
            }),
            UploadError::Ingest(IngestError::MissingContentType {
                field: "video".to_string(),
            }),
        ];
        for err in cases {
            assert_eq!(err.status_code(), 400, "{err}");
        }
    }

    #[test]
    fn test_auth_errors_are_401() {
        assert_eq!(UploadError::Auth(AuthError::MissingToken).status_code(), 401);
        let err = UploadError::NotOwner {
            user_id: UserId::new(),
            video_id: VideoId::new(),
        };
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.public_message(), "Unauthorized");
    }

    #[test]
    fn test_internal_errors_are_500_without_details() {
        let err = UploadError::Media(MediaError::ToolFailed {
            tool: "ffprobe",
            status: "exit status: 1".to_string(),
            stderr: "/tmp/secret/path: Invalid data".to_string(),
        });
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "processing_error");
        assert!(!err.public_message().contains("/tmp"));

        let err = UploadError::Sign(SignError::Reference(ReferenceError::DelimiterCount {
            found: 0,
        }));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "signing_error");
    }

    #[test]
    fn test_too_large_is_413() {
        let err = UploadError::Ingest(IngestError::UploadTooLarge { max_bytes: 10 });
        assert_eq!(err.status_code(), 413);
        assert_eq!(err.error_code(), "payload_too_large");
    }

    #[test]
    fn test_repository_not_found_maps_to_video_not_found() {
        let video_id = VideoId::new();
        let err: UploadError = RepositoryError::NotFound { video_id }.into();
        assert!(matches!(err, UploadError::VideoNotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }
}
