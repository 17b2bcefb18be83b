use std::path::Path;

use axum::extract::multipart::{Multipart, MultipartError};
use futures::TryStreamExt;
use http::StatusCode;
use tracing::debug;

use crate::core::error::IngestError;
use crate::core::types::UploadKind;

use super::spool::{spool_stream, TempSpool};
use super::validator::validate_content_type;

/// A validated upload sitting in a temp spool.
#[derive(Debug)]
pub struct SpooledUpload {
    pub spool: TempSpool,
    /// Lowercase media type essence, e.g. `video/mp4`.
    pub media_type: String,
}

/// Read the multipart body, spool the `kind`'s form field to `spool_dir`.
///
/// Unrelated fields are drained and skipped. The content type is checked
/// before any byte is written, so rejected parts never touch disk. The body
/// size ceiling is enforced by the route's `DefaultBodyLimit`; overrunning it
/// surfaces here as `UploadTooLarge` while streaming.
pub async fn receive_upload(
    mut multipart: Multipart,
    kind: UploadKind,
    spool_dir: &Path,
    max_bytes: u64,
) -> Result<SpooledUpload, IngestError> {
    let wanted = kind.form_field();

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| map_multipart_error(e, max_bytes))?
            .ok_or_else(|| IngestError::MissingField {
                field: wanted.to_string(),
            })?;

        if field.name() != Some(wanted) {
            debug!(field = ?field.name(), "skipping unrelated form field");
            continue;
        }

        let media_type = validate_content_type(kind, field.content_type())?;

        let body = Box::pin(field.map_err(|e| map_multipart_error(e, max_bytes)));
        let spool = spool_stream(spool_dir, body).await?;

        return Ok(SpooledUpload { spool, media_type });
    }
}

fn map_multipart_error(err: MultipartError, max_bytes: u64) -> IngestError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IngestError::UploadTooLarge { max_bytes }
    } else {
        IngestError::MalformedMultipart {
            reason: err.body_text(),
        }
    }
}
