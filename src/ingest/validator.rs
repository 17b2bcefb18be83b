use mime::Mime;

use crate::core::error::IngestError;
use crate::core::types::UploadKind;

// ---------------------------------------------------------------------------
// Content-type validation
// ---------------------------------------------------------------------------

/// Validate the declared content type of an uploaded part.
///
/// The header is parsed with `mime`; parameters such as `; codecs=...` are
/// ignored and only the lowercase essence (`type/subtype`) is compared
/// against the kind's accepted set. Returns the essence on success.
pub fn validate_content_type(
    kind: UploadKind,
    content_type: Option<&str>,
) -> Result<String, IngestError> {
    let raw = content_type
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IngestError::MissingContentType {
            field: kind.form_field().to_string(),
        })?;

    let parsed: Mime = raw.parse().map_err(|_| IngestError::InvalidContentType {
        value: raw.to_string(),
    })?;

    let essence = parsed.essence_str().to_ascii_lowercase();
    if !kind.accepted_media_types().contains(&essence.as_str()) {
        return Err(IngestError::UnsupportedMediaType { media_type: essence });
    }

    Ok(essence)
}
