// ---------------------------------------------------------------------------
// Security constants
// ---------------------------------------------------------------------------

// -- Upload limits --

/// Transport ceiling for video upload bodies (1 GiB).
pub const MAX_VIDEO_UPLOAD_BYTES: u64 = 1 << 30;

/// Transport ceiling for thumbnail upload bodies (10 MiB).
pub const MAX_THUMBNAIL_UPLOAD_BYTES: u64 = 10 << 20;

/// Random bytes per asset identifier (256 bits of entropy).
pub const ASSET_ID_BYTES: usize = 32;

// -- Record input validation limits --

/// Maximum video title length in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum video description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

/// Maximum JSON request body for the record endpoints.
pub const MAX_JSON_BODY_BYTES: usize = 64 * 1024;

// -- Signed URLs --

/// Validity window of every signed retrieval URL.
pub const SIGNED_URL_TTL_SECS: u64 = 5 * 60;

/// Random bytes in the HMAC signer's per-URL nonce.
pub const SIGNED_URL_NONCE_BYTES: usize = 16;

/// Validate a video title: non-blank after trimming, at most `MAX_TITLE_LENGTH` chars.
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LENGTH {
        return Err(format!(
            "title is {} chars (max {})",
            len, MAX_TITLE_LENGTH
        ));
    }
    Ok(())
}

/// Validate an optional description against `MAX_DESCRIPTION_LENGTH`.
pub fn validate_description(description: Option<&str>) -> Result<(), String> {
    if let Some(d) = description {
        let len = d.chars().count();
        if len > MAX_DESCRIPTION_LENGTH {
            return Err(format!(
                "description is {} chars (max {})",
                len, MAX_DESCRIPTION_LENGTH
            ));
        }
    }
    Ok(())
}
