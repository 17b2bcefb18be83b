use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::core::security::ASSET_ID_BYTES;
use crate::core::types::Orientation;

// ---------------------------------------------------------------------------
// Asset identity
// ---------------------------------------------------------------------------

/// Generate a fresh asset identifier: 32 CSPRNG bytes, URL-safe base64
/// without padding (43 characters).
///
/// No uniqueness check is made against the store; 256 bits make collisions
/// negligible.
pub fn new_asset_id() -> String {
    let mut bytes = [0u8; ASSET_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive a file extension from a `type/subtype` media type.
///
/// Returns `.subtype` when the string has exactly one `/`, `.bin` otherwise.
pub fn extension_for(media_type: &str) -> String {
    let mut parts = media_type.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(subtype), None) => format!(".{}", subtype),
        _ => ".bin".to_string(),
    }
}

/// Build the object key for an asset.
///
/// `<orientation>/<asset_id><ext>` when an orientation is known, otherwise
/// `<asset_id><ext>`.
pub fn asset_key(prefix: Option<Orientation>, asset_id: &str, media_type: &str) -> String {
    let ext = extension_for(media_type);
    match prefix {
        Some(orientation) => format!("{}/{}{}", orientation, asset_id, ext),
        None => format!("{}{}", asset_id, ext),
    }
}
