use std::fmt;

// ---------------------------------------------------------------------------
// Sensitive value redaction
// ---------------------------------------------------------------------------

/// A wrapper that redacts its contents when displayed or debug-printed.
///
/// Used by the `Debug` impls of config sections that hold credentials, so
/// logging the effective configuration never prints a secret.
#[derive(Clone)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Redact a bearer token for logging: `Bearer [REDACTED]`.
pub fn redact_bearer_token(header_value: &str) -> String {
    if header_value.starts_with("Bearer ") {
        "Bearer [REDACTED]".to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Strip the query string from a signed URL so the signature never hits logs.
pub fn redact_signed_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?[REDACTED]", base),
        None => url.to_string(),
    }
}

/// Check if a field name is sensitive and should be redacted.
pub fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    lower.contains("token")
        || lower.contains("secret")
        || lower.contains("password")
        || lower.contains("authorization")
        || lower.contains("signature")
}
