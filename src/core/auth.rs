use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::AuthConfig;
use super::error::AuthError;
use super::types::UserId;

/// Issuer stamped on every access token.
pub const TOKEN_ISSUER: &str = "tubely-access";

/// Validates a bearer token and resolves the caller's identity.
///
/// Kept synchronous and object-safe so handlers can hold it as
/// `Arc<dyn TokenValidator>` and tests can swap in a fixed identity.
pub trait TokenValidator: Send + Sync {
    fn validate_token(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 JWT issuer and validator.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl_secs: u64,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("secret", &"[REDACTED]")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    /// Issue an access token for `user_id`, valid for the configured TTL.
    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            AuthError::IssueFailed {
                reason: e.to_string(),
            }
        })
    }
}

impl TokenValidator for JwtAuthenticator {
    fn validate_token(&self, token: &str) -> Result<UserId, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::InvalidToken {
                reason: e.to_string(),
            }
        })?;

        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|e| AuthError::InvalidToken {
                reason: format!("invalid subject: {}", e),
            })
    }
}

/// Extract the bearer token from an `Authorization` header.
///
/// The scheme match is case-insensitive; an empty token counts as missing.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn authenticator(secret: &str) -> JwtAuthenticator {
        JwtAuthenticator::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            token_ttl_secs: 60,
        })
    }

    #[test]
    fn test_issue_then_validate() {
        let auth = authenticator("secret");
        let user = UserId::new();
        let token = auth.issue_token(user).unwrap();
        assert_eq!(auth.validate_token(&token).unwrap(), user);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = authenticator("one").issue_token(UserId::new()).unwrap();
        let err = authenticator("two").validate_token(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = authenticator("secret");
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            sub: UserId::new().to_string(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let auth = authenticator("secret");
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: "someone-else".to_string(),
            sub: UserId::new().to_string(),
            iat: now,
            exp: now + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(authenticator("secret").validate_token("not.a.jwt").is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingToken)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers).unwrap(), "xyz");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
