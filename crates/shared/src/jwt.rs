//! Session token signing and validation.
//!
//! The session cookie carries an HS256-signed token; nothing else is stored server-side.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::auth::Claims;
use crate::config::SessionConfig;

/// Errors that can occur during token operations.
#[derive(Debug, Error)]
pub enum JwtError {
    /// Token encoding failed.
    #[error("failed to encode token: {0}")]
    EncodingError(String),

    /// Token decoding failed.
    #[error("failed to decode token: {0}")]
    DecodingError(String),

    /// Token has expired.
    #[error("token has expired")]
    Expired,
}

/// Signs and validates session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    ttl_hours: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("ttl_hours", &self.ttl_hours)
            .field("encoding_key", &"[hidden]")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl SessionTokens {
    /// Creates a token service from the session configuration.
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            ttl_hours: config.ttl_hours,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        }
    }

    /// Issues a session token for a user.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::EncodingError` if token generation fails.
    pub fn issue(&self, user_id: i32, role: &str) -> Result<String, JwtError> {
        let expires_at = Utc::now() + Duration::hours(self.ttl_hours);
        let claims = Claims::new(user_id, role, expires_at);

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    /// Validates and decodes a token.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Expired` if the token has expired,
    /// `JwtError::DecodingError` if it is malformed or badly signed.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::DecodingError(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str, ttl_hours: i64) -> SessionConfig {
        SessionConfig {
            secret: secret.to_string(),
            ttl_hours,
            cookie_name: "outlay_session".to_string(),
            secure: false,
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let tokens = SessionTokens::new(&config("test-secret", 12));
        let token = tokens.issue(42, "manager").unwrap();
        let claims = tokens.validate(&token).unwrap();

        assert_eq!(claims.user_id(), 42);
        assert_eq!(claims.role, "manager");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = SessionTokens::new(&config("one", 12)).issue(1, "user").unwrap();
        let result = SessionTokens::new(&config("two", 12)).validate(&token);
        assert!(matches!(result, Err(JwtError::DecodingError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = SessionTokens::new(&config("test-secret", -2));
        let token = tokens.issue(1, "user").unwrap();
        assert!(matches!(tokens.validate(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_invalid_token() {
        let tokens = SessionTokens::new(&config("test-secret", 12));
        assert!(tokens.validate("invalid.token.here").is_err());
    }
}
