//! Password hashing with Argon2id and password-change rules.

use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Errors that can occur during password operations.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Failed to hash password.
    #[error("failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password.
    #[error("failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format.
    #[error("invalid password hash format")]
    InvalidHash,

    /// New password does not meet the policy.
    #[error("password must be at least 8 characters")]
    TooShort,

    /// Current password is required and did not match.
    #[error("current password is incorrect")]
    WrongCurrentPassword,
}

impl PasswordError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::TooShort => 400,
            Self::WrongCurrentPassword => 401,
            Self::HashError(_) | Self::VerifyError(_) | Self::InvalidHash => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TooShort => "PASSWORD_TOO_SHORT",
            Self::WrongCurrentPassword => "WRONG_PASSWORD",
            Self::HashError(_) | Self::VerifyError(_) | Self::InvalidHash => "PASSWORD_ERROR",
        }
    }
}

/// Hashes a password using Argon2id, returning a PHC string.
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails.
///
/// # Example
///
/// ```
/// use outlay_core::auth::hash_password;
///
/// let hash = hash_password("my_secure_password").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a stored PHC hash.
///
/// # Errors
///
/// Returns `PasswordError::InvalidHash` if the hash format is invalid,
/// `PasswordError::VerifyError` if verification fails unexpectedly.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Checks a new password against the policy.
///
/// # Errors
///
/// Returns `PasswordError::TooShort`.
pub fn validate_new_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Validates a password change and returns the new hash.
///
/// The current password is required only when the account already has one.
///
/// # Errors
///
/// `WrongCurrentPassword`, `TooShort`, or a hashing failure.
pub fn check_password_change(
    stored_hash: Option<&str>,
    current: Option<&str>,
    new_password: &str,
) -> Result<String, PasswordError> {
    if let Some(hash) = stored_hash.filter(|h| !h.is_empty()) {
        let current = current.unwrap_or_default();
        if !verify_password(current, hash)? {
            return Err(PasswordError::WrongCurrentPassword);
        }
    }
    validate_new_password(new_password)?;
    hash_password(new_password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct_password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let hash1 = hash_password("password1").unwrap();
        let hash2 = hash_password("password1").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "invalid_hash");
        assert!(matches!(result, Err(PasswordError::InvalidHash)));
    }

    #[test]
    fn test_change_requires_current_when_set() {
        let hash = hash_password("old-password").unwrap();
        assert!(matches!(
            check_password_change(Some(&hash), Some("nope"), "new-password"),
            Err(PasswordError::WrongCurrentPassword)
        ));
        assert!(matches!(
            check_password_change(Some(&hash), None, "new-password"),
            Err(PasswordError::WrongCurrentPassword)
        ));
        let new_hash = check_password_change(Some(&hash), Some("old-password"), "new-password").unwrap();
        assert!(verify_password("new-password", &new_hash).unwrap());
    }

    #[test]
    fn test_change_without_existing_password() {
        let new_hash = check_password_change(None, None, "first-password").unwrap();
        assert!(verify_password("first-password", &new_hash).unwrap());
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            check_password_change(None, None, "short"),
            Err(PasswordError::TooShort)
        ));
        assert_eq!(PasswordError::TooShort.status_code(), 400);
    }
}
