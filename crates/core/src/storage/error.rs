//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File size exceeds maximum allowed.
    #[error("file size {size} bytes exceeds maximum allowed {max} bytes")]
    FileTooLarge {
        /// Actual file size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Extension not in the allowlist.
    #[error("file extension '{0}' is not allowed")]
    DisallowedExtension(String),

    /// Name is not a plain basename, or resolves outside the upload root.
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// File not found in storage.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Storage backend failure.
    #[error("storage operation failed: {0}")]
    Backend(String),
}

impl StorageError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::FileTooLarge { .. } | Self::DisallowedExtension(_) | Self::InvalidFilename(_) => {
                400
            }
            Self::NotFound(_) => 404,
            Self::Backend(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::DisallowedExtension(_) => "DISALLOWED_EXTENSION",
            Self::InvalidFilename(_) => "INVALID_FILENAME",
            Self::NotFound(_) => "FILE_NOT_FOUND",
            Self::Backend(_) => "STORAGE_ERROR",
        }
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}
