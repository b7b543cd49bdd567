//! Document extraction errors.

use thiserror::Error;

/// Errors raised while extracting data from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The uploaded file could not be read.
    #[error("Unreadable file: {0}")]
    Unreadable(String),

    /// The analysis backend failed or rejected the request.
    #[error("Document analysis failed: {0}")]
    Analyzer(String),

    /// The analysis backend answered with something unexpected.
    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unreadable(_) => 400,
            Self::Analyzer(_) | Self::InvalidResponse(_) => 502,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unreadable(_) => "UNREADABLE_FILE",
            Self::Analyzer(_) => "ANALYZER_ERROR",
            Self::InvalidResponse(_) => "INVALID_ANALYZER_RESPONSE",
        }
    }
}
