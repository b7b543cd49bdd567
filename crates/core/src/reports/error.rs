//! Export error types.

use thiserror::Error;

/// Errors that can occur while exporting.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The month filter is neither `all` nor `YYYY-MM`.
    #[error("Invalid month '{0}', expected YYYY-MM or all")]
    InvalidMonth(String),

    /// The spreadsheet writer failed.
    #[error("Failed to write spreadsheet: {0}")]
    Spreadsheet(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl ExportError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidMonth(_) => 400,
            Self::Spreadsheet(_) | Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidMonth(_) => "INVALID_MONTH",
            Self::Spreadsheet(_) => "EXPORT_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Spreadsheet(err.to_string())
    }
}
