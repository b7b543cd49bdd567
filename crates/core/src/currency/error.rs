//! Currency error types.

use thiserror::Error;

/// Errors raised while resolving exchange rates.
#[derive(Debug, Error)]
pub enum CurrencyError {
    /// No source answered and no fallback rate exists.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Currency code is malformed.
    #[error("Invalid currency code: {0}")]
    InvalidCode(String),

    /// A remote source failed. Advances the fallback chain.
    #[error("Rate source {source_name} failed: {message}")]
    Source {
        /// Source name.
        source_name: &'static str,
        /// Failure description.
        message: String,
    },

    /// `amount × rate` does not fit a stored base amount.
    #[error("Amount {amount} {currency} is too large to normalize")]
    AmountOutOfRange {
        /// Amount as submitted.
        amount: String,
        /// Currency code.
        currency: String,
    },

    /// Rate cache failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl CurrencyError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedCurrency(_)
            | Self::InvalidCode(_)
            | Self::AmountOutOfRange { .. } => 400,
            Self::Source { .. } => 502,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            Self::InvalidCode(_) => "INVALID_CURRENCY",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::Source { .. } => "RATE_SOURCE_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}
