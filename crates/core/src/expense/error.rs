//! Expense error types.

use thiserror::Error;

use crate::currency::CurrencyError;
use crate::storage::StorageError;

/// Errors raised by the expense engine.
#[derive(Debug, Error)]
pub enum ExpenseError {
    /// Attempted an illegal state transition.
    #[error("Invalid transition: cannot {action} an expense that is {from}")]
    InvalidTransition {
        /// Current state name.
        from: String,
        /// Attempted action.
        action: &'static str,
    },

    /// Payment operations require an approved expense.
    #[error("Expense must be approved")]
    NotApproved,

    /// Rejection reason is required but not provided.
    #[error("Rejection reason is required")]
    RejectionReasonRequired,

    /// Amount must be strictly positive.
    #[error("Amount must be greater than zero")]
    AmountNotPositive,

    /// Amount exceeds what an expense can store.
    #[error("Amount must not exceed {0}")]
    AmountTooLarge(rust_decimal::Decimal),

    /// Required field is missing or blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field value is malformed.
    #[error("Invalid {field}: {message}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Failure description.
        message: String,
    },

    /// Role or ownership is insufficient.
    #[error("Not permitted to {0}")]
    Forbidden(&'static str),

    /// Expense does not exist.
    #[error("Expense {0} not found")]
    NotFound(i32),

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    ReferenceNotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: i32,
    },

    /// Paid or externally entered expenses cannot be edited or deleted.
    #[error("Expense {0} is paid or entered in external accounting and cannot be changed")]
    Locked(i32),

    /// Currency normalization failed.
    #[error(transparent)]
    Currency(#[from] CurrencyError),

    /// Attachment storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl ExpenseError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidTransition { .. }
            | Self::NotApproved
            | Self::RejectionReasonRequired
            | Self::AmountNotPositive
            | Self::AmountTooLarge(_)
            | Self::MissingField(_)
            | Self::InvalidField { .. } => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) | Self::ReferenceNotFound { .. } => 404,
            Self::Locked(_) => 409,
            Self::Currency(e) => e.status_code(),
            Self::Storage(e) => e.status_code(),
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotApproved => "NOT_APPROVED",
            Self::RejectionReasonRequired => "REJECTION_REASON_REQUIRED",
            Self::AmountNotPositive => "AMOUNT_NOT_POSITIVE",
            Self::AmountTooLarge(_) => "AMOUNT_OUT_OF_RANGE",
            Self::MissingField(_) | Self::InvalidField { .. } => "VALIDATION_ERROR",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) | Self::ReferenceNotFound { .. } => "NOT_FOUND",
            Self::Locked(_) => "EXPENSE_LOCKED",
            Self::Currency(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_error() {
        let err = ExpenseError::InvalidTransition {
            from: "approved".into(),
            action: "reject",
        };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot reject an expense that is approved"
        );
    }

    #[test]
    fn test_rejection_reason_required_error() {
        let err = ExpenseError::RejectionReasonRequired;
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "REJECTION_REASON_REQUIRED");
    }

    #[test]
    fn test_locked_is_conflict() {
        assert_eq!(ExpenseError::Locked(5).status_code(), 409);
    }

    #[test]
    fn test_wrapped_errors_keep_their_status() {
        let err = ExpenseError::from(CurrencyError::UnsupportedCurrency("XYZ".into()));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "UNSUPPORTED_CURRENCY");

        let err = ExpenseError::from(StorageError::InvalidFilename("../x".into()));
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_FILENAME");
    }
}
