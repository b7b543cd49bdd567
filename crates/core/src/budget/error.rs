//! Budget error types.

use thiserror::Error;

/// Budget-related errors.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Budgets cannot be negative.
    #[error("Budget cannot be negative")]
    NegativeAmount,

    /// Welfare edits are limited to welfare categories.
    #[error("Category {0} is not a welfare category")]
    NotWelfare(i32),
}

impl BudgetError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NegativeAmount | Self::NotWelfare(_) => 400,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NegativeAmount => "NEGATIVE_BUDGET",
            Self::NotWelfare(_) => "NOT_WELFARE_CATEGORY",
        }
    }
}
