//! Org structure error types.

use thiserror::Error;

/// Errors raised by structure operations.
#[derive(Debug, Error)]
pub enum StructureError {
    /// Referenced year does not exist.
    #[error("Budget year {0} not found")]
    YearNotFound(i32),

    /// Year with this integer already exists.
    #[error("Budget year {0} already exists")]
    DuplicateYear(i32),

    /// Department name already used in this year.
    #[error("Department '{name}' already exists in this year")]
    DuplicateDepartment {
        /// The duplicated name.
        name: String,
    },

    /// Entity id unknown.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: i32,
    },

    /// Deleting an entity that still has dependents.
    #[error("{entity} {id} is still referenced by {dependents}")]
    StillReferenced {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: i32,
        /// What still references it.
        dependents: &'static str,
    },

    /// Source and target of a copy are the same year.
    #[error("Cannot copy a year onto itself")]
    SameYear,

    /// Invalid field value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl StructureError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::YearNotFound(_) | Self::NotFound { .. } => 404,
            Self::DuplicateYear(_) | Self::DuplicateDepartment { .. } | Self::StillReferenced { .. } => {
                409
            }
            Self::SameYear | Self::InvalidInput(_) => 400,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::YearNotFound(_) => "YEAR_NOT_FOUND",
            Self::DuplicateYear(_) => "DUPLICATE_YEAR",
            Self::DuplicateDepartment { .. } => "DUPLICATE_DEPARTMENT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::StillReferenced { .. } => "STILL_REFERENCED",
            Self::SameYear => "SAME_YEAR",
            Self::InvalidInput(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_referenced_is_conflict() {
        let err = StructureError::StillReferenced {
            entity: "Department",
            id: 4,
            dependents: "categories",
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "STILL_REFERENCED");
        assert_eq!(err.to_string(), "Department 4 is still referenced by categories");
    }

    #[test]
    fn test_not_found() {
        let err = StructureError::NotFound {
            entity: "Category",
            id: 7,
        };
        assert_eq!(err.status_code(), 404);
    }
}
