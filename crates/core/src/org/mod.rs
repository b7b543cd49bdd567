//! Year-scoped org structure: Department → Category → Subcategory.
//!
//! Persistence lives in the database crate. This module holds the pure
//! planning for "copy structure from previous year", so that the repository
//! only has to execute a plan inside one transaction.

mod copy;
mod error;

#[cfg(test)]
mod copy_props;

pub use copy::{
    CategoryCopy, CopyPlan, DepartmentCopy, SourceCategory, SourceDepartment, plan_copy,
    plan_manager_links, plan_user_migration,
};
pub use error::StructureError;

/// Resolves "current year" as the wall-clock year.
///
/// The stored `is_active` flag on budget years is display-only.
#[must_use]
pub fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}
