//! Budget aggregation.
//!
//! Approved spending per department, category and subcategory, computed in
//! one pass over per-subcategory sums instead of one query per node.

pub mod error;
pub mod service;
pub mod types;


pub use error::BudgetError;
pub use service::BudgetService;
pub use types::{BudgetUsage, SpendRow, SpendTotals};
