//! Accounting export.
//!
//! Flattens approved expenses into a fixed column schema and writes them as
//! an `.xlsx` workbook. Column order is part of the external contract.

pub mod error;
pub mod service;
pub mod types;

pub use error::ExportError;
pub use service::{Cell, ExportService};
pub use types::{COLUMNS, ExportRow, MonthFilter, SupplierBlock};
