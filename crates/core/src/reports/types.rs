//! Export types.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::ExportError;
use crate::expense::{ExpenseType, PaymentDueDate, PaymentMethod, PaymentStatus};

/// Column headers of the accounting export, in order.
pub const COLUMNS: &[&str] = &[
    "Expense ID",
    "Submitted At",
    "Submitter",
    "Department",
    "Category",
    "Subcategory",
    "Description",
    "Reason",
    "Type",
    "Amount",
    "Currency",
    "Amount (Base)",
    "Handler",
    "Handled At",
    "Card Last Four",
    "Payment Method",
    "Supplier",
    "Supplier Contact",
    "Supplier Email",
    "Supplier Phone",
    "Supplier Address",
    "Supplier Tax ID",
    "Supplier Bank",
    "Supplier Account Number",
    "Supplier Branch",
    "Supplier SWIFT",
    "Supplier IBAN",
    "Invoice Date",
    "Payment Due Date",
    "Payment Status",
    "External Entry",
    "External Entry By",
    "External Entry At",
];

/// Month selector for the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonthFilter {
    /// Every approved expense.
    #[default]
    All,
    /// Expenses submitted in one calendar month.
    Month {
        /// Year.
        year: i32,
        /// Month, 1-12.
        month: u32,
    },
}

impl MonthFilter {
    /// Half-open `[start, end)` date range, or `None` for all.
    #[must_use]
    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Self::All => None,
            Self::Month { year, month } => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)?;
                let end = start.checked_add_months(Months::new(1))?;
                Some((start, end))
            }
        }
    }

    /// Whether a timestamp falls inside the filter.
    #[must_use]
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        match *self {
            Self::All => true,
            Self::Month { year, month } => at.year() == year && at.month() == month,
        }
    }
}

impl FromStr for MonthFilter {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        let invalid = || ExportError::InvalidMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self::Month { year, month })
    }
}

/// Supplier details carried on every exported row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupplierBlock {
    /// Supplier name.
    pub name: String,
    /// Contact person.
    pub contact_person: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Phone.
    pub phone: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Tax id.
    pub tax_id: Option<String>,
    /// Bank name.
    pub bank_name: Option<String>,
    /// Bank account number.
    pub bank_account_number: Option<String>,
    /// Bank branch.
    pub bank_branch: Option<String>,
    /// SWIFT code.
    pub swift_code: Option<String>,
    /// IBAN.
    pub iban: Option<String>,
}

/// One approved expense, joined with its related names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    /// Expense id.
    pub id: i32,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Submitter display name.
    pub submitter: String,
    /// Department name.
    pub department: String,
    /// Category name.
    pub category: String,
    /// Subcategory name.
    pub subcategory: String,
    /// Description.
    pub description: String,
    /// Business reason.
    pub reason: String,
    /// Expense type.
    pub expense_type: ExpenseType,
    /// Amount in the original currency.
    pub amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Amount in base currency.
    pub amount_base: Option<Decimal>,
    /// Approver display name.
    pub handler: Option<String>,
    /// Approval time.
    pub handled_at: Option<DateTime<Utc>>,
    /// Last four digits of the card used.
    pub card_last_four: Option<String>,
    /// Payment method.
    pub payment_method: Option<PaymentMethod>,
    /// Supplier details.
    pub supplier: Option<SupplierBlock>,
    /// Invoice date.
    pub invoice_date: Option<NaiveDate>,
    /// Payment due date.
    pub payment_due_date: Option<PaymentDueDate>,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Entered into the external accounting system.
    pub external_entry: bool,
    /// Who set the external-entry flag.
    pub external_entry_by: Option<String>,
    /// When the external-entry flag was set.
    pub external_entry_at: Option<DateTime<Utc>>,
}
