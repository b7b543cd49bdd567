//! Budget aggregation types.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::expense::{ExpenseStatus, ExpenseType};

/// Spending on one subcategory, as returned by a grouped query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRow {
    /// Owning department.
    pub department_id: i32,
    /// Owning category.
    pub category_id: i32,
    /// Subcategory.
    pub subcategory_id: i32,
    /// Approval status of the summed expenses.
    pub status: ExpenseStatus,
    /// Type of the summed expenses.
    pub expense_type: ExpenseType,
    /// Sum of `amount_base` where present.
    pub amount_base: Option<Decimal>,
    /// Sum of raw `amount` for rows lacking a base amount.
    pub amount: Decimal,
}

impl SpendRow {
    /// Whether the row counts toward spending.
    #[must_use]
    pub fn counts(&self) -> bool {
        self.status == ExpenseStatus::Approved && self.expense_type != ExpenseType::FutureApproval
    }

    /// Base amount, falling back to the raw amount.
    #[must_use]
    pub fn effective_amount(&self) -> Decimal {
        self.amount_base.unwrap_or(self.amount)
    }
}

/// Approved spending per node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendTotals {
    /// Per department.
    pub by_department: HashMap<i32, Decimal>,
    /// Per category.
    pub by_category: HashMap<i32, Decimal>,
    /// Per subcategory.
    pub by_subcategory: HashMap<i32, Decimal>,
}

impl SpendTotals {
    /// Spent on a department.
    #[must_use]
    pub fn department(&self, id: i32) -> Decimal {
        self.by_department.get(&id).copied().unwrap_or_default()
    }

    /// Spent on a category.
    #[must_use]
    pub fn category(&self, id: i32) -> Decimal {
        self.by_category.get(&id).copied().unwrap_or_default()
    }

    /// Spent on a subcategory.
    #[must_use]
    pub fn subcategory(&self, id: i32) -> Decimal {
        self.by_subcategory.get(&id).copied().unwrap_or_default()
    }
}

/// Budget against spending for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetUsage {
    /// Allocated budget.
    pub budget: Decimal,
    /// Approved spending.
    pub spent: Decimal,
    /// `budget - spent`; negative when over budget.
    pub remaining: Decimal,
    /// `spent / budget × 100`, two places; zero when the budget is zero.
    pub utilization_percent: Decimal,
}
