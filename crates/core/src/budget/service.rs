//! Budget aggregation and usage calculation.

use rust_decimal::Decimal;

use super::error::BudgetError;
use super::types::{BudgetUsage, SpendRow, SpendTotals};

/// Budget service for business logic.
pub struct BudgetService;

impl BudgetService {
    /// Folds per-subcategory rows into department, category and subcategory totals.
    ///
    /// Only approved expenses count, and `future_approval` is excluded.
    #[must_use]
    pub fn aggregate<'a>(rows: impl IntoIterator<Item = &'a SpendRow>) -> SpendTotals {
        let mut totals = SpendTotals::default();
        for row in rows.into_iter().filter(|r| r.counts()) {
            let amount = row.effective_amount();
            *totals.by_department.entry(row.department_id).or_default() += amount;
            *totals.by_category.entry(row.category_id).or_default() += amount;
            *totals.by_subcategory.entry(row.subcategory_id).or_default() += amount;
        }
        totals
    }

    /// Compares a budget against its spending.
    #[must_use]
    pub fn usage(budget: Decimal, spent: Decimal) -> BudgetUsage {
        let utilization_percent = if budget.is_zero() {
            Decimal::ZERO
        } else {
            (spent / budget * Decimal::ONE_HUNDRED).round_dp(2)
        };

        BudgetUsage {
            budget,
            spent,
            remaining: budget - spent,
            utilization_percent,
        }
    }

    /// Validates a budget amount.
    ///
    /// # Errors
    ///
    /// Returns `BudgetError::NegativeAmount` if the amount is negative.
    pub fn validate_budget(amount: Decimal) -> Result<(), BudgetError> {
        if amount < Decimal::ZERO {
            return Err(BudgetError::NegativeAmount);
        }
        Ok(())
    }
}
