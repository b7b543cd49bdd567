//! Spending rows feeding the budget aggregator.

use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait, sea_query::Expr,
};

use outlay_core::budget::{BudgetService, SpendRow, SpendTotals};
use outlay_core::expense::{ExpenseStatus, ExpenseType};

use crate::entities::{categories, departments, expenses, subcategories};

/// Error types for budget queries.
#[derive(Debug, thiserror::Error)]
pub enum BudgetQueryError {
    /// A grouped row carried an unknown status or type.
    #[error("Unknown {column} value '{value}'")]
    UnknownValue {
        /// Column name.
        column: &'static str,
        /// Stored value.
        value: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl BudgetQueryError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        500
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        "DATABASE_ERROR"
    }
}

type GroupedRow = (i32, i32, i32, String, String, Option<Decimal>, Decimal);

/// Budget repository.
#[derive(Debug, Clone)]
pub struct BudgetRepository {
    db: DatabaseConnection,
}

impl BudgetRepository {
    /// Creates a new budget repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Spending under the given departments, grouped per subcategory,
    /// status and type in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn spend_rows(&self, department_ids: &[i32]) -> Result<Vec<SpendRow>, BudgetQueryError> {
        if department_ids.is_empty() {
            return Ok(Vec::new());
        }

        let grouped: Vec<GroupedRow> = expenses::Entity::find()
            .select_only()
            .column_as(categories::Column::DepartmentId, "department_id")
            .column_as(categories::Column::Id, "category_id")
            .column(expenses::Column::SubcategoryId)
            .column(expenses::Column::Status)
            .column(expenses::Column::ExpenseType)
            .column_as(
                Expr::cust("SUM(COALESCE(expenses.amount_base, expenses.amount))"),
                "amount_base",
            )
            .column_as(Expr::cust("SUM(expenses.amount)"), "amount")
            .join(JoinType::InnerJoin, expenses::Relation::Subcategories.def())
            .join(JoinType::InnerJoin, subcategories::Relation::Categories.def())
            .filter(categories::Column::DepartmentId.is_in(department_ids.iter().copied()))
            .group_by(categories::Column::DepartmentId)
            .group_by(categories::Column::Id)
            .group_by(expenses::Column::SubcategoryId)
            .group_by(expenses::Column::Status)
            .group_by(expenses::Column::ExpenseType)
            .into_tuple()
            .all(&self.db)
            .await?;

        grouped.into_iter().map(to_spend_row).collect()
    }

    /// Aggregated spending under the given departments.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn totals(&self, department_ids: &[i32]) -> Result<SpendTotals, BudgetQueryError> {
        let rows = self.spend_rows(department_ids).await?;
        Ok(BudgetService::aggregate(&rows))
    }

    /// Aggregated spending over every department of a budget year.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn year_totals(&self, budget_year_id: i32) -> Result<SpendTotals, BudgetQueryError> {
        let ids: Vec<i32> = departments::Entity::find()
            .select_only()
            .column(departments::Column::Id)
            .filter(departments::Column::BudgetYearId.eq(budget_year_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        self.totals(&ids).await
    }
}

fn to_spend_row(
    (department_id, category_id, subcategory_id, status, expense_type, amount_base, amount): GroupedRow,
) -> Result<SpendRow, BudgetQueryError> {
    Ok(SpendRow {
        department_id,
        category_id,
        subcategory_id,
        status: ExpenseStatus::parse(&status).ok_or(BudgetQueryError::UnknownValue {
            column: "status",
            value: status.clone(),
        })?,
        expense_type: ExpenseType::parse(&expense_type).ok_or(BudgetQueryError::UnknownValue {
            column: "type",
            value: expense_type.clone(),
        })?,
        amount_base,
        amount,
    })
}
