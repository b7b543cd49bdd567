//! Accounting export and admin statistics queries.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, sea_query::Expr,
};
use serde::Serialize;

use outlay_core::expense::{ExpenseStatus, ExpenseType, PaymentDueDate, PaymentMethod};
use outlay_core::identity::Visibility;
use outlay_core::reports::{ExportRow, MonthFilter, SupplierBlock};

use super::expense::{ExpenseFilter, ExpenseRecord, ExpenseRepoError, ExpenseRepository, type_of};
use crate::entities::{
    budget_years, categories, credit_cards, departments, expenses, subcategories, suppliers,
    users,
};

/// Error types for report queries.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Expense lookup failed.
    #[error(transparent)]
    Expense(#[from] ExpenseRepoError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl ReportError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Expense(e) => e.status_code(),
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Expense(e) => e.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Expense count for one status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    /// Status name.
    pub status: String,
    /// Number of expenses.
    pub count: i64,
}

/// Spend of one department.
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSpend {
    /// Department id.
    pub department_id: i32,
    /// Department name.
    pub name: String,
    /// Approved spend in base currency.
    pub spent: Decimal,
}

/// Admin dashboard aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    /// Calendar year the totals cover.
    pub year: i32,
    /// All users.
    pub total_users: u64,
    /// Active users.
    pub active_users: u64,
    /// Expenses per status, all time.
    pub expenses_by_status: Vec<StatusCount>,
    /// Pending expenses, all time.
    pub pending_count: u64,
    /// Sum of pending amounts in base currency.
    pub pending_total: Decimal,
    /// Approved base-currency spend submitted in `year`, excluding future approvals.
    pub approved_total: Decimal,
    /// Departments of `year` by approved spend, highest first.
    pub top_departments: Vec<DepartmentSpend>,
}

/// Report repository.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    db: DatabaseConnection,
    expenses: ExpenseRepository,
}

impl ReportRepository {
    /// Creates a new report repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            expenses: ExpenseRepository::new(db.clone()),
            db,
        }
    }

    /// Approved expenses for the accounting export, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn export_rows(&self, month: MonthFilter) -> Result<Vec<ExportRow>, ReportError> {
        let filter = ExpenseFilter {
            status: Some(ExpenseStatus::Approved),
            month,
            ..ExpenseFilter::default()
        };
        let mut records = self.expenses.list(&Visibility::All, &filter).await?;
        records.reverse();

        let supplier_ids: BTreeSet<i32> =
            records.iter().filter_map(|r| r.expense.supplier_id).collect();
        let card_ids: BTreeSet<i32> =
            records.iter().filter_map(|r| r.expense.credit_card_id).collect();
        let entry_user_ids: BTreeSet<i32> = records
            .iter()
            .filter_map(|r| r.expense.external_entry_by_id)
            .collect();

        let suppliers: HashMap<i32, suppliers::Model> = if supplier_ids.is_empty() {
            HashMap::new()
        } else {
            suppliers::Entity::find()
                .filter(suppliers::Column::Id.is_in(supplier_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect()
        };
        let cards: HashMap<i32, String> = if card_ids.is_empty() {
            HashMap::new()
        } else {
            credit_cards::Entity::find()
                .select_only()
                .column(credit_cards::Column::Id)
                .column(credit_cards::Column::LastFourDigits)
                .filter(credit_cards::Column::Id.is_in(card_ids))
                .into_tuple::<(i32, String)>()
                .all(&self.db)
                .await?
                .into_iter()
                .collect()
        };
        let entry_users: HashMap<i32, String> = if entry_user_ids.is_empty() {
            HashMap::new()
        } else {
            users::Entity::find()
                .select_only()
                .column(users::Column::Id)
                .column(users::Column::FullName)
                .filter(users::Column::Id.is_in(entry_user_ids))
                .into_tuple::<(i32, String)>()
                .all(&self.db)
                .await?
                .into_iter()
                .collect()
        };

        records
            .into_iter()
            .map(|record| {
                let supplier = record
                    .expense
                    .supplier_id
                    .and_then(|id| suppliers.get(&id))
                    .map(supplier_block);
                let card = record
                    .expense
                    .credit_card_id
                    .and_then(|id| cards.get(&id).cloned());
                let entry_by = record
                    .expense
                    .external_entry_by_id
                    .and_then(|id| entry_users.get(&id).cloned());
                to_export_row(record, supplier, card, entry_by)
            })
            .collect()
    }

    /// Aggregates for the admin dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub async fn admin_stats(&self) -> Result<AdminStats, ReportError> {
        let year = Utc::now().year();

        let total_users = users::Entity::find().count(&self.db).await?;
        let active_users = users::Entity::find()
            .filter(users::Column::Status.eq("active"))
            .count(&self.db)
            .await?;

        let by_status: Vec<(String, i64)> = expenses::Entity::find()
            .select_only()
            .column(expenses::Column::Status)
            .column_as(Expr::cust("COUNT(*)"), "count")
            .group_by(expenses::Column::Status)
            .order_by_asc(expenses::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;
        let pending_count = by_status
            .iter()
            .find(|(s, _)| s == ExpenseStatus::Pending.as_str())
            .map_or(0, |(_, c)| u64::try_from(*c).unwrap_or(0));

        let pending_total: Option<Decimal> = expenses::Entity::find()
            .select_only()
            .column_as(
                Expr::cust("SUM(COALESCE(expenses.amount_base, expenses.amount))"),
                "total",
            )
            .filter(expenses::Column::Status.eq(ExpenseStatus::Pending.as_str()))
            .into_tuple()
            .one(&self.db)
            .await?
            .flatten();

        let (start, end) = year_bounds(year);
        let approved_total: Option<Decimal> = expenses::Entity::find()
            .select_only()
            .column_as(
                Expr::cust("SUM(COALESCE(expenses.amount_base, expenses.amount))"),
                "total",
            )
            .filter(expenses::Column::Status.eq(ExpenseStatus::Approved.as_str()))
            .filter(expenses::Column::ExpenseType.ne(ExpenseType::FutureApproval.as_str()))
            .filter(expenses::Column::SubmittedAt.gte(start))
            .filter(expenses::Column::SubmittedAt.lt(end))
            .into_tuple()
            .one(&self.db)
            .await?
            .flatten();

        let top: Vec<(i32, String, Option<Decimal>)> = expenses::Entity::find()
            .select_only()
            .column_as(departments::Column::Id, "department_id")
            .column_as(departments::Column::Name, "name")
            .column_as(
                Expr::cust("SUM(COALESCE(expenses.amount_base, expenses.amount))"),
                "spent",
            )
            .join(JoinType::InnerJoin, expenses::Relation::Subcategories.def())
            .join(JoinType::InnerJoin, subcategories::Relation::Categories.def())
            .join(JoinType::InnerJoin, categories::Relation::Departments.def())
            .join(JoinType::InnerJoin, departments::Relation::BudgetYears.def())
            .filter(budget_years::Column::Year.eq(year))
            .filter(expenses::Column::Status.eq(ExpenseStatus::Approved.as_str()))
            .filter(expenses::Column::ExpenseType.ne(ExpenseType::FutureApproval.as_str()))
            .group_by(departments::Column::Id)
            .group_by(departments::Column::Name)
            .order_by_desc(Expr::cust("spent"))
            .limit(5)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(AdminStats {
            year,
            total_users,
            active_users,
            expenses_by_status: by_status
                .into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect(),
            pending_count,
            pending_total: pending_total.unwrap_or_default(),
            approved_total: approved_total.unwrap_or_default(),
            top_departments: top
                .into_iter()
                .map(|(department_id, name, spent)| DepartmentSpend {
                    department_id,
                    name,
                    spent: spent.unwrap_or_default(),
                })
                .collect(),
        })
    }
}

fn year_bounds(year: i32) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default();
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap_or_default();
    (
        start.and_time(NaiveTime::MIN).and_utc(),
        end.and_time(NaiveTime::MIN).and_utc(),
    )
}

fn supplier_block(s: &suppliers::Model) -> SupplierBlock {
    SupplierBlock {
        name: s.name.clone(),
        contact_person: s.contact_person.clone(),
        email: s.email.clone(),
        phone: s.phone.clone(),
        address: s.address.clone(),
        tax_id: s.tax_id.clone(),
        bank_name: s.bank_name.clone(),
        bank_account_number: s.bank_account_number.clone(),
        bank_branch: s.bank_branch.clone(),
        swift_code: s.swift_code.clone(),
        iban: s.iban.clone(),
    }
}

fn to_export_row(
    record: ExpenseRecord,
    supplier: Option<SupplierBlock>,
    card_last_four: Option<String>,
    external_entry_by: Option<String>,
) -> Result<ExportRow, ReportError> {
    let expense_type = type_of(&record.expense)?;
    let state = super::expense::state_of(&record.expense)?;
    let e = record.expense;
    Ok(ExportRow {
        id: e.id,
        submitted_at: e.submitted_at,
        submitter: record.submitter_name,
        department: record.department_name,
        category: record.category_name,
        subcategory: record.subcategory_name,
        description: e.description,
        reason: e.reason,
        expense_type,
        amount: e.amount,
        currency: e.currency,
        amount_base: e.amount_base,
        handler: record.handler_name,
        handled_at: e.handled_at,
        card_last_four,
        payment_method: e.payment_method.as_deref().and_then(PaymentMethod::parse),
        supplier,
        invoice_date: e.invoice_date,
        payment_due_date: e.payment_due_date.as_deref().and_then(PaymentDueDate::parse),
        payment_status: state.payment_status,
        external_entry: e.external_entry,
        external_entry_by,
        external_entry_at: e.external_entry_at,
    })
}
