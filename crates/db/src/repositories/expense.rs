//! Expense repository.
//!
//! Persists expenses and their workflow state. Transitions run under a row
//! lock so two concurrent decisions on one expense serialize.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    TransactionTrait,
};
use tracing::info;

use outlay_core::expense::{
    ExpenseAction, ExpenseError, ExpenseState, ExpenseStatus, ExpenseType, ExpenseWorkflow,
    PaymentDueDate, PaymentMethod, PaymentStatus,
};
use outlay_core::identity::{ExpenseScope, Visibility};
use outlay_core::reports::MonthFilter;

use crate::entities::{categories, departments, expenses, subcategories, users};

/// Error types for expense persistence.
#[derive(Debug, thiserror::Error)]
pub enum ExpenseRepoError {
    /// Workflow rule violated.
    #[error(transparent)]
    Workflow(#[from] ExpenseError),

    /// A stored enum column holds an unknown value.
    #[error("Expense {id} has invalid {column} '{value}'")]
    CorruptRow {
        /// Expense id.
        id: i32,
        /// Column name.
        column: &'static str,
        /// Stored value.
        value: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl ExpenseRepoError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Workflow(e) => e.status_code(),
            Self::CorruptRow { .. } | Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Workflow(e) => e.error_code(),
            Self::CorruptRow { .. } | Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// A validated, normalized submission ready to insert.
#[derive(Debug, Clone)]
pub struct NewExpense {
    /// Submitter.
    pub user_id: i32,
    /// Target subcategory.
    pub subcategory_id: i32,
    /// Supplier.
    pub supplier_id: Option<i32>,
    /// Credit card.
    pub credit_card_id: Option<i32>,
    /// Amount in `currency`.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Rate to the base currency.
    pub rate: Decimal,
    /// `amount × rate`.
    pub amount_base: Decimal,
    /// What was bought.
    pub description: String,
    /// Why.
    pub reason: String,
    /// Approval flow.
    pub expense_type: ExpenseType,
    /// Payment instrument.
    pub payment_method: Option<PaymentMethod>,
    /// Payment timing.
    pub payment_due_date: Option<PaymentDueDate>,
    /// Invoice date.
    pub invoice_date: Option<NaiveDate>,
    /// Stored quote file.
    pub quote_filename: Option<String>,
    /// Stored invoice file.
    pub invoice_filename: Option<String>,
    /// Stored receipt file.
    pub receipt_filename: Option<String>,
    /// Initial workflow state.
    pub state: ExpenseState,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// Field edits. `None` leaves a field unchanged; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ExpenseChanges {
    /// Target subcategory.
    pub subcategory_id: Option<i32>,
    /// Supplier.
    pub supplier_id: Option<Option<i32>>,
    /// Credit card.
    pub credit_card_id: Option<Option<i32>>,
    /// Amount, currency, rate and base amount, always together.
    pub money: Option<MoneyChange>,
    /// Description.
    pub description: Option<String>,
    /// Reason.
    pub reason: Option<String>,
    /// Payment instrument.
    pub payment_method: Option<Option<PaymentMethod>>,
    /// Payment timing.
    pub payment_due_date: Option<Option<PaymentDueDate>>,
    /// Invoice date.
    pub invoice_date: Option<Option<NaiveDate>>,
    /// Replacement quote file.
    pub quote_filename: Option<String>,
    /// Replacement invoice file.
    pub invoice_filename: Option<String>,
    /// Replacement receipt file.
    pub receipt_filename: Option<String>,
}

/// A re-normalized amount.
#[derive(Debug, Clone)]
pub struct MoneyChange {
    /// Amount.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Rate.
    pub rate: Decimal,
    /// Base amount.
    pub amount_base: Decimal,
}

/// Listing filters; all optional.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    /// Approval status.
    pub status: Option<ExpenseStatus>,
    /// Approval flow.
    pub expense_type: Option<ExpenseType>,
    /// Owning department.
    pub department_id: Option<i32>,
    /// Submission month.
    pub month: MonthFilter,
    /// Payment sub-state.
    pub payment_status: Option<PaymentStatus>,
}

/// An expense with the names it is displayed with.
#[derive(Debug, Clone)]
pub struct ExpenseRecord {
    /// The row.
    pub expense: expenses::Model,
    /// Department and category.
    pub scope: ExpenseScope,
    /// Department name.
    pub department_name: String,
    /// Category name.
    pub category_name: String,
    /// Subcategory name.
    pub subcategory_name: String,
    /// Submitter display name.
    pub submitter_name: String,
    /// Handler display name.
    pub handler_name: Option<String>,
}

/// Reads the workflow state out of a row.
///
/// # Errors
///
/// Returns `CorruptRow` if an enum column holds an unknown value.
pub fn state_of(row: &expenses::Model) -> Result<ExpenseState, ExpenseRepoError> {
    let corrupt = |column: &'static str, value: &str| ExpenseRepoError::CorruptRow {
        id: row.id,
        column,
        value: value.to_string(),
    };
    Ok(ExpenseState {
        status: ExpenseStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?,
        rejection_reason: row.rejection_reason.clone(),
        handler_id: row.handler_id,
        handled_at: row.handled_at,
        is_paid: row.is_paid,
        paid_by_id: row.paid_by_id,
        paid_at: row.paid_at,
        payment_status: PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| corrupt("payment_status", &row.payment_status))?,
        external_entry: row.external_entry,
        external_entry_by: row.external_entry_by_id,
        external_entry_at: row.external_entry_at,
    })
}

/// Reads the approval flow out of a row.
///
/// # Errors
///
/// Returns `CorruptRow` for an unknown value.
pub fn type_of(row: &expenses::Model) -> Result<ExpenseType, ExpenseRepoError> {
    ExpenseType::parse(&row.expense_type).ok_or_else(|| ExpenseRepoError::CorruptRow {
        id: row.id,
        column: "type",
        value: row.expense_type.clone(),
    })
}

fn write_state(model: &mut expenses::ActiveModel, state: &ExpenseState) {
    model.status = Set(state.status.as_str().to_string());
    model.rejection_reason = Set(state.rejection_reason.clone());
    model.handler_id = Set(state.handler_id);
    model.handled_at = Set(state.handled_at);
    model.is_paid = Set(state.is_paid);
    model.paid_by_id = Set(state.paid_by_id);
    model.paid_at = Set(state.paid_at);
    model.payment_status = Set(state.payment_status.as_str().to_string());
    model.external_entry = Set(state.external_entry);
    model.external_entry_by_id = Set(state.external_entry_by);
    model.external_entry_at = Set(state.external_entry_at);
}

/// Expense repository.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    db: DatabaseConnection,
}

impl ExpenseRepository {
    /// Creates a new expense repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(&self, input: NewExpense) -> Result<expenses::Model, ExpenseRepoError> {
        let mut model = expenses::ActiveModel {
            user_id: Set(input.user_id),
            subcategory_id: Set(input.subcategory_id),
            supplier_id: Set(input.supplier_id),
            credit_card_id: Set(input.credit_card_id),
            amount: Set(input.amount),
            currency: Set(input.currency),
            amount_base: Set(Some(input.amount_base)),
            rate: Set(Some(input.rate)),
            description: Set(input.description),
            reason: Set(input.reason),
            expense_type: Set(input.expense_type.as_str().to_string()),
            payment_method: Set(input.payment_method.map(|m| m.as_str().to_string())),
            payment_due_date: Set(input.payment_due_date.map(|d| d.as_str().to_string())),
            invoice_date: Set(input.invoice_date),
            quote_filename: Set(input.quote_filename),
            invoice_filename: Set(input.invoice_filename),
            receipt_filename: Set(input.receipt_filename),
            submitted_at: Set(input.submitted_at),
            updated_at: Set(input.submitted_at),
            ..Default::default()
        };
        write_state(&mut model, &input.state);
        let expense = model.insert(&self.db).await?;

        info!(
            expense_id = expense.id,
            user_id = expense.user_id,
            status = %expense.status,
            expense_type = %expense.expense_type,
            "Expense submitted"
        );
        Ok(expense)
    }

    /// Finds an expense row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, id: i32) -> Result<Option<expenses::Model>, ExpenseRepoError> {
        Ok(expenses::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Loads an expense with its display names.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get_record(&self, id: i32) -> Result<ExpenseRecord, ExpenseRepoError> {
        let row = self.find(id).await?.ok_or(ExpenseError::NotFound(id))?;
        let mut records = decorate(&self.db, vec![row]).await?;
        Ok(records.pop().ok_or(ExpenseError::NotFound(id))?)
    }

    /// Lists the expenses visible under `visibility`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(
        &self,
        visibility: &Visibility,
        filter: &ExpenseFilter,
    ) -> Result<Vec<ExpenseRecord>, ExpenseRepoError> {
        let query = apply_filter(scoped_query(), filter).filter(visibility_condition(visibility));
        let rows = query
            .order_by_desc(expenses::Column::SubmittedAt)
            .order_by_desc(expenses::Column::Id)
            .all(&self.db)
            .await?;
        decorate(&self.db, rows).await
    }

    /// Pending expenses a manager can decide on: those under the given
    /// departments or categories, or every pending one when `all`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_pending_approvals(
        &self,
        all: bool,
        department_ids: &BTreeSet<i32>,
        category_ids: &BTreeSet<i32>,
    ) -> Result<Vec<ExpenseRecord>, ExpenseRepoError> {
        if !all && department_ids.is_empty() && category_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query =
            scoped_query().filter(expenses::Column::Status.eq(ExpenseStatus::Pending.as_str()));
        if !all {
            query = query.filter(
                Condition::any()
                    .add(categories::Column::DepartmentId.is_in(department_ids.iter().copied()))
                    .add(categories::Column::Id.is_in(category_ids.iter().copied())),
            );
        }
        let rows = query
            .order_by_asc(expenses::Column::SubmittedAt)
            .all(&self.db)
            .await?;
        decorate(&self.db, rows).await
    }

    /// Applies field edits under a row lock.
    ///
    /// The lock check runs on the locked row: a paid or externally entered
    /// expense is refused, and unless `any_status` the expense must still be
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Locked` or `InvalidTransition`.
    pub async fn update(
        &self,
        id: i32,
        changes: ExpenseChanges,
        any_status: bool,
    ) -> Result<expenses::Model, ExpenseRepoError> {
        let txn = self.db.begin().await?;
        let row = expenses::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ExpenseError::NotFound(id))?;
        ExpenseWorkflow::check_editable(id, &state_of(&row)?, any_status)?;
        let mut model: expenses::ActiveModel = row.into();

        if let Some(subcategory_id) = changes.subcategory_id {
            model.subcategory_id = Set(subcategory_id);
        }
        if let Some(supplier_id) = changes.supplier_id {
            model.supplier_id = Set(supplier_id);
        }
        if let Some(credit_card_id) = changes.credit_card_id {
            model.credit_card_id = Set(credit_card_id);
        }
        if let Some(money) = changes.money {
            model.amount = Set(money.amount);
            model.currency = Set(money.currency);
            model.rate = Set(Some(money.rate));
            model.amount_base = Set(Some(money.amount_base));
        }
        if let Some(description) = changes.description {
            model.description = Set(description);
        }
        if let Some(reason) = changes.reason {
            model.reason = Set(reason);
        }
        if let Some(method) = changes.payment_method {
            model.payment_method = Set(method.map(|m| m.as_str().to_string()));
        }
        if let Some(due) = changes.payment_due_date {
            model.payment_due_date = Set(due.map(|d| d.as_str().to_string()));
        }
        if let Some(invoice_date) = changes.invoice_date {
            model.invoice_date = Set(invoice_date);
        }
        if let Some(name) = changes.quote_filename {
            model.quote_filename = Set(Some(name));
        }
        if let Some(name) = changes.invoice_filename {
            model.invoice_filename = Set(Some(name));
        }
        if let Some(name) = changes.receipt_filename {
            model.receipt_filename = Set(Some(name));
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&txn).await?;
        txn.commit().await?;
        info!(expense_id = id, "Expense updated");
        Ok(updated)
    }

    /// Runs one workflow transition under a row lock.
    ///
    /// `decide` receives the locked row and its state and returns the
    /// action to apply; its error aborts the transaction untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, the workflow error from `decide`, or a database
    /// error.
    pub async fn transition<F>(
        &self,
        id: i32,
        decide: F,
    ) -> Result<(expenses::Model, ExpenseAction), ExpenseRepoError>
    where
        F: FnOnce(&expenses::Model, &ExpenseState) -> Result<ExpenseAction, ExpenseError> + Send,
    {
        let txn = self.db.begin().await?;
        let row = expenses::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ExpenseError::NotFound(id))?;

        let state = state_of(&row)?;
        let action = decide(&row, &state)?;
        let next = state.apply(&action);

        let mut model: expenses::ActiveModel = row.into();
        write_state(&mut model, &next);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        txn.commit().await?;

        info!(
            expense_id = id,
            action = action.name(),
            status = %updated.status,
            payment_status = %updated.payment_status,
            "Expense transition applied"
        );
        Ok((updated, action))
    }

    /// Deletes an expense unless it is paid or externally entered, and,
    /// unless `any_status`, only while pending.
    /// Returns the removed row so its files can be cleaned up.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Locked` or `InvalidTransition`.
    pub async fn delete(
        &self,
        id: i32,
        any_status: bool,
    ) -> Result<expenses::Model, ExpenseRepoError> {
        let txn = self.db.begin().await?;
        let row = expenses::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(ExpenseError::NotFound(id))?;
        ExpenseWorkflow::check_editable(id, &state_of(&row)?, any_status)?;

        expenses::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(expense_id = id, user_id = row.user_id, "Expense deleted");
        Ok(row)
    }
}

fn scoped_query() -> Select<expenses::Entity> {
    expenses::Entity::find()
        .join(JoinType::InnerJoin, expenses::Relation::Subcategories.def())
        .join(JoinType::InnerJoin, subcategories::Relation::Categories.def())
}

fn apply_filter(mut query: Select<expenses::Entity>, filter: &ExpenseFilter) -> Select<expenses::Entity> {
    if let Some(status) = filter.status {
        query = query.filter(expenses::Column::Status.eq(status.as_str()));
    }
    if let Some(expense_type) = filter.expense_type {
        query = query.filter(expenses::Column::ExpenseType.eq(expense_type.as_str()));
    }
    if let Some(department_id) = filter.department_id {
        query = query.filter(categories::Column::DepartmentId.eq(department_id));
    }
    if let Some(payment_status) = filter.payment_status {
        query = query.filter(expenses::Column::PaymentStatus.eq(payment_status.as_str()));
    }
    if let Some((start, end)) = filter.month.range() {
        query = query
            .filter(expenses::Column::SubmittedAt.gte(start.and_time(NaiveTime::MIN).and_utc()))
            .filter(expenses::Column::SubmittedAt.lt(end.and_time(NaiveTime::MIN).and_utc()));
    }
    query
}

fn visibility_condition(visibility: &Visibility) -> Condition {
    match visibility {
        Visibility::All => Condition::all(),
        Visibility::Own(user_id) => Condition::all().add(expenses::Column::UserId.eq(*user_id)),
        Visibility::Managed {
            user_id,
            department_ids,
            category_ids,
        } => {
            let mut any = Condition::any().add(expenses::Column::UserId.eq(*user_id));
            if !department_ids.is_empty() {
                any = any.add(categories::Column::DepartmentId.is_in(department_ids.clone()));
            }
            if !category_ids.is_empty() {
                any = any.add(categories::Column::Id.is_in(category_ids.clone()));
            }
            any
        }
    }
}

/// Attaches names to rows with two batched lookups.
async fn decorate<C: ConnectionTrait>(
    db: &C,
    rows: Vec<expenses::Model>,
) -> Result<Vec<ExpenseRecord>, ExpenseRepoError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let subcategory_ids: BTreeSet<i32> = rows.iter().map(|r| r.subcategory_id).collect();
    let placements: Vec<(i32, String, i32, String, i32, String)> = subcategories::Entity::find()
        .select_only()
        .column(subcategories::Column::Id)
        .column(subcategories::Column::Name)
        .column_as(categories::Column::Id, "category_id")
        .column_as(categories::Column::Name, "category_name")
        .column_as(departments::Column::Id, "department_id")
        .column_as(departments::Column::Name, "department_name")
        .join(JoinType::InnerJoin, subcategories::Relation::Categories.def())
        .join(JoinType::InnerJoin, categories::Relation::Departments.def())
        .filter(subcategories::Column::Id.is_in(subcategory_ids))
        .into_tuple()
        .all(db)
        .await?;
    let placements: HashMap<i32, (String, i32, String, i32, String)> = placements
        .into_iter()
        .map(|(id, sub, cat_id, cat, dept_id, dept)| (id, (sub, cat_id, cat, dept_id, dept)))
        .collect();

    let user_ids: BTreeSet<i32> = rows
        .iter()
        .flat_map(|r| [Some(r.user_id), r.handler_id])
        .flatten()
        .collect();
    let names: HashMap<i32, String> = users::Entity::find()
        .select_only()
        .column(users::Column::Id)
        .column(users::Column::FullName)
        .filter(users::Column::Id.is_in(user_ids))
        .into_tuple::<(i32, String)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|expense| {
            let (sub, cat_id, cat, dept_id, dept) = placements.get(&expense.subcategory_id)?.clone();
            Some(ExpenseRecord {
                scope: ExpenseScope {
                    department_id: dept_id,
                    category_id: cat_id,
                },
                department_name: dept,
                category_name: cat,
                subcategory_name: sub,
                submitter_name: names.get(&expense.user_id).cloned().unwrap_or_default(),
                handler_name: expense.handler_id.and_then(|h| names.get(&h).cloned()),
                expense,
            })
        })
        .collect())
}
