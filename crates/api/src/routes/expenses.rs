//! Expense routes: submission, listing, edits, the approval decision, the
//! payment-status machine, the external-entry flag and document extraction.
//!
//! Submissions and edits arrive as multipart forms so attachments travel
//! with the fields. Notifications go out after the row is committed and
//! their failures never change the response.

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, middleware::AuthUser};
use outlay_core::document::ExtractionStatus;
use outlay_core::expense::{
    AttachmentKind, ExpenseAction, ExpenseError, ExpenseState, ExpenseStatus, ExpenseType,
    ExpenseWorkflow, PaymentDueDate, PaymentMethod, PaymentStatus, SubmissionInput,
};
use outlay_core::identity::Role;
use outlay_core::notification::{ExpenseSummary, Notification};
use outlay_core::reports::MonthFilter;
use outlay_db::entities::expenses;
use outlay_db::repositories::{
    ExpenseChanges, ExpenseFilter, ExpenseRecord, MoneyChange, NewExpense,
};
use outlay_db::{
    CreditCardRepository, ExpenseRepository, OrganizationRepository, SupplierRepository,
    UserRepository,
};
use outlay_shared::types::{round_money, round_rate};

/// Creates the expense routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/pending", get(list_pending))
        .route("/expenses/process-document", post(process_document))
        .route(
            "/expenses/{id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .route("/expenses/{id}/approve", post(approve_expense))
        .route("/expenses/{id}/reject", post(reject_expense))
        .route(
            "/expenses/{id}/mark-pending-payment",
            post(mark_pending_payment),
        )
        .route("/expenses/{id}/mark-paid", post(mark_paid))
        .route("/expenses/{id}/mark-unpaid", post(mark_unpaid))
        .route("/expenses/{id}/external-entry", post(set_external_entry))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing expenses.
#[derive(Debug, Default, Deserialize)]
pub struct ListExpensesQuery {
    /// Approval status.
    pub status: Option<String>,
    /// Approval flow.
    #[serde(rename = "type")]
    pub expense_type: Option<String>,
    /// Owning department.
    pub department_id: Option<i32>,
    /// `YYYY-MM` or `all`.
    pub month: Option<String>,
    /// Payment sub-state.
    pub payment_status: Option<String>,
}

/// Request body for a rejection.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    /// Why the expense was rejected.
    #[serde(default)]
    pub reason: String,
}

/// Request body for the external-entry toggle.
#[derive(Debug, Deserialize)]
pub struct ExternalEntryRequest {
    /// New flag value.
    pub value: bool,
}

/// An expense as rendered by the API.
#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    /// Expense ID.
    pub id: i32,
    /// Submitter.
    pub user_id: i32,
    /// Submitter display name.
    pub submitter_name: String,
    /// Subcategory.
    pub subcategory_id: i32,
    /// Subcategory name.
    pub subcategory_name: String,
    /// Category.
    pub category_id: i32,
    /// Category name.
    pub category_name: String,
    /// Department.
    pub department_id: i32,
    /// Department name.
    pub department_name: String,
    /// Supplier.
    pub supplier_id: Option<i32>,
    /// Credit card.
    pub credit_card_id: Option<i32>,
    /// Amount in `currency`.
    pub amount: Decimal,
    /// Currency code.
    pub currency: String,
    /// Rate to the base currency.
    pub rate: Option<Decimal>,
    /// Amount in the base currency.
    pub amount_base: Option<Decimal>,
    /// What was bought.
    pub description: String,
    /// Why.
    pub reason: String,
    /// Approval flow.
    #[serde(rename = "type")]
    pub expense_type: String,
    /// Approval status.
    pub status: String,
    /// Set iff rejected.
    pub rejection_reason: Option<String>,
    /// Payment instrument.
    pub payment_method: Option<String>,
    /// Payment timing.
    pub payment_due_date: Option<String>,
    /// Invoice date.
    pub invoice_date: Option<NaiveDate>,
    /// Stored quote file.
    pub quote_filename: Option<String>,
    /// Stored invoice file.
    pub invoice_filename: Option<String>,
    /// Stored receipt file.
    pub receipt_filename: Option<String>,
    /// Approving or rejecting user.
    pub handler_id: Option<i32>,
    /// Handler display name.
    pub handler_name: Option<String>,
    /// Decision time.
    pub handled_at: Option<DateTime<Utc>>,
    /// Paid flag.
    pub is_paid: bool,
    /// Who marked it paid.
    pub paid_by_id: Option<i32>,
    /// When it was marked paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Payment sub-state.
    pub payment_status: String,
    /// Entered in external accounting.
    pub external_entry: bool,
    /// Who set the external flag.
    pub external_entry_by_id: Option<i32>,
    /// When the external flag was set.
    pub external_entry_at: Option<DateTime<Utc>>,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl From<ExpenseRecord> for ExpenseResponse {
    fn from(record: ExpenseRecord) -> Self {
        let e = record.expense;
        Self {
            id: e.id,
            user_id: e.user_id,
            submitter_name: record.submitter_name,
            subcategory_id: e.subcategory_id,
            subcategory_name: record.subcategory_name,
            category_id: record.scope.category_id,
            category_name: record.category_name,
            department_id: record.scope.department_id,
            department_name: record.department_name,
            supplier_id: e.supplier_id,
            credit_card_id: e.credit_card_id,
            amount: round_money(e.amount),
            currency: e.currency,
            rate: e.rate.map(round_rate),
            amount_base: e.amount_base.map(round_money),
            description: e.description,
            reason: e.reason,
            expense_type: e.expense_type,
            status: e.status,
            rejection_reason: e.rejection_reason,
            payment_method: e.payment_method,
            payment_due_date: e.payment_due_date,
            invoice_date: e.invoice_date,
            quote_filename: e.quote_filename,
            invoice_filename: e.invoice_filename,
            receipt_filename: e.receipt_filename,
            handler_id: e.handler_id,
            handler_name: record.handler_name,
            handled_at: e.handled_at,
            is_paid: e.is_paid,
            paid_by_id: e.paid_by_id,
            paid_at: e.paid_at,
            payment_status: e.payment_status,
            external_entry: e.external_entry,
            external_entry_by_id: e.external_entry_by_id,
            external_entry_at: e.external_entry_at,
            submitted_at: e.submitted_at,
            updated_at: e.updated_at,
        }
    }
}

// ============================================================================
// Multipart Form
// ============================================================================

/// One uploaded file.
#[derive(Debug)]
struct Upload {
    field: String,
    file_name: String,
    bytes: Vec<u8>,
}

/// A multipart body split into text fields and files.
#[derive(Debug, Default)]
struct FormData {
    fields: HashMap<String, String>,
    files: Vec<Upload>,
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::validation(format!("Invalid multipart body: {e}"))
}

impl FormData {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                // Browsers send an empty part for an untouched file input.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.files.push(Upload {
                    field: name,
                    file_name,
                    bytes: bytes.to_vec(),
                });
            } else {
                let text = field.text().await.map_err(bad_multipart)?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Trimmed text of a field; blank counts as absent.
    fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ApiError> {
        self.text(key)
            .map(|v| v.parse::<T>().map_err(|_| invalid_field(key, v)))
            .transpose()
    }

    fn parse_with<T>(
        &self,
        key: &'static str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ApiError> {
        self.text(key)
            .map(|v| parse(v).ok_or_else(|| invalid_field(key, v)))
            .transpose()
    }

    /// Edit semantics: absent leaves the value, blank clears it.
    fn edit<T>(
        &self,
        key: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<Option<T>>, ApiError> {
        match self.fields.get(key).map(|v| v.trim()) {
            None => Ok(None),
            Some("") => Ok(Some(None)),
            Some(v) => parse(v)
                .map(|t| Some(Some(t)))
                .ok_or_else(|| invalid_field(key, v)),
        }
    }

    /// Files addressed to one of the attachment slots.
    fn attachments(&self) -> Result<Vec<(AttachmentKind, &Upload)>, ApiError> {
        self.files
            .iter()
            .map(|upload| {
                attachment_kind(&upload.field)
                    .map(|kind| (kind, upload))
                    .ok_or_else(|| {
                        ApiError::validation(format!("Unexpected file field: {}", upload.field))
                    })
            })
            .collect()
    }
}

fn invalid_field(key: &str, value: &str) -> ApiError {
    ApiError::validation(format!("Invalid {key}: {value}"))
}

/// `quote`, `quote_file` and `quoteFile` all address the quote slot.
fn attachment_kind(field: &str) -> Option<AttachmentKind> {
    let base = field
        .strip_suffix("_file")
        .or_else(|| field.strip_suffix("File"))
        .unwrap_or(field);
    AttachmentKind::parse(base)
}

/// Stored attachment names, one per slot.
#[derive(Debug, Default)]
struct SavedFiles {
    quote: Option<String>,
    invoice: Option<String>,
    receipt: Option<String>,
}

impl SavedFiles {
    fn set(&mut self, kind: AttachmentKind, name: String) -> Option<String> {
        let slot = match kind {
            AttachmentKind::Quote => &mut self.quote,
            AttachmentKind::Invoice => &mut self.invoice,
            AttachmentKind::Receipt => &mut self.receipt,
        };
        slot.replace(name)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        [&self.quote, &self.invoice, &self.receipt]
            .into_iter()
            .filter_map(|n| n.as_deref())
    }
}

/// Validates every attachment before writing any of them.
async fn save_attachments(
    state: &AppState,
    submitter_id: i32,
    form: &FormData,
) -> Result<SavedFiles, ApiError> {
    let attachments = form.attachments()?;
    for (_, upload) in &attachments {
        state
            .uploads
            .validate_upload(&upload.file_name, upload.bytes.len() as u64)?;
    }

    let mut saved = SavedFiles::default();
    for (kind, upload) in attachments {
        match state
            .uploads
            .save(submitter_id, &upload.file_name, upload.bytes.clone())
            .await
        {
            Ok(name) => {
                if let Some(replaced) = saved.set(kind, name) {
                    remove_files(state, [replaced.as_str()]).await;
                }
            }
            Err(e) => {
                remove_files(state, saved.names()).await;
                return Err(e.into());
            }
        }
    }
    Ok(saved)
}

/// Best-effort removal; failures are logged.
async fn remove_files<'a>(state: &AppState, names: impl IntoIterator<Item = &'a str>) {
    for name in names {
        if let Err(e) = state.uploads.delete(name).await {
            warn!(file = %name, error = %e, "Failed to remove attachment");
        }
    }
}

fn stored_files(row: &expenses::Model) -> impl Iterator<Item = &str> {
    [&row.quote_filename, &row.invoice_filename, &row.receipt_filename]
        .into_iter()
        .filter_map(|n| n.as_deref())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn summary(record: &ExpenseRecord) -> ExpenseSummary {
    ExpenseSummary {
        id: record.expense.id,
        description: record.expense.description.clone(),
        reason: record.expense.reason.clone(),
        amount: round_money(record.expense.amount),
        currency: record.expense.currency.clone(),
        department: record.department_name.clone(),
    }
}

fn is_pending(record: &ExpenseRecord) -> bool {
    ExpenseStatus::parse(&record.expense.status) == Some(ExpenseStatus::Pending)
}

async fn load_visible(
    state: &AppState,
    auth: &AuthUser,
    id: i32,
) -> Result<ExpenseRecord, ApiError> {
    let record = ExpenseRepository::new(state.conn()).get_record(id).await?;
    if !auth.principal.can_view(record.expense.user_id, record.scope) {
        // Expenses outside the caller's scope are indistinguishable from missing ones.
        return Err(ExpenseError::NotFound(id).into());
    }
    Ok(record)
}

async fn ensure_references(
    state: &AppState,
    supplier_id: Option<i32>,
    credit_card_id: Option<i32>,
) -> Result<(), ApiError> {
    if let Some(id) = supplier_id {
        SupplierRepository::new(state.conn()).get(id).await?;
    }
    if let Some(id) = credit_card_id {
        CreditCardRepository::new(state.conn()).get(id).await?;
    }
    Ok(())
}

/// Runs a transition and reloads the decorated record.
async fn apply_transition<F>(
    state: &AppState,
    id: i32,
    decide: F,
) -> Result<ExpenseRecord, ApiError>
where
    F: FnOnce(&expenses::Model, &ExpenseState) -> Result<ExpenseAction, ExpenseError> + Send,
{
    let repo = ExpenseRepository::new(state.conn());
    repo.transition(id, decide).await?;
    Ok(repo.get_record(id).await?)
}

/// Looks up the submitter for a notification; `None` if they are gone.
async fn submitter_contact(state: &AppState, record: &ExpenseRecord) -> Option<(String, String)> {
    match UserRepository::new(state.conn())
        .find_by_id(record.expense.user_id)
        .await
    {
        Ok(Some(user)) => Some((user.email, user.full_name)),
        Ok(None) => None,
        Err(e) => {
            warn!(expense_id = record.expense.id, error = %e, "Could not load submitter for notification");
            None
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /expenses - List visible expenses, newest first.
async fn list_expenses(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListExpensesQuery>,
) -> ApiResult<Json<Vec<ExpenseResponse>>> {
    let filter = ExpenseFilter {
        status: query
            .status
            .as_deref()
            .map(|v| ExpenseStatus::parse(v).ok_or_else(|| invalid_field("status", v)))
            .transpose()?,
        expense_type: query
            .expense_type
            .as_deref()
            .map(|v| ExpenseType::parse(v).ok_or_else(|| invalid_field("type", v)))
            .transpose()?,
        department_id: query.department_id,
        month: query
            .month
            .as_deref()
            .map(MonthFilter::from_str)
            .transpose()?
            .unwrap_or_default(),
        payment_status: query
            .payment_status
            .as_deref()
            .map(|v| PaymentStatus::parse(v).ok_or_else(|| invalid_field("payment_status", v)))
            .transpose()?,
    };

    let records = ExpenseRepository::new(state.conn())
        .list(&auth.principal.visibility(), &filter)
        .await?;
    Ok(Json(records.into_iter().map(ExpenseResponse::from).collect()))
}

/// GET /expenses/pending - Pending expenses the caller may decide on.
async fn list_pending(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ExpenseResponse>>> {
    let principal = &auth.principal;
    auth.require(
        principal.is_admin() || principal.role == Role::Manager,
        "view pending approvals",
    )?;

    let records = ExpenseRepository::new(state.conn())
        .list_pending_approvals(
            principal.is_admin(),
            &principal.managed_department_ids,
            &principal.managed_category_ids,
        )
        .await?;
    Ok(Json(records.into_iter().map(ExpenseResponse::from).collect()))
}

/// GET /expenses/{id} - Get one expense.
async fn get_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ExpenseResponse>> {
    let record = load_visible(&state, &auth, id).await?;
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses - Submit an expense (multipart).
async fn create_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = FormData::read(multipart).await?;

    let amount: Decimal = form
        .parse("amount")?
        .ok_or(ExpenseError::MissingField("amount"))?;
    let currency = form.text("currency").unwrap_or_default().to_ascii_uppercase();
    let expense_type = form
        .parse_with("type", ExpenseType::parse)?
        .or(form.parse_with("expense_type", ExpenseType::parse)?)
        .ok_or(ExpenseError::MissingField("type"))?;
    let description = form.text("description").unwrap_or_default().to_string();
    let reason = form.text("reason").unwrap_or_default().to_string();

    let valid = ExpenseWorkflow::validate_submission(&SubmissionInput {
        amount,
        currency: &currency,
        description: &description,
        reason: &reason,
        expense_type,
        subcategory_id: form.parse("subcategory_id")?,
    })?;
    let (subcategory_id, amount) = (valid.subcategory_id, valid.amount);

    let scope = OrganizationRepository::new(state.conn())
        .scope_of_subcategory(subcategory_id)
        .await?;
    auth.require(
        auth.principal.can_submit_to(scope),
        "submit expenses to this subcategory",
    )?;

    let supplier_id = form.parse("supplier_id")?;
    let credit_card_id = form.parse("credit_card_id")?;
    ensure_references(&state, supplier_id, credit_card_id).await?;

    let payment_method = form.parse_with("payment_method", PaymentMethod::parse)?;
    let payment_due_date = form.parse_with("payment_due_date", PaymentDueDate::parse)?;
    let invoice_date: Option<NaiveDate> = form.parse("invoice_date")?;

    let now = Utc::now();
    let rate_date = ExpenseWorkflow::effective_rate_date(invoice_date, now);
    let normalized = state
        .currency
        .normalize(amount, &currency, rate_date)
        .await?;

    let saved = save_attachments(&state, auth.user_id(), &form).await?;
    let repo = ExpenseRepository::new(state.conn());
    let created = repo
        .create(NewExpense {
            user_id: auth.user_id(),
            subcategory_id,
            supplier_id,
            credit_card_id,
            amount,
            currency,
            rate: normalized.rate,
            amount_base: normalized.amount_base,
            description,
            reason,
            expense_type,
            payment_method,
            payment_due_date,
            invoice_date,
            quote_filename: saved.quote.clone(),
            invoice_filename: saved.invoice.clone(),
            receipt_filename: saved.receipt.clone(),
            state: ExpenseWorkflow::initial_state(expense_type, auth.user_id(), now),
            submitted_at: now,
        })
        .await;
    let created = match created {
        Ok(row) => row,
        Err(e) => {
            remove_files(&state, saved.names()).await;
            return Err(e.into());
        }
    };

    let record = repo.get_record(created.id).await?;
    info!(
        expense_id = created.id,
        user_id = auth.user_id(),
        expense_type = %expense_type,
        amount = %amount,
        currency = %record.expense.currency,
        "Expense submitted"
    );

    let expense = summary(&record);
    let mut notifications = vec![Notification::SubmissionConfirmation {
        to: auth.user.email.clone(),
        name: auth.user.full_name.clone(),
        expense: expense.clone(),
    }];
    if expense_type == ExpenseType::NeedsApproval {
        let approvers = UserRepository::new(state.conn())
            .approvers_for(scope.department_id, scope.category_id)
            .await;
        match approvers {
            Ok(approvers) => notifications.extend(approvers.into_iter().map(|manager| {
                Notification::ManagerHeadsUp {
                    to: manager.email,
                    name: manager.full_name,
                    submitter: auth.user.full_name.clone(),
                    expense: expense.clone(),
                }
            })),
            Err(e) => warn!(expense_id = created.id, error = %e, "Could not resolve approvers"),
        }
    }
    state.notifier.dispatch_all(notifications).await;

    Ok((StatusCode::CREATED, Json(ExpenseResponse::from(record))))
}

/// PUT /expenses/{id} - Edit an expense (multipart).
///
/// The submitter may edit while pending; admin at any time. Changing the
/// amount, currency or invoice date re-runs normalization.
async fn update_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> ApiResult<Json<ExpenseResponse>> {
    let record = load_visible(&state, &auth, id).await?;
    auth.require(
        auth.principal
            .can_edit(record.expense.user_id, is_pending(&record)),
        "edit this expense",
    )?;
    let form = FormData::read(multipart).await?;
    let current = &record.expense;

    let subcategory_id: Option<i32> = form.parse("subcategory_id")?;
    let amount: Option<Decimal> = form.parse("amount")?;
    let currency = form.text("currency").map(str::to_ascii_uppercase);
    let description = form.text("description").map(str::to_string);
    let reason = form.text("reason").map(str::to_string);
    let invoice_date = form.edit("invoice_date", |v| NaiveDate::from_str(v).ok())?;

    // Validate the merged result as if it were a fresh submission.
    let merged_currency = currency.clone().unwrap_or_else(|| current.currency.clone());
    let expense_type = ExpenseType::parse(&current.expense_type).ok_or_else(|| {
        ApiError::new(500, "DATABASE_ERROR", format!("Expense {id} has invalid type"))
    })?;
    let valid = ExpenseWorkflow::validate_submission(&SubmissionInput {
        amount: amount.unwrap_or(current.amount),
        currency: &merged_currency,
        description: description.as_deref().unwrap_or(&current.description),
        reason: reason.as_deref().unwrap_or(&current.reason),
        expense_type,
        subcategory_id: Some(subcategory_id.unwrap_or(current.subcategory_id)),
    })?;
    let amount = amount.map(|_| valid.amount);

    if let Some(subcategory_id) = subcategory_id.filter(|s| *s != current.subcategory_id) {
        let scope = OrganizationRepository::new(state.conn())
            .scope_of_subcategory(subcategory_id)
            .await?;
        auth.require(
            auth.principal.can_submit_to(scope),
            "move expenses to this subcategory",
        )?;
    }

    let supplier_id = form.edit("supplier_id", |v| v.parse::<i32>().ok())?;
    let credit_card_id = form.edit("credit_card_id", |v| v.parse::<i32>().ok())?;
    ensure_references(&state, supplier_id.flatten(), credit_card_id.flatten()).await?;

    let money = if amount.is_some() || currency.is_some() || invoice_date.is_some() {
        let amount = amount.unwrap_or(current.amount);
        let rate_date = ExpenseWorkflow::effective_rate_date(
            invoice_date.unwrap_or(current.invoice_date),
            current.submitted_at,
        );
        let normalized = state
            .currency
            .normalize(amount, &merged_currency, rate_date)
            .await?;
        Some(MoneyChange {
            amount,
            currency: merged_currency,
            rate: normalized.rate,
            amount_base: normalized.amount_base,
        })
    } else {
        None
    };

    let saved = save_attachments(&state, current.user_id, &form).await?;
    let changes = ExpenseChanges {
        subcategory_id,
        supplier_id,
        credit_card_id,
        money,
        description,
        reason,
        payment_method: form.edit("payment_method", PaymentMethod::parse)?,
        payment_due_date: form.edit("payment_due_date", PaymentDueDate::parse)?,
        invoice_date,
        quote_filename: saved.quote.clone(),
        invoice_filename: saved.invoice.clone(),
        receipt_filename: saved.receipt.clone(),
    };

    let repo = ExpenseRepository::new(state.conn());
    if let Err(e) = repo.update(id, changes, auth.principal.is_admin()).await {
        remove_files(&state, saved.names()).await;
        return Err(e.into());
    }

    // Old files replaced by new uploads are no longer referenced.
    let replaced = [
        (saved.quote.is_some(), current.quote_filename.as_deref()),
        (saved.invoice.is_some(), current.invoice_filename.as_deref()),
        (saved.receipt.is_some(), current.receipt_filename.as_deref()),
    ];
    remove_files(
        &state,
        replaced
            .into_iter()
            .filter_map(|(was_replaced, old)| old.filter(|_| was_replaced))
            .collect::<Vec<_>>(),
    )
    .await;

    info!(expense_id = id, user_id = auth.user_id(), "Expense edited");
    Ok(Json(ExpenseResponse::from(repo.get_record(id).await?)))
}

/// DELETE /expenses/{id} - Delete an expense and its attachments.
async fn delete_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    let record = load_visible(&state, &auth, id).await?;
    auth.require(
        auth.principal
            .can_edit(record.expense.user_id, is_pending(&record)),
        "delete this expense",
    )?;

    let removed = ExpenseRepository::new(state.conn())
        .delete(id, auth.principal.is_admin())
        .await?;
    remove_files(&state, stored_files(&removed)).await;
    info!(expense_id = id, deleted_by = auth.user_id(), "Expense deleted by user");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /expenses/{id}/approve - Approve a pending expense.
async fn approve_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ExpenseResponse>> {
    let record = load_visible(&state, &auth, id).await?;
    auth.require(auth.principal.can_approve(record.scope), "approve this expense")?;

    let handler_id = auth.user_id();
    let record =
        apply_transition(&state, id, |_, s| ExpenseWorkflow::approve(s, handler_id)).await?;

    if let Some((to, name)) = submitter_contact(&state, &record).await {
        state
            .notifier
            .dispatch(Notification::Approved {
                to,
                name,
                handler: auth.user.full_name.clone(),
                expense: summary(&record),
            })
            .await;
    }
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/{id}/reject - Reject a pending expense with a reason.
async fn reject_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<RejectRequest>,
) -> ApiResult<Json<ExpenseResponse>> {
    let record = load_visible(&state, &auth, id).await?;
    auth.require(auth.principal.can_approve(record.scope), "reject this expense")?;

    let handler_id = auth.user_id();
    let reason = payload.reason;
    let record = apply_transition(&state, id, |_, s| {
        ExpenseWorkflow::reject(s, handler_id, &reason)
    })
    .await?;

    if let Some((to, name)) = submitter_contact(&state, &record).await {
        state
            .notifier
            .dispatch(Notification::Rejected {
                to,
                name,
                handler: auth.user.full_name.clone(),
                reason: record.expense.rejection_reason.clone().unwrap_or_default(),
                expense: summary(&record),
            })
            .await;
    }
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/{id}/mark-pending-payment - Schedule an approved expense for payment.
async fn mark_pending_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ExpenseResponse>> {
    auth.require(auth.principal.can_manage_payments(), "manage payments")?;
    let record =
        apply_transition(&state, id, |_, s| ExpenseWorkflow::mark_pending_payment(s)).await?;
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/{id}/mark-paid - Mark a scheduled expense paid and notify the submitter.
async fn mark_paid(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ExpenseResponse>> {
    auth.require(auth.principal.can_manage_payments(), "manage payments")?;
    let paid_by = auth.user_id();
    let record = apply_transition(&state, id, |_, s| ExpenseWorkflow::mark_paid(s, paid_by)).await?;

    if let Some((to, name)) = submitter_contact(&state, &record).await {
        state
            .notifier
            .dispatch(Notification::Paid {
                to,
                name,
                expense: summary(&record),
            })
            .await;
    }
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/{id}/mark-unpaid - Return an expense to pending attention.
async fn mark_unpaid(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<ExpenseResponse>> {
    auth.require(auth.principal.can_manage_payments(), "manage payments")?;
    let record = apply_transition(&state, id, |_, s| ExpenseWorkflow::mark_unpaid(s)).await?;
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/{id}/external-entry - Set or clear the external accounting flag.
async fn set_external_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ExternalEntryRequest>,
) -> ApiResult<Json<ExpenseResponse>> {
    auth.require(auth.principal.can_manage_payments(), "manage external entries")?;
    let by = auth.user_id();
    let record = apply_transition(&state, id, |_, s| {
        ExpenseWorkflow::set_external_entry(s, payload.value, by)
    })
    .await?;
    Ok(Json(ExpenseResponse::from(record)))
}

/// POST /expenses/process-document - Read amount, currency and date off an
/// uploaded invoice or receipt.
///
/// The file is stored under the temporary directory for the duration of the
/// call and removed afterwards.
async fn process_document(
    State(state): State<AppState>,
    _auth: AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let form = FormData::read(multipart).await?;
    let upload = form
        .files
        .first()
        .ok_or_else(|| ApiError::validation("No file uploaded"))?;

    if !state.extractor.is_configured() {
        return Ok(Json(json!({
            "success": false,
            "warning": "OCR service not configured",
            "extracted_data": { "amount": null, "purchase_date": null },
        })));
    }

    let path = state
        .uploads
        .save_temp(&upload.file_name, upload.bytes.clone())
        .await?;
    let result = state.extractor.extract(&path).await;
    state.uploads.remove_temp(&path).await;
    let data = result?;

    info!(
        status = ?data.status,
        doc_type = data.doc_type.map(|d| d.as_str()),
        "Document processed"
    );
    Ok(Json(json!({
        "success": data.status == ExtractionStatus::Success,
        "extracted_data": {
            "amount": data.amount.map(round_money),
            "currency": data.currency,
            "purchase_date": data.date,
            "doc_type": data.doc_type,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn form_of(pairs: &[(&str, &str)]) -> FormData {
        FormData {
            fields: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            files: Vec::new(),
        }
    }

    #[rstest]
    #[case("quote", Some(AttachmentKind::Quote))]
    #[case("invoice_file", Some(AttachmentKind::Invoice))]
    #[case("receiptFile", Some(AttachmentKind::Receipt))]
    #[case("file", None)]
    #[case("quote_files", None)]
    fn test_attachment_kind(#[case] field: &str, #[case] expected: Option<AttachmentKind>) {
        assert_eq!(attachment_kind(field), expected);
    }

    #[test]
    fn test_blank_text_is_absent() {
        let form = form_of(&[("description", "   "), ("reason", " tools ")]);
        assert_eq!(form.text("description"), None);
        assert_eq!(form.text("reason"), Some("tools"));
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn test_parse_reports_field() {
        let form = form_of(&[("amount", "12.50"), ("supplier_id", "abc")]);
        let amount: Option<Decimal> = form.parse("amount").unwrap();
        assert_eq!(amount, Some(Decimal::new(1250, 2)));

        let err = form.parse::<i32>("supplier_id").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_edit_distinguishes_clear_from_absent() {
        let form = form_of(&[("payment_method", ""), ("payment_due_date", "end_of_month")]);
        assert_eq!(form.edit("payment_method", PaymentMethod::parse).unwrap(), Some(None));
        assert_eq!(
            form.edit("payment_due_date", PaymentDueDate::parse).unwrap(),
            Some(Some(PaymentDueDate::EndOfMonth))
        );
        assert_eq!(form.edit("invoice_date", |v| NaiveDate::from_str(v).ok()).unwrap(), None);
        let invalid = form_of(&[("payment_method", "cash")]);
        assert!(invalid.edit("payment_method", PaymentMethod::parse).is_err());
    }

    #[test]
    fn test_unknown_file_field_is_rejected() {
        let mut form = form_of(&[]);
        form.files.push(Upload {
            field: "avatar".into(),
            file_name: "me.png".into(),
            bytes: vec![1],
        });
        assert!(form.attachments().is_err());
    }

    #[test]
    fn test_saved_files_replace_slot() {
        let mut saved = SavedFiles::default();
        assert_eq!(saved.set(AttachmentKind::Quote, "a.pdf".into()), None);
        assert_eq!(saved.set(AttachmentKind::Quote, "b.pdf".into()), Some("a.pdf".into()));
        saved.set(AttachmentKind::Receipt, "c.png".into());
        assert_eq!(saved.names().collect::<Vec<_>>(), vec!["b.pdf", "c.png"]);
    }
}
