//! Organization routes: budget years, the department → category →
//! subcategory tree with spending, and the year-over-year copy.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::{AppState, middleware::AuthUser};
use outlay_core::budget::{BudgetService, BudgetUsage, SpendTotals};
use outlay_core::org::current_year;
use outlay_db::entities::{budget_years, departments};
use outlay_db::repositories::{
    CategoryNode, CopyReport, DepartmentNode, UpdateCategoryInput, UpdateDepartmentInput,
    UpdateSubcategoryInput,
};
use outlay_db::{BudgetRepository, OrganizationRepository};
use outlay_shared::types::round_money;

/// Creates the organization routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organization/years", get(list_years).post(create_year))
        .route("/organization/years/current", get(current))
        .route(
            "/organization/years/{year}",
            put(update_year).delete(delete_year),
        )
        .route("/organization/years/{year}/structure", get(structure))
        .route(
            "/organization/years/{year}/departments",
            get(list_departments).post(create_department),
        )
        .route("/organization/years/{year}/copy-from", post(copy_from))
        .route("/organization/years/{year}/migrate-users", post(migrate_users))
        .route(
            "/organization/departments/{id}",
            put(update_department).delete(delete_department),
        )
        .route(
            "/organization/departments/{id}/categories",
            post(create_category),
        )
        .route(
            "/organization/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route(
            "/organization/categories/{id}/subcategories",
            post(create_subcategory),
        )
        .route(
            "/organization/subcategories/{id}",
            put(update_subcategory).delete(delete_subcategory),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A budget year.
#[derive(Debug, Serialize)]
pub struct YearResponse {
    /// Row id.
    pub id: i32,
    /// Calendar year.
    pub year: i32,
    /// Display name.
    pub name: String,
    /// Display-only flag; "current" is always the wall-clock year.
    pub is_active: bool,
    /// Whether this is the wall-clock year.
    pub is_current: bool,
}

impl From<budget_years::Model> for YearResponse {
    fn from(m: budget_years::Model) -> Self {
        Self {
            is_current: m.year == current_year(),
            id: m.id,
            year: m.year,
            name: m.name,
            is_active: m.is_active,
        }
    }
}

/// Request body for creating a year.
#[derive(Debug, Deserialize)]
pub struct CreateYearRequest {
    /// Calendar year.
    pub year: i32,
    /// Display name; defaults to the year.
    pub name: Option<String>,
    /// Display-only flag.
    #[serde(default)]
    pub is_active: bool,
}

/// Request body for updating a year.
#[derive(Debug, Deserialize)]
pub struct UpdateYearRequest {
    /// Display name.
    pub name: Option<String>,
    /// Display-only flag.
    pub is_active: Option<bool>,
}

/// A department without its subtree.
#[derive(Debug, Serialize)]
pub struct DepartmentResponse {
    /// Department ID.
    pub id: i32,
    /// Owning year row.
    pub budget_year_id: i32,
    /// Name.
    pub name: String,
    /// Budget.
    pub budget: Decimal,
    /// Budget currency.
    pub currency: String,
}

impl From<departments::Model> for DepartmentResponse {
    fn from(m: departments::Model) -> Self {
        Self {
            id: m.id,
            budget_year_id: m.budget_year_id,
            name: m.name,
            budget: round_money(m.budget),
            currency: m.currency,
        }
    }
}

/// A department in the structure view.
#[derive(Debug, Serialize)]
pub struct DepartmentView {
    /// Department ID.
    pub id: i32,
    /// Name.
    pub name: String,
    /// Budget currency.
    pub currency: String,
    /// Budget, spending and utilization.
    #[serde(flatten)]
    pub usage: BudgetUsage,
    /// Whether the caller may only read this node.
    pub read_only: bool,
    /// Categories by name.
    pub categories: Vec<CategoryView>,
}

/// A category in the structure view.
#[derive(Debug, Serialize)]
pub struct CategoryView {
    /// Category ID.
    pub id: i32,
    /// Name.
    pub name: String,
    /// Welfare flag.
    pub is_welfare: bool,
    /// Budget, spending and utilization.
    #[serde(flatten)]
    pub usage: BudgetUsage,
    /// Subcategories by name.
    pub subcategories: Vec<SubcategoryView>,
}

/// A subcategory in the structure view.
#[derive(Debug, Serialize)]
pub struct SubcategoryView {
    /// Subcategory ID.
    pub id: i32,
    /// Name.
    pub name: String,
    /// Budget, spending and utilization.
    #[serde(flatten)]
    pub usage: BudgetUsage,
}

/// The structure of one year as seen by the caller.
#[derive(Debug, Serialize)]
pub struct StructureResponse {
    /// Calendar year.
    pub year: i32,
    /// Whether the whole view is read-only for the caller.
    pub read_only: bool,
    /// Departments in scope.
    pub departments: Vec<DepartmentView>,
}

/// Request body for creating a department.
#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    /// Name, unique within the year.
    pub name: String,
    /// Budget.
    #[serde(default)]
    pub budget: Decimal,
    /// Budget currency; defaults to the base currency.
    pub currency: Option<String>,
}

/// Request body for updating a department.
#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    /// Name.
    pub name: Option<String>,
    /// Budget.
    pub budget: Option<Decimal>,
    /// Budget currency.
    pub currency: Option<String>,
}

/// Request body for creating a category.
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    /// Name.
    pub name: String,
    /// Budget.
    #[serde(default)]
    pub budget: Decimal,
    /// Welfare flag.
    #[serde(default)]
    pub is_welfare: bool,
}

/// Request body for updating a category.
#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    /// Name.
    pub name: Option<String>,
    /// Budget.
    pub budget: Option<Decimal>,
    /// Welfare flag.
    pub is_welfare: Option<bool>,
}

/// Request body for creating a subcategory.
#[derive(Debug, Deserialize)]
pub struct CreateSubcategoryRequest {
    /// Name.
    pub name: String,
    /// Budget.
    #[serde(default)]
    pub budget: Decimal,
}

/// Request body for updating a subcategory.
#[derive(Debug, Deserialize)]
pub struct UpdateSubcategoryRequest {
    /// Name.
    pub name: Option<String>,
    /// Budget.
    pub budget: Option<Decimal>,
}

/// Request body for a structure copy.
#[derive(Debug, Deserialize)]
pub struct CopyFromRequest {
    /// Year to copy from.
    pub source_year: i32,
    /// Also move home departments and manager links.
    #[serde(default)]
    pub migrate_users: bool,
}

/// Request body for a user migration.
#[derive(Debug, Deserialize)]
pub struct MigrateUsersRequest {
    /// Year to migrate from.
    pub source_year: i32,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn usage(budget: Decimal, spent: Decimal) -> BudgetUsage {
    let usage = BudgetService::usage(round_money(budget), round_money(spent));
    BudgetUsage {
        remaining: round_money(usage.remaining),
        ..usage
    }
}

fn category_view(node: CategoryNode, totals: &SpendTotals) -> CategoryView {
    CategoryView {
        id: node.category.id,
        usage: usage(node.category.budget, totals.category(node.category.id)),
        name: node.category.name,
        is_welfare: node.category.is_welfare,
        subcategories: node
            .subcategories
            .into_iter()
            .map(|s| SubcategoryView {
                id: s.id,
                usage: usage(s.budget, totals.subcategory(s.id)),
                name: s.name,
            })
            .collect(),
    }
}

/// Folds the tree and the spending maps into the response shape.
fn department_views(
    nodes: Vec<DepartmentNode>,
    totals: &SpendTotals,
    read_only: bool,
) -> Vec<DepartmentView> {
    nodes
        .into_iter()
        .map(|node| DepartmentView {
            id: node.department.id,
            usage: usage(node.department.budget, totals.department(node.department.id)),
            name: node.department.name,
            currency: node.department.currency,
            read_only,
            categories: node
                .categories
                .into_iter()
                .map(|c| category_view(c, totals))
                .collect(),
        })
        .collect()
}

// ============================================================================
// Handlers: years
// ============================================================================

/// GET /organization/years - List budget years, newest first.
async fn list_years(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> ApiResult<Json<Vec<YearResponse>>> {
    let years = OrganizationRepository::new(state.conn()).list_years().await?;
    Ok(Json(years.into_iter().map(YearResponse::from).collect()))
}

/// GET /organization/years/current - The wall-clock year, and its row if it exists.
async fn current(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let year = current_year();
    let row = OrganizationRepository::new(state.conn())
        .find_year(year)
        .await?
        .map(YearResponse::from);
    Ok(Json(serde_json::json!({ "year": year, "budget_year": row })))
}

/// POST /organization/years - Create a budget year (admin).
async fn create_year(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateYearRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let created = OrganizationRepository::new(state.conn())
        .create_year(payload.year, payload.name, payload.is_active)
        .await?;
    Ok((StatusCode::CREATED, Json(YearResponse::from(created))))
}

/// PUT /organization/years/{year} - Rename or flag a year (admin).
async fn update_year(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
    Json(payload): Json<UpdateYearRequest>,
) -> ApiResult<Json<YearResponse>> {
    auth.require_admin()?;
    let updated = OrganizationRepository::new(state.conn())
        .update_year(year, payload.name, payload.is_active)
        .await?;
    Ok(Json(YearResponse::from(updated)))
}

/// DELETE /organization/years/{year} - Delete an empty year (admin).
async fn delete_year(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    OrganizationRepository::new(state.conn()).delete_year(year).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /organization/years/{year}/structure - The tree with budgets and spending.
///
/// Admin and accounting see every department (accounting read-only); others
/// see their home and managed departments and those owning managed
/// categories.
async fn structure(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
) -> ApiResult<Json<StructureResponse>> {
    let org = OrganizationRepository::new(state.conn());
    let budget_year = org.get_year(year).await?;

    let managed_categories: Vec<i32> = auth.principal.managed_category_ids.iter().copied().collect();
    let category_departments = org.departments_of_categories(&managed_categories).await?;
    let scope = auth.principal.structure_scope(&category_departments);
    let read_only = scope.is_read_only() || !auth.principal.is_admin();

    let nodes = org.load_structure(budget_year.id, &scope).await?;
    let ids: Vec<i32> = nodes.iter().map(|n| n.department.id).collect();
    let totals = BudgetRepository::new(state.conn()).totals(&ids).await?;

    Ok(Json(StructureResponse {
        year,
        read_only,
        departments: department_views(nodes, &totals, read_only),
    }))
}

/// POST /organization/years/{year}/copy-from - Copy another year's structure
/// into this one (admin). Re-running skips departments already present.
async fn copy_from(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
    Json(payload): Json<CopyFromRequest>,
) -> ApiResult<Json<CopyReport>> {
    auth.require_admin()?;
    let report = OrganizationRepository::new(state.conn())
        .copy_structure(payload.source_year, year, payload.migrate_users)
        .await?;
    info!(
        source_year = payload.source_year,
        target_year = year,
        departments_created = report.departments_created,
        departments_reused = report.departments_reused,
        "Structure copied"
    );
    Ok(Json(report))
}

/// POST /organization/years/{year}/migrate-users - Move home departments to
/// this year's same-named departments (admin).
async fn migrate_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
    Json(payload): Json<MigrateUsersRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require_admin()?;
    let migrated = OrganizationRepository::new(state.conn())
        .migrate_users(payload.source_year, year)
        .await?;
    Ok(Json(serde_json::json!({ "users_migrated": migrated })))
}

// ============================================================================
// Handlers: departments, categories, subcategories
// ============================================================================

/// GET /organization/years/{year}/departments - Department names of a year.
async fn list_departments(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(year): Path<i32>,
) -> ApiResult<Json<Vec<DepartmentResponse>>> {
    let org = OrganizationRepository::new(state.conn());
    let budget_year = org.get_year(year).await?;
    let departments = org.list_departments(budget_year.id).await?;
    Ok(Json(
        departments.into_iter().map(DepartmentResponse::from).collect(),
    ))
}

/// POST /organization/years/{year}/departments - Create a department (admin).
async fn create_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(year): Path<i32>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let org = OrganizationRepository::new(state.conn());
    let budget_year = org.get_year(year).await?;
    let currency = payload
        .currency
        .map(|c| c.trim().to_ascii_uppercase())
        .unwrap_or_else(|| state.config.currency.base.clone());
    let created = org
        .create_department(budget_year.id, payload.name.trim(), payload.budget, &currency)
        .await?;
    Ok((StatusCode::CREATED, Json(DepartmentResponse::from(created))))
}

/// PUT /organization/departments/{id} - Update a department (admin).
async fn update_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateDepartmentRequest>,
) -> ApiResult<Json<DepartmentResponse>> {
    auth.require_admin()?;
    let updated = OrganizationRepository::new(state.conn())
        .update_department(
            id,
            UpdateDepartmentInput {
                name: payload.name.map(|n| n.trim().to_string()),
                budget: payload.budget,
                currency: payload.currency.map(|c| c.trim().to_ascii_uppercase()),
            },
        )
        .await?;
    Ok(Json(DepartmentResponse::from(updated)))
}

/// DELETE /organization/departments/{id} - Delete an empty department (admin).
async fn delete_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    OrganizationRepository::new(state.conn())
        .delete_department(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /organization/departments/{id}/categories - Create a category (admin).
async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(department_id): Path<i32>,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let created = OrganizationRepository::new(state.conn())
        .create_category(
            department_id,
            payload.name.trim(),
            payload.budget,
            payload.is_welfare,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /organization/categories/{id} - Update a category (admin).
async fn update_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let updated = OrganizationRepository::new(state.conn())
        .update_category(
            id,
            UpdateCategoryInput {
                name: payload.name.map(|n| n.trim().to_string()),
                budget: payload.budget,
                is_welfare: payload.is_welfare,
            },
        )
        .await?;
    Ok(Json(updated))
}

/// DELETE /organization/categories/{id} - Delete an empty category (admin).
async fn delete_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    OrganizationRepository::new(state.conn())
        .delete_category(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /organization/categories/{id}/subcategories - Create a subcategory (admin).
async fn create_subcategory(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(category_id): Path<i32>,
    Json(payload): Json<CreateSubcategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let created = OrganizationRepository::new(state.conn())
        .create_subcategory(category_id, payload.name.trim(), payload.budget)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /organization/subcategories/{id} - Update a subcategory (admin).
async fn update_subcategory(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateSubcategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;
    let updated = OrganizationRepository::new(state.conn())
        .update_subcategory(
            id,
            UpdateSubcategoryInput {
                name: payload.name.map(|n| n.trim().to_string()),
                budget: payload.budget,
            },
        )
        .await?;
    Ok(Json(updated))
}

/// DELETE /organization/subcategories/{id} - Delete an unused subcategory (admin).
async fn delete_subcategory(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    OrganizationRepository::new(state.conn())
        .delete_subcategory(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
