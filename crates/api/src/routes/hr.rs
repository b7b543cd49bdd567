//! HR welfare routes: welfare categories across departments with their
//! budgets and approved spending.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, middleware::AuthUser};
use outlay_core::budget::{BudgetService, BudgetUsage};
use outlay_core::org::current_year;
use outlay_db::repositories::UpdateCategoryInput;
use outlay_db::{BudgetRepository, OrganizationRepository};
use outlay_shared::types::round_money;

/// Creates the HR routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hr/welfare", get(welfare_overview))
        .route("/hr/welfare/categories/{id}", put(update_welfare_budget))
}

/// Query parameters for the welfare overview.
#[derive(Debug, Default, Deserialize)]
pub struct WelfareQuery {
    /// Budget year; defaults to the current year.
    pub year: Option<i32>,
}

/// One welfare category.
#[derive(Debug, Serialize)]
pub struct WelfareCategory {
    /// Category ID.
    pub category_id: i32,
    /// Category name.
    pub category_name: String,
    /// Owning department.
    pub department_id: i32,
    /// Department name.
    pub department_name: String,
    /// Department budget currency.
    pub currency: String,
    /// Budget, spending and utilization.
    #[serde(flatten)]
    pub usage: BudgetUsage,
}

/// The welfare overview of one year.
#[derive(Debug, Serialize)]
pub struct WelfareResponse {
    /// Calendar year.
    pub year: i32,
    /// Sum of welfare budgets.
    pub total_budget: Decimal,
    /// Sum of welfare spending.
    pub total_spent: Decimal,
    /// Welfare categories by department and name.
    pub categories: Vec<WelfareCategory>,
}

/// Request body for a welfare budget edit.
#[derive(Debug, Deserialize)]
pub struct WelfareBudgetRequest {
    /// New budget.
    pub budget: Decimal,
}

/// GET /hr/welfare?year= - Welfare categories of a year (admin, hr).
async fn welfare_overview(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<WelfareQuery>,
) -> ApiResult<Json<WelfareResponse>> {
    auth.require(auth.principal.can_manage_welfare(), "view welfare budgets")?;

    let year = query.year.unwrap_or_else(current_year);
    let org = OrganizationRepository::new(state.conn());
    let budget_year = org.get_year(year).await?;
    let rows = org.list_welfare_categories(budget_year.id).await?;
    let totals = BudgetRepository::new(state.conn())
        .year_totals(budget_year.id)
        .await?;

    let categories: Vec<WelfareCategory> = rows
        .into_iter()
        .map(|(category, department)| WelfareCategory {
            usage: BudgetService::usage(
                round_money(category.budget),
                round_money(totals.category(category.id)),
            ),
            category_id: category.id,
            category_name: category.name,
            department_id: department.id,
            department_name: department.name,
            currency: department.currency,
        })
        .collect();

    Ok(Json(WelfareResponse {
        year,
        total_budget: categories.iter().map(|c| c.usage.budget).sum(),
        total_spent: categories.iter().map(|c| c.usage.spent).sum(),
        categories,
    }))
}

/// PUT /hr/welfare/categories/{id} - Edit the budget of a welfare category (admin, hr).
async fn update_welfare_budget(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<WelfareBudgetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(auth.principal.can_manage_welfare(), "edit welfare budgets")?;

    let org = OrganizationRepository::new(state.conn());
    if !org.get_category(id).await?.is_welfare {
        return Err(ApiError::validation(format!(
            "Category {id} is not a welfare category"
        )));
    }
    let updated = org
        .update_category(
            id,
            UpdateCategoryInput {
                budget: Some(payload.budget),
                ..UpdateCategoryInput::default()
            },
        )
        .await?;
    info!(category_id = id, updated_by = auth.user_id(), budget = %updated.budget, "Welfare budget updated");

    Ok(Json(serde_json::json!({
        "category_id": updated.id,
        "budget": round_money(updated.budget),
    })))
}
