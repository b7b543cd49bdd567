//! Admin dashboard statistics.

use axum::{Json, Router, extract::State, routing::get};

use crate::error::ApiResult;
use crate::{AppState, middleware::AuthUser};
use outlay_db::ReportRepository;
use outlay_db::repositories::AdminStats;

/// Creates the admin routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/stats", get(stats))
}

/// GET /admin/stats - User and expense counts, totals and top departments.
async fn stats(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<AdminStats>> {
    auth.require_admin()?;
    Ok(Json(ReportRepository::new(state.conn()).admin_stats().await?))
}
