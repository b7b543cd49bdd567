//! Supplier registry routes.
//!
//! Any signed-in user may list, search and add suppliers while submitting.
//! Editing and removal belong to admin and accounting.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiResult;
use crate::{AppState, middleware::AuthUser};
use outlay_db::SupplierRepository;
use outlay_db::entities::suppliers;
use outlay_db::repositories::{SupplierInput, SupplierRemoval};

const SEARCH_LIMIT: u64 = 20;

/// Creates the supplier routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/suppliers", get(list_suppliers).post(create_supplier))
        .route("/suppliers/search", get(search_suppliers))
        .route(
            "/suppliers/{id}",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
}

/// Query parameters for listing suppliers.
#[derive(Debug, Default, Deserialize)]
pub struct ListSuppliersQuery {
    /// Include inactive suppliers.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query parameters for the name search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search term.
    #[serde(default)]
    pub q: String,
}

/// GET /suppliers - List suppliers by name.
async fn list_suppliers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListSuppliersQuery>,
) -> ApiResult<Json<Vec<suppliers::Model>>> {
    let suppliers = SupplierRepository::new(state.conn())
        .list(query.include_inactive)
        .await?;
    Ok(Json(suppliers))
}

/// GET /suppliers/search?q= - Active suppliers whose name matches.
async fn search_suppliers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<suppliers::Model>>> {
    let found = SupplierRepository::new(state.conn())
        .search(query.q.trim(), SEARCH_LIMIT)
        .await?;
    Ok(Json(found))
}

/// GET /suppliers/{id} - Get a supplier.
async fn get_supplier(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<suppliers::Model>> {
    Ok(Json(SupplierRepository::new(state.conn()).get(id).await?))
}

/// POST /suppliers - Add a supplier.
async fn create_supplier(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SupplierInput>,
) -> ApiResult<impl IntoResponse> {
    let created = SupplierRepository::new(state.conn()).create(payload).await?;
    info!(supplier_id = created.id, created_by = auth.user_id(), "Supplier added");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /suppliers/{id} - Replace a supplier's fields (admin, accounting).
async fn update_supplier(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<SupplierInput>,
) -> ApiResult<Json<suppliers::Model>> {
    auth.require(auth.principal.can_manage_payments(), "edit suppliers")?;
    Ok(Json(
        SupplierRepository::new(state.conn())
            .update(id, payload)
            .await?,
    ))
}

/// DELETE /suppliers/{id} - Delete, or deactivate when expenses reference it.
async fn delete_supplier(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(auth.principal.can_manage_payments(), "remove suppliers")?;
    let outcome = match SupplierRepository::new(state.conn()).delete(id).await? {
        SupplierRemoval::Deleted => "deleted",
        SupplierRemoval::Deactivated => "deactivated",
    };
    Ok(Json(json!({ "id": id, "result": outcome })))
}
