//! Company credit card routes. Only the last four digits are ever stored.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use super::users::double_option;
use crate::error::ApiResult;
use crate::{AppState, middleware::AuthUser};
use outlay_db::CreditCardRepository;
use outlay_db::entities::credit_cards;
use outlay_db::repositories::CardRemoval;

/// Creates the credit card routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/credit-cards", get(list_cards).post(create_card))
        .route("/credit-cards/{id}", get(get_card).put(update_card).delete(delete_card))
}

/// Query parameters for listing cards.
#[derive(Debug, Default, Deserialize)]
pub struct ListCardsQuery {
    /// Include inactive cards.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Request body for adding a card.
#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    /// Exactly four ASCII digits.
    pub last_four_digits: String,
    /// Label, e.g. the holder.
    pub description: Option<String>,
}

/// Request body for editing a card.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCardRequest {
    /// Exactly four ASCII digits.
    pub last_four_digits: Option<String>,
    /// Label; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    /// `active` or `inactive`.
    pub status: Option<String>,
}

/// GET /credit-cards - List cards.
async fn list_cards(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListCardsQuery>,
) -> ApiResult<Json<Vec<credit_cards::Model>>> {
    Ok(Json(
        CreditCardRepository::new(state.conn())
            .list(query.include_inactive)
            .await?,
    ))
}

/// GET /credit-cards/{id} - Get a card.
async fn get_card(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<credit_cards::Model>> {
    Ok(Json(CreditCardRepository::new(state.conn()).get(id).await?))
}

/// POST /credit-cards - Add a card (admin, accounting).
async fn create_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCardRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require(auth.principal.can_manage_payments(), "manage credit cards")?;
    let created = CreditCardRepository::new(state.conn())
        .create(&payload.last_four_digits, payload.description)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /credit-cards/{id} - Edit a card (admin, accounting).
async fn update_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCardRequest>,
) -> ApiResult<Json<credit_cards::Model>> {
    auth.require(auth.principal.can_manage_payments(), "manage credit cards")?;
    let updated = CreditCardRepository::new(state.conn())
        .update(
            id,
            payload.last_four_digits.as_deref(),
            payload.description,
            payload.status.as_deref().map(str::trim),
        )
        .await?;
    Ok(Json(updated))
}

/// DELETE /credit-cards/{id} - Delete, or deactivate when expenses reference it.
async fn delete_card(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<serde_json::Value>> {
    auth.require(auth.principal.can_manage_payments(), "manage credit cards")?;
    let outcome = match CreditCardRepository::new(state.conn()).delete(id).await? {
        CardRemoval::Deleted => "deleted",
        CardRemoval::Deactivated => "deactivated",
    };
    Ok(Json(json!({ "id": id, "result": outcome })))
}
