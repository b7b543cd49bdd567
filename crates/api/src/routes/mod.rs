//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::session_middleware};

pub mod admin;
pub mod auth;
pub mod credit_cards;
pub mod expenses;
pub mod files;
pub mod health;
pub mod hr;
pub mod organization;
pub mod suppliers;
pub mod users;

/// Creates the versioned API router; everything but login and health needs a session.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .merge(auth::session_routes())
        .merge(expenses::routes())
        .merge(organization::routes())
        .merge(suppliers::routes())
        .merge(credit_cards::routes())
        .merge(users::routes())
        .merge(hr::routes())
        .merge(admin::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(protected_routes)
}

/// Unversioned routes: health, the SSO callback, downloads and the export.
#[allow(clippy::needless_pass_by_value)]
pub fn root_routes_with_state(state: AppState) -> Router<AppState> {
    let protected_routes = files::routes().layer(middleware::from_fn_with_state(
        state.clone(),
        session_middleware,
    ));

    Router::new()
        .merge(health::routes())
        .merge(auth::callback_routes())
        .merge(protected_routes)
}
