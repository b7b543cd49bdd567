//! Authentication routes: password login, logout, current user, password
//! change, and the single sign-on round trip.

use axum::{
    Json, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::users::UserResponse;
use crate::error::{ApiError, ApiResult};
use crate::{AppState, middleware::AuthUser};
use outlay_core::auth::{check_password_change, verify_password};
use outlay_core::notification::Notification;
use outlay_core::org::current_year;
use outlay_db::{OrganizationRepository, UserRepository};

const SSO_STATE_COOKIE: &str = "outlay_sso_state";

/// Public auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/sso/login", get(sso_login))
}

/// Auth routes that need a session.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/change-password", post(change_password))
}

/// The provider redirects here; mounted outside `/api/v1`.
pub fn callback_routes() -> Router<AppState> {
    Router::new().route("/auth/callback", get(sso_callback))
}

// ============================================================================
// Request Types
// ============================================================================

/// Request body for password login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    /// Password.
    pub password: String,
}

/// Request body for a password change.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    /// Required when the account already has a password.
    pub current_password: Option<String>,
    /// The new password.
    pub new_password: String,
}

/// Query string of the provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed state.
    pub state: Option<String>,
    /// Provider error code.
    pub error: Option<String>,
    /// Provider error text.
    pub error_description: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(state.config.session.secure)
        .same_site(SameSite::Lax)
        .build()
}

fn expired_cookie(name: String) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid username or password")
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login - Authenticate with a password and set the session cookie.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_repo = UserRepository::new(state.conn());

    let Some(user) = user_repo.find_by_login(payload.login.trim()).await? else {
        info!(login = %payload.login, "Login attempt for non-existent user");
        return Err(invalid_credentials());
    };

    let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) else {
        info!(user_id = user.id, "Password login for an SSO-only account");
        return Err(invalid_credentials());
    };
    if !verify_password(&payload.password, hash)? {
        info!(user_id = user.id, "Failed login attempt - invalid password");
        return Err(invalid_credentials());
    }

    let links = user_repo
        .find_with_links(user.id)
        .await?
        .ok_or_else(invalid_credentials)?;
    if !links.status().can_authenticate() {
        return Err(ApiError::unauthorized("This account is not active"));
    }

    let token = state
        .sessions
        .issue(user.id, links.role().as_str())
        .map_err(|e| ApiError::new(500, "SESSION_ERROR", e.to_string()))?;
    user_repo.touch_last_login(user.id).await?;

    info!(user_id = user.id, "User logged in");
    let jar = jar.add(session_cookie(&state, token));
    Ok((jar, Json(UserResponse::from(&links))))
}

/// POST /auth/logout - Clear the session cookie.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(expired_cookie(state.config.session.cookie_name.clone()));
    (jar, Json(json!({ "success": true })))
}

/// GET /auth/me - The current user.
async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(UserResponse::new(&auth.user, &auth.principal))
}

/// POST /auth/change-password - Change the current user's password.
async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let hash = check_password_change(
        auth.user.password_hash.as_deref(),
        payload.current_password.as_deref(),
        &payload.new_password,
    )?;
    UserRepository::new(state.conn())
        .set_password(auth.user_id(), &hash)
        .await?;
    info!(user_id = auth.user_id(), "Password changed");

    state
        .notifier
        .dispatch(Notification::PasswordChanged {
            to: auth.user.email.clone(),
            name: auth.user.full_name.clone(),
        })
        .await;

    Ok(Json(json!({ "success": true })))
}

/// GET /auth/sso/login - Redirect to the identity provider.
async fn sso_login(State(state): State<AppState>, jar: CookieJar) -> ApiResult<impl IntoResponse> {
    let sso = state
        .sso
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Single sign-on is not configured"))?;

    let nonce = Uuid::new_v4().simple().to_string();
    let url = sso.authorize_url(&nonce)?;
    let cookie = Cookie::build((SSO_STATE_COOKIE, nonce))
        .path("/")
        .http_only(true)
        .secure(state.config.session.secure)
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(cookie), Redirect::to(&url)))
}

/// GET /auth/callback - Finish single sign-on and set the session cookie.
///
/// Users are matched by email; unknown emails become active users homed in
/// the configured default department of the current year.
async fn sso_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<impl IntoResponse> {
    let sso = state
        .sso
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Single sign-on is not configured"))?;

    if let Some(error) = query.error {
        warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Identity provider returned an error"
        );
        return Err(ApiError::unauthorized("Sign-in was not completed"));
    }

    let expected = jar.get(SSO_STATE_COOKIE).map(|c| c.value().to_string());
    match (expected, query.state) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => return Err(ApiError::unauthorized("Sign-in state mismatch")),
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::validation("Missing authorization code"))?;

    let identity = sso.exchange_code(&code).await?;

    let org = OrganizationRepository::new(state.conn());
    let default_department = match org.find_year(current_year()).await? {
        Some(year) => org
            .find_department_by_name(year.id, &state.config.organization.default_department)
            .await?
            .map(|d| d.id),
        None => None,
    };

    let user_repo = UserRepository::new(state.conn());
    let user = user_repo
        .upsert_sso(&identity.email, &identity.name, default_department)
        .await?;
    let links = user_repo
        .find_with_links(user.id)
        .await?
        .ok_or(outlay_db::repositories::UserError::NotFound(user.id))?;
    if !links.status().can_authenticate() {
        info!(user_id = user.id, "SSO sign-in refused for inactive user");
        return Err(ApiError::unauthorized("This account is not active"));
    }

    let token = state
        .sessions
        .issue(user.id, links.role().as_str())
        .map_err(|e| ApiError::new(500, "SESSION_ERROR", e.to_string()))?;
    user_repo.touch_last_login(user.id).await?;
    info!(user_id = user.id, "User signed in with SSO");

    let jar = jar
        .remove(expired_cookie(SSO_STATE_COOKIE.to_string()))
        .add(session_cookie(&state, token));
    let frontend = state.config.email.frontend_url.clone();
    Ok((jar, Redirect::to(&frontend)))
}
