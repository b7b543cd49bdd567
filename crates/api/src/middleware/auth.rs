//! Session-cookie authentication for protected routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;
use outlay_core::identity::Principal;
use outlay_db::UserRepository;
use outlay_db::entities::users;
use outlay_db::repositories::UserWithLinks;
use outlay_shared::jwt::JwtError;

/// Authentication middleware that validates the session cookie.
///
/// The token only names the user; the user and their delegation links are
/// reloaded on every request so role changes and deactivation take effect
/// immediately. Inactive users are treated as not authenticated.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let Some(token) = jar
        .get(&state.config.session.cookie_name)
        .map(|c| c.value().to_string())
    else {
        return ApiError::unauthorized("Login required").into_response();
    };

    let claims = match state.sessions.validate(&token) {
        Ok(claims) => claims,
        Err(JwtError::Expired) => {
            return ApiError::unauthorized("Session has expired").into_response();
        }
        Err(e) => {
            debug!(error = %e, "Rejected session token");
            return ApiError::unauthorized("Invalid session").into_response();
        }
    };

    let user = match UserRepository::new(state.conn())
        .find_with_links(claims.user_id())
        .await
    {
        Ok(Some(user)) if user.status().can_authenticate() => user,
        Ok(_) => return ApiError::unauthorized("Invalid session").into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Extractor for the authenticated user.
///
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     if auth.principal.is_admin() { /* ... */ }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user row.
    pub user: users::Model,
    /// Role and delegation links.
    pub principal: Principal,
}

impl AuthUser {
    /// Returns the user ID.
    #[must_use]
    pub const fn user_id(&self) -> i32 {
        self.user.id
    }

    /// Fails with 403 unless `allowed`.
    ///
    /// # Errors
    ///
    /// Returns a `Forbidden` error carrying `action`.
    pub fn require(&self, allowed: bool, action: &str) -> Result<(), ApiError> {
        if allowed {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!("Not permitted to {action}")))
        }
    }

    /// Fails with 403 unless the user is an admin.
    ///
    /// # Errors
    ///
    /// Returns a `Forbidden` error.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require(self.principal.is_admin(), "perform admin operations")
    }
}

impl From<UserWithLinks> for AuthUser {
    fn from(links: UserWithLinks) -> Self {
        let principal = links.principal();
        Self {
            user: links.user,
            principal,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserWithLinks>()
            .cloned()
            .map(Self::from)
            .ok_or_else(|| ApiError::unauthorized("Login required"))
    }
}
