//! User administration routes.
//!
//! The legacy `is_admin`/`is_manager`/`is_accounting`/`is_hr` booleans are
//! accepted in request bodies and rendered in responses as projections over
//! the single role.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, middleware::AuthUser};
use outlay_core::auth::{hash_password, validate_new_password};
use outlay_core::identity::{LegacyFlag, LegacyFlags, Principal, Role, UserStatus};
use outlay_db::UserRepository;
use outlay_db::entities::users;
use outlay_db::repositories::{CreateUserInput, UpdateUserInput, UserWithLinks};

/// Creates the user routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A user as rendered by the API.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// User ID.
    pub id: i32,
    /// Login name.
    pub username: String,
    /// Email.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Single role.
    pub role: Role,
    /// Account status.
    pub status: String,
    /// Home department.
    pub department_id: Option<i32>,
    /// Managed departments.
    pub managed_department_ids: Vec<i32>,
    /// Managed categories.
    pub managed_category_ids: Vec<i32>,
    /// Derived legacy flags.
    #[serde(flatten)]
    pub flags: LegacyFlags,
    /// Whether a local password is set.
    pub has_password: bool,
    /// Last sign-in.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Created at timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    /// Renders a user with its principal.
    #[must_use]
    pub fn new(user: &users::Model, principal: &Principal) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: principal.role,
            status: user.status.clone(),
            department_id: user.department_id,
            managed_department_ids: principal.managed_department_ids.iter().copied().collect(),
            managed_category_ids: principal.managed_category_ids.iter().copied().collect(),
            flags: principal.role.legacy_flags(),
            has_password: user.password_hash.as_deref().is_some_and(|h| !h.is_empty()),
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

impl From<&UserWithLinks> for UserResponse {
    fn from(links: &UserWithLinks) -> Self {
        Self::new(&links.user, &links.principal())
    }
}

/// Legacy boolean flags as optional request fields.
#[derive(Debug, Default, Deserialize)]
pub struct LegacyFlagsInput {
    /// Sets or clears admin.
    pub is_admin: Option<bool>,
    /// Sets or clears manager.
    pub is_manager: Option<bool>,
    /// Sets or clears accounting.
    pub is_accounting: Option<bool>,
    /// Sets or clears hr.
    pub is_hr: Option<bool>,
}

impl LegacyFlagsInput {
    fn is_empty(&self) -> bool {
        self.is_admin.is_none()
            && self.is_manager.is_none()
            && self.is_accounting.is_none()
            && self.is_hr.is_none()
    }

    /// Applies each supplied flag to `role` in a fixed order.
    fn apply(&self, mut role: Role) -> Role {
        for flag in LegacyFlag::ALL {
            let value = match flag {
                LegacyFlag::Admin => self.is_admin,
                LegacyFlag::Manager => self.is_manager,
                LegacyFlag::Accounting => self.is_accounting,
                LegacyFlag::Hr => self.is_hr,
            };
            if let Some(value) = value {
                role = role.with_flag(flag, value);
            }
        }
        role
    }
}

/// Request body for creating a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Login name.
    pub username: String,
    /// Email.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Initial password; omit for SSO-only accounts.
    pub password: Option<String>,
    /// Role name.
    pub role: Option<String>,
    /// Status name.
    pub status: Option<String>,
    /// Home department.
    pub department_id: Option<i32>,
    /// Legacy flags.
    #[serde(flatten)]
    pub flags: LegacyFlagsInput,
}

/// Request body for updating a user.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    /// Display name.
    pub full_name: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Role name.
    pub role: Option<String>,
    /// Status name.
    pub status: Option<String>,
    /// Home department; `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub department_id: Option<Option<i32>>,
    /// Replaces the managed departments.
    pub managed_department_ids: Option<Vec<i32>>,
    /// Replaces the managed categories.
    pub managed_category_ids: Option<Vec<i32>>,
    /// Legacy flags.
    #[serde(flatten)]
    pub flags: LegacyFlagsInput,
}

/// Distinguishes an absent field from an explicit `null`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_role(s: &str) -> Result<Role, ApiError> {
    Role::parse(s).ok_or_else(|| ApiError::validation(format!("Invalid role: {s}")))
}

fn parse_status(s: &str) -> Result<UserStatus, ApiError> {
    UserStatus::parse(s).ok_or_else(|| ApiError::validation(format!("Invalid status: {s}")))
}

/// Role after an explicit `role` and any legacy flags; `None` when neither is given.
fn resolve_role(
    current: Role,
    role: Option<&str>,
    flags: &LegacyFlagsInput,
) -> Result<Option<Role>, ApiError> {
    if role.is_none() && flags.is_empty() {
        return Ok(None);
    }
    let base = role.map(parse_role).transpose()?.unwrap_or(current);
    Ok(Some(flags.apply(base)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /users - List users (admin).
async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<UserResponse>>> {
    auth.require_admin()?;
    let users = UserRepository::new(state.conn()).list().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

/// GET /users/{id} - Get a user (admin or self).
async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<Json<UserResponse>> {
    auth.require(auth.principal.is_admin() || auth.user_id() == id, "view this user")?;
    let user = UserRepository::new(state.conn())
        .find_with_links(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))?;
    Ok(Json(UserResponse::from(&user)))
}

/// POST /users - Create a user (admin).
async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    auth.require_admin()?;

    let role = resolve_role(Role::User, payload.role.as_deref(), &payload.flags)?
        .unwrap_or_default();
    let status = payload
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?
        .unwrap_or_default();
    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_new_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let repo = UserRepository::new(state.conn());
    let created = repo
        .create(CreateUserInput {
            username: payload.username,
            email: payload.email,
            full_name: payload.full_name,
            password_hash,
            department_id: payload.department_id,
            role,
            status,
        })
        .await?;
    info!(user_id = created.id, created_by = auth.user_id(), role = %role, "User created");

    let links = repo
        .find_with_links(created.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", created.id)))?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&links))))
}

/// PATCH /users/{id} - Update role, status, home department and delegation (admin).
async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    auth.require_admin()?;

    let repo = UserRepository::new(state.conn());
    let existing = repo
        .find_with_links(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))?;

    let role = resolve_role(existing.role(), payload.role.as_deref(), &payload.flags)?;
    let status = payload.status.as_deref().map(parse_status).transpose()?;
    let demotes_self = role.is_some_and(|r| r != Role::Admin)
        || status.is_some_and(|s| !s.can_authenticate());
    if id == auth.user_id() && demotes_self {
        return Err(ApiError::validation("You cannot demote or deactivate yourself"));
    }

    let updated = repo
        .update(
            id,
            UpdateUserInput {
                full_name: payload.full_name,
                email: payload.email,
                role,
                status,
                department_id: payload.department_id,
                managed_department_ids: payload.managed_department_ids,
                managed_category_ids: payload.managed_category_ids,
            },
        )
        .await?;
    info!(user_id = id, updated_by = auth.user_id(), role = %updated.role(), "User updated");
    Ok(Json(UserResponse::from(&updated)))
}

/// DELETE /users/{id} - Delete a user without expenses (admin).
async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    auth.require_admin()?;
    if id == auth.user_id() {
        return Err(ApiError::validation("You cannot delete yourself"));
    }
    UserRepository::new(state.conn()).delete(id).await?;
    info!(user_id = id, deleted_by = auth.user_id(), "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn flags(json: &str) -> LegacyFlagsInput {
        serde_json::from_str(json).unwrap()
    }

    #[rstest]
    #[case(Role::User, None, "{}", None)]
    #[case(Role::User, Some("manager"), "{}", Some(Role::Manager))]
    #[case(Role::User, None, r#"{"is_hr": true}"#, Some(Role::Hr))]
    #[case(Role::Manager, None, r#"{"is_manager": false}"#, Some(Role::User))]
    #[case(Role::Accounting, None, r#"{"is_manager": false}"#, Some(Role::Accounting))]
    #[case(Role::User, Some("manager"), r#"{"is_admin": true}"#, Some(Role::Admin))]
    fn test_resolve_role(
        #[case] current: Role,
        #[case] role: Option<&str>,
        #[case] body: &str,
        #[case] expected: Option<Role>,
    ) {
        assert_eq!(resolve_role(current, role, &flags(body)).unwrap(), expected);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(resolve_role(Role::User, Some("owner"), &LegacyFlagsInput::default()).is_err());
    }

    #[test]
    fn test_department_null_clears() {
        let cleared: UpdateUserRequest = serde_json::from_str(r#"{"department_id": null}"#).unwrap();
        assert_eq!(cleared.department_id, Some(None));

        let absent: UpdateUserRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.department_id, None);
    }

    #[test]
    fn test_response_renders_flags() {
        let principal = Principal::new(1, Role::Accounting);
        let user = users::Model {
            id: 1,
            username: "carol".into(),
            email: "carol@example.com".into(),
            full_name: "Carol".into(),
            password_hash: None,
            department_id: None,
            role: "accounting".into(),
            status: "active".into(),
            last_login_at: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(UserResponse::new(&user, &principal)).unwrap();
        assert_eq!(json["role"], "accounting");
        assert_eq!(json["is_accounting"], true);
        assert_eq!(json["is_admin"], false);
        assert_eq!(json["has_password"], false);
    }
}
