//! User repository for database operations.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, Func},
};
use tracing::info;

use outlay_core::identity::{Principal, Role, UserStatus};

use crate::entities::{expenses, user_managed_categories, user_managed_departments, users};

/// Error types for user operations.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// User not found.
    #[error("User not found: {0}")]
    NotFound(i32),

    /// Username already taken.
    #[error("Username '{0}' already exists")]
    DuplicateUsername(String),

    /// Email already registered.
    #[error("Email '{0}' already exists")]
    DuplicateEmail(String),

    /// User still owns expenses.
    #[error("User {0} has expenses and cannot be deleted")]
    HasExpenses(i32),

    /// Invalid field value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl UserError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::DuplicateUsername(_) | Self::DuplicateEmail(_) | Self::HasExpenses(_) => 409,
            Self::InvalidInput(_) => 400,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "USER_NOT_FOUND",
            Self::DuplicateUsername(_) => "DUPLICATE_USERNAME",
            Self::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            Self::HasExpenses(_) => "USER_HAS_EXPENSES",
            Self::InvalidInput(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// A user with delegated-approval links.
#[derive(Debug, Clone)]
pub struct UserWithLinks {
    /// The user record.
    pub user: users::Model,
    /// Managed departments.
    pub managed_department_ids: BTreeSet<i32>,
    /// Managed categories.
    pub managed_category_ids: BTreeSet<i32>,
}

impl UserWithLinks {
    /// Parsed role; unknown values fall back to `user`.
    #[must_use]
    pub fn role(&self) -> Role {
        Role::parse(&self.user.role).unwrap_or_default()
    }

    /// Parsed status; unknown values are treated as inactive.
    #[must_use]
    pub fn status(&self) -> UserStatus {
        UserStatus::parse(&self.user.status).unwrap_or(UserStatus::Inactive)
    }

    /// Builds the permission principal.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user.id,
            role: self.role(),
            home_department_id: self.user.department_id,
            managed_department_ids: self.managed_department_ids.clone(),
            managed_category_ids: self.managed_category_ids.clone(),
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Argon2 hash; `None` for SSO-only accounts.
    pub password_hash: Option<String>,
    /// Home department.
    pub department_id: Option<i32>,
    /// Role.
    pub role: Role,
    /// Status.
    pub status: UserStatus,
}

/// Input for updating a user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    /// Display name.
    pub full_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Role.
    pub role: Option<Role>,
    /// Status.
    pub status: Option<UserStatus>,
    /// Home department; `Some(None)` clears it.
    pub department_id: Option<Option<i32>>,
    /// Replaces the managed departments.
    pub managed_department_ids: Option<Vec<i32>>,
    /// Replaces the managed categories.
    pub managed_category_ids: Option<Vec<i32>>,
}

/// User repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: i32) -> Result<Option<users::Model>, UserError> {
        Ok(users::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Finds a user by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>, UserError> {
        Ok(users::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Email)))
                    .eq(email.trim().to_lowercase()),
            )
            .one(&self.db)
            .await?)
    }

    /// Finds a user by username or email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_login(&self, login: &str) -> Result<Option<users::Model>, UserError> {
        let login = login.trim();
        if let Some(user) = users::Entity::find()
            .filter(users::Column::Username.eq(login))
            .one(&self.db)
            .await?
        {
            return Ok(Some(user));
        }
        self.find_by_email(login).await
    }

    /// Loads a user with their managed links.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_with_links(&self, id: i32) -> Result<Option<UserWithLinks>, UserError> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut loaded = load_links(&self.db, vec![user]).await?;
        Ok(loaded.pop())
    }

    /// Lists all users with their links, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<UserWithLinks>, UserError> {
        let users = users::Entity::find()
            .order_by_asc(users::Column::FullName)
            .order_by_asc(users::Column::Username)
            .all(&self.db)
            .await?;
        Ok(load_links(&self.db, users).await?)
    }

    /// Users by id, for resolving display names.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_many(&self, ids: &[i32]) -> Result<HashMap<i32, users::Model>, UserError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = users::Entity::find()
            .filter(users::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|u| (u.id, u)).collect())
    }

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateUsername` or `DuplicateEmail` on conflicts.
    pub async fn create(&self, input: CreateUserInput) -> Result<users::Model, UserError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        if username.is_empty() {
            return Err(UserError::InvalidInput("username is required".to_string()));
        }
        if !email.contains('@') {
            return Err(UserError::InvalidInput("email is invalid".to_string()));
        }
        self.ensure_unique(&username, &email, None).await?;

        let user = users::ActiveModel {
            username: Set(username),
            email: Set(email),
            full_name: Set(input.full_name),
            password_hash: Set(input.password_hash),
            department_id: Set(input.department_id),
            role: Set(input.role.as_str().to_string()),
            status: Set(input.status.as_str().to_string()),
            last_login_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    /// Updates a user and, when given, replaces their managed links.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `DuplicateEmail`.
    pub async fn update(&self, id: i32, input: UpdateUserInput) -> Result<UserWithLinks, UserError> {
        let existing = self.find_by_id(id).await?.ok_or(UserError::NotFound(id))?;
        if let Some(email) = &input.email {
            self.ensure_unique(&existing.username, &email.trim().to_lowercase(), Some(id))
                .await?;
        }

        let txn = self.db.begin().await?;
        let mut model: users::ActiveModel = existing.into();
        if let Some(full_name) = input.full_name {
            model.full_name = Set(full_name);
        }
        if let Some(email) = input.email {
            model.email = Set(email.trim().to_lowercase());
        }
        if let Some(role) = input.role {
            model.role = Set(role.as_str().to_string());
        }
        if let Some(status) = input.status {
            model.status = Set(status.as_str().to_string());
        }
        if let Some(department_id) = input.department_id {
            model.department_id = Set(department_id);
        }
        let updated = model.update(&txn).await?;

        if let Some(ids) = input.managed_department_ids {
            user_managed_departments::Entity::delete_many()
                .filter(user_managed_departments::Column::UserId.eq(id))
                .exec(&txn)
                .await?;
            for department_id in ids.into_iter().collect::<BTreeSet<_>>() {
                user_managed_departments::ActiveModel {
                    user_id: Set(id),
                    department_id: Set(department_id),
                }
                .insert(&txn)
                .await?;
            }
        }
        if let Some(ids) = input.managed_category_ids {
            user_managed_categories::Entity::delete_many()
                .filter(user_managed_categories::Column::UserId.eq(id))
                .exec(&txn)
                .await?;
            for category_id in ids.into_iter().collect::<BTreeSet<_>>() {
                user_managed_categories::ActiveModel {
                    user_id: Set(id),
                    category_id: Set(category_id),
                }
                .insert(&txn)
                .await?;
            }
        }
        txn.commit().await?;

        info!(user_id = id, role = %updated.role, status = %updated.status, "User updated");
        let mut loaded = load_links(&self.db, vec![updated]).await?;
        loaded.pop().ok_or(UserError::NotFound(id))
    }

    /// Deletes a user with no expenses, pruning managed links.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `HasExpenses`.
    pub async fn delete(&self, id: i32) -> Result<(), UserError> {
        self.find_by_id(id).await?.ok_or(UserError::NotFound(id))?;

        let referencing = expenses::Entity::find()
            .filter(
                Condition::any()
                    .add(expenses::Column::UserId.eq(id))
                    .add(expenses::Column::HandlerId.eq(id))
                    .add(expenses::Column::PaidById.eq(id))
                    .add(expenses::Column::ExternalEntryById.eq(id)),
            )
            .count(&self.db)
            .await?;
        if referencing > 0 {
            return Err(UserError::HasExpenses(id));
        }

        let txn = self.db.begin().await?;
        user_managed_departments::Entity::delete_many()
            .filter(user_managed_departments::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user_managed_categories::Entity::delete_many()
            .filter(user_managed_categories::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        users::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(user_id = id, "User deleted");
        Ok(())
    }

    /// Stores a new password hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_password(&self, id: i32, password_hash: &str) -> Result<(), UserError> {
        users::ActiveModel {
            id: Set(id),
            password_hash: Set(Some(password_hash.to_string())),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        info!(user_id = id, "Password changed");
        Ok(())
    }

    /// Records a successful login.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn touch_last_login(&self, id: i32) -> Result<(), UserError> {
        users::ActiveModel {
            id: Set(id),
            last_login_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    /// Active approvers for an expense scope: managers linked to the
    /// department or the category.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn approvers_for(
        &self,
        department_id: i32,
        category_id: i32,
    ) -> Result<Vec<users::Model>, UserError> {
        let by_department: Vec<i32> = user_managed_departments::Entity::find()
            .select_only()
            .column(user_managed_departments::Column::UserId)
            .filter(user_managed_departments::Column::DepartmentId.eq(department_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        let by_category: Vec<i32> = user_managed_categories::Entity::find()
            .select_only()
            .column(user_managed_categories::Column::UserId)
            .filter(user_managed_categories::Column::CategoryId.eq(category_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let ids: BTreeSet<i32> = by_department.into_iter().chain(by_category).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(users::Entity::find()
            .filter(users::Column::Id.is_in(ids))
            .filter(users::Column::Role.eq(Role::Manager.as_str()))
            .filter(users::Column::Status.eq(UserStatus::Active.as_str()))
            .all(&self.db)
            .await?)
    }

    /// Finds the user for an SSO identity, creating an active one in
    /// `default_department_id` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_sso(
        &self,
        email: &str,
        full_name: &str,
        default_department_id: Option<i32>,
    ) -> Result<users::Model, UserError> {
        if let Some(user) = self.find_by_email(email).await? {
            return Ok(user);
        }

        let base = email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let mut username = base.clone();
        let mut suffix = 1;
        while users::Entity::find()
            .filter(users::Column::Username.eq(&username))
            .count(&self.db)
            .await?
            > 0
        {
            suffix += 1;
            username = format!("{base}{suffix}");
        }

        self.create(CreateUserInput {
            username,
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: None,
            department_id: default_department_id,
            role: Role::User,
            status: UserStatus::Active,
        })
        .await
    }

    async fn ensure_unique(
        &self,
        username: &str,
        email: &str,
        except: Option<i32>,
    ) -> Result<(), UserError> {
        let mut by_name = users::Entity::find().filter(users::Column::Username.eq(username));
        let mut by_email = users::Entity::find().filter(
            Expr::expr(Func::lower(Expr::col(users::Column::Email))).eq(email.to_string()),
        );
        if let Some(id) = except {
            by_name = by_name.filter(users::Column::Id.ne(id));
            by_email = by_email.filter(users::Column::Id.ne(id));
        }

        if by_name.count(&self.db).await? > 0 {
            return Err(UserError::DuplicateUsername(username.to_string()));
        }
        if by_email.count(&self.db).await? > 0 {
            return Err(UserError::DuplicateEmail(email.to_string()));
        }
        Ok(())
    }
}

async fn load_links<C: ConnectionTrait>(
    db: &C,
    users: Vec<users::Model>,
) -> Result<Vec<UserWithLinks>, DbErr> {
    let ids: Vec<i32> = users.iter().map(|u| u.id).collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let dept_links: Vec<(i32, i32)> = user_managed_departments::Entity::find()
        .select_only()
        .column(user_managed_departments::Column::UserId)
        .column(user_managed_departments::Column::DepartmentId)
        .filter(user_managed_departments::Column::UserId.is_in(ids.clone()))
        .into_tuple()
        .all(db)
        .await?;
    let cat_links: Vec<(i32, i32)> = user_managed_categories::Entity::find()
        .select_only()
        .column(user_managed_categories::Column::UserId)
        .column(user_managed_categories::Column::CategoryId)
        .filter(user_managed_categories::Column::UserId.is_in(ids))
        .into_tuple()
        .all(db)
        .await?;

    let mut depts: HashMap<i32, BTreeSet<i32>> = HashMap::new();
    for (user, dept) in dept_links {
        depts.entry(user).or_default().insert(dept);
    }
    let mut cats: HashMap<i32, BTreeSet<i32>> = HashMap::new();
    for (user, cat) in cat_links {
        cats.entry(user).or_default().insert(cat);
    }

    Ok(users
        .into_iter()
        .map(|user| UserWithLinks {
            managed_department_ids: depts.remove(&user.id).unwrap_or_default(),
            managed_category_ids: cats.remove(&user.id).unwrap_or_default(),
            user,
        })
        .collect())
}
