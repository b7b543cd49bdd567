//! Organization repository: budget years and the department, category and
//! subcategory tree inside each year.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, SqlErr,
    TransactionTrait,
};
use tracing::info;

use outlay_core::identity::{ExpenseScope, StructureScope};
use outlay_core::org::{
    DepartmentCopy, SourceCategory, SourceDepartment, StructureError, plan_copy,
    plan_manager_links, plan_user_migration,
};
use outlay_shared::types::CurrencyCode;

use crate::entities::{
    budget_years, categories, departments, expenses, subcategories, user_managed_categories,
    user_managed_departments, users,
};

/// Error types for organization operations.
#[derive(Debug, thiserror::Error)]
pub enum OrganizationError {
    /// Domain rule violated.
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl OrganizationError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Structure(e) => e.status_code(),
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Structure(e) => e.error_code(),
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

fn not_found(entity: &'static str, id: i32) -> OrganizationError {
    StructureError::NotFound { entity, id }.into()
}

/// Maps a unique-constraint violation to `conflict`, passing other errors through.
fn on_unique_violation(
    err: DbErr,
    conflict: impl FnOnce() -> StructureError,
) -> OrganizationError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => conflict().into(),
        _ => err.into(),
    }
}

/// A category with its subcategories.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    /// The category.
    pub category: categories::Model,
    /// Its subcategories, by name.
    pub subcategories: Vec<subcategories::Model>,
}

/// A department with its subtree.
#[derive(Debug, Clone)]
pub struct DepartmentNode {
    /// The department.
    pub department: departments::Model,
    /// Its categories, by name.
    pub categories: Vec<CategoryNode>,
}

/// Input for updating a department.
#[derive(Debug, Clone, Default)]
pub struct UpdateDepartmentInput {
    /// New name.
    pub name: Option<String>,
    /// New budget.
    pub budget: Option<Decimal>,
    /// New currency.
    pub currency: Option<String>,
}

/// Input for updating a category.
#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryInput {
    /// New name.
    pub name: Option<String>,
    /// New budget.
    pub budget: Option<Decimal>,
    /// New welfare flag.
    pub is_welfare: Option<bool>,
}

/// Input for updating a subcategory.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubcategoryInput {
    /// New name.
    pub name: Option<String>,
    /// New budget.
    pub budget: Option<Decimal>,
}

/// Outcome of a structure copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CopyReport {
    /// Departments created in the target year.
    pub departments_created: usize,
    /// Same-named departments reused.
    pub departments_reused: usize,
    /// Manager links added.
    pub manager_links_added: usize,
    /// Users whose home department moved.
    pub users_migrated: usize,
}

/// Organization repository for the yearly structure.
#[derive(Debug, Clone)]
pub struct OrganizationRepository {
    db: DatabaseConnection,
}

impl OrganizationRepository {
    /// Creates a new organization repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    // ========================================================================
    // Budget years
    // ========================================================================

    /// Lists years, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_years(&self) -> Result<Vec<budget_years::Model>, OrganizationError> {
        Ok(budget_years::Entity::find()
            .order_by_desc(budget_years::Column::Year)
            .all(&self.db)
            .await?)
    }

    /// Finds a year by its integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_year(&self, year: i32) -> Result<Option<budget_years::Model>, OrganizationError> {
        Ok(budget_years::Entity::find()
            .filter(budget_years::Column::Year.eq(year))
            .one(&self.db)
            .await?)
    }

    /// Gets a year by its integer.
    ///
    /// # Errors
    ///
    /// Returns `YearNotFound` if absent.
    pub async fn get_year(&self, year: i32) -> Result<budget_years::Model, OrganizationError> {
        self.find_year(year)
            .await?
            .ok_or_else(|| StructureError::YearNotFound(year).into())
    }

    /// Creates a year.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateYear` if the year exists.
    pub async fn create_year(
        &self,
        year: i32,
        name: Option<String>,
        is_active: bool,
    ) -> Result<budget_years::Model, OrganizationError> {
        if self.find_year(year).await?.is_some() {
            return Err(StructureError::DuplicateYear(year).into());
        }

        let model = budget_years::ActiveModel {
            year: Set(year),
            name: Set(name.unwrap_or_else(|| year.to_string())),
            is_active: Set(is_active),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let created = model
            .insert(&self.db)
            .await
            .map_err(|e| on_unique_violation(e, || StructureError::DuplicateYear(year)))?;
        info!(year, "Budget year created");
        Ok(created)
    }

    /// Updates a year's display name or active flag.
    ///
    /// # Errors
    ///
    /// Returns `YearNotFound` if absent.
    pub async fn update_year(
        &self,
        year: i32,
        name: Option<String>,
        is_active: Option<bool>,
    ) -> Result<budget_years::Model, OrganizationError> {
        let existing = self.get_year(year).await?;
        let mut model: budget_years::ActiveModel = existing.into();
        if let Some(name) = name {
            model.name = Set(name);
        }
        if let Some(active) = is_active {
            model.is_active = Set(active);
        }
        Ok(model.update(&self.db).await?)
    }

    /// Deletes an empty year.
    ///
    /// # Errors
    ///
    /// Returns `StillReferenced` if the year has departments.
    pub async fn delete_year(&self, year: i32) -> Result<(), OrganizationError> {
        let txn = self.db.begin().await?;
        let existing = budget_years::Entity::find()
            .filter(budget_years::Column::Year.eq(year))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(StructureError::YearNotFound(year))?;
        let count = departments::Entity::find()
            .filter(departments::Column::BudgetYearId.eq(existing.id))
            .count(&txn)
            .await?;
        if count > 0 {
            return Err(StructureError::StillReferenced {
                entity: "budget year",
                id: year,
                dependents: "departments",
            }
            .into());
        }

        budget_years::Entity::delete_by_id(existing.id)
            .exec(&txn)
            .await?;
        txn.commit().await?;
        info!(year, "Budget year deleted");
        Ok(())
    }

    // ========================================================================
    // Departments
    // ========================================================================

    /// Lists a year's departments by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_departments(
        &self,
        budget_year_id: i32,
    ) -> Result<Vec<departments::Model>, OrganizationError> {
        Ok(departments::Entity::find()
            .filter(departments::Column::BudgetYearId.eq(budget_year_id))
            .order_by_asc(departments::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Gets a department by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get_department(&self, id: i32) -> Result<departments::Model, OrganizationError> {
        departments::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("department", id))
    }

    /// Finds a department by name within a year.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_department_by_name(
        &self,
        budget_year_id: i32,
        name: &str,
    ) -> Result<Option<departments::Model>, OrganizationError> {
        Ok(departments::Entity::find()
            .filter(departments::Column::BudgetYearId.eq(budget_year_id))
            .filter(departments::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    /// Creates a department.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateDepartment` if the name is taken in this year, or
    /// `InvalidInput` for a bad name, budget or currency.
    pub async fn create_department(
        &self,
        budget_year_id: i32,
        name: &str,
        budget: Decimal,
        currency: &str,
    ) -> Result<departments::Model, OrganizationError> {
        validate_name(name)?;
        validate_budget(budget)?;
        let currency = validate_currency(currency)?;
        budget_years::Entity::find_by_id(budget_year_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("budget year", budget_year_id))?;
        if self
            .find_department_by_name(budget_year_id, name)
            .await?
            .is_some()
        {
            return Err(StructureError::DuplicateDepartment {
                name: name.to_string(),
            }
            .into());
        }

        let created = insert_department(&self.db, budget_year_id, name, budget, currency.as_str())
            .await
            .map_err(|e| {
                on_unique_violation(e, || StructureError::DuplicateDepartment {
                    name: name.to_string(),
                })
            })?;
        info!(department_id = created.id, budget_year_id, "Department created");
        Ok(created)
    }

    /// Updates a department.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `DuplicateDepartment` or `InvalidInput`.
    pub async fn update_department(
        &self,
        id: i32,
        input: UpdateDepartmentInput,
    ) -> Result<departments::Model, OrganizationError> {
        let existing = self.get_department(id).await?;
        let year_id = existing.budget_year_id;
        let mut name_for_conflict = existing.name.clone();
        let mut model: departments::ActiveModel = existing.into();

        if let Some(name) = input.name {
            validate_name(&name)?;
            if let Some(other) = self.find_department_by_name(year_id, &name).await?
                && other.id != id
            {
                return Err(StructureError::DuplicateDepartment { name }.into());
            }
            name_for_conflict.clone_from(&name);
            model.name = Set(name);
        }
        if let Some(budget) = input.budget {
            validate_budget(budget)?;
            model.budget = Set(budget);
        }
        if let Some(currency) = input.currency {
            model.currency = Set(validate_currency(&currency)?.into());
        }
        model.update(&self.db).await.map_err(|e| {
            on_unique_violation(e, || StructureError::DuplicateDepartment {
                name: name_for_conflict,
            })
        })
    }

    /// Deletes a department with no categories and no home users, pruning
    /// manager links.
    ///
    /// # Errors
    ///
    /// Returns `StillReferenced` if anything still points at it.
    pub async fn delete_department(&self, id: i32) -> Result<(), OrganizationError> {
        let txn = self.db.begin().await?;
        departments::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found("department", id))?;

        let category_count = categories::Entity::find()
            .filter(categories::Column::DepartmentId.eq(id))
            .count(&txn)
            .await?;
        if category_count > 0 {
            return Err(StructureError::StillReferenced {
                entity: "department",
                id,
                dependents: "categories",
            }
            .into());
        }
        let user_count = users::Entity::find()
            .filter(users::Column::DepartmentId.eq(id))
            .count(&txn)
            .await?;
        if user_count > 0 {
            return Err(StructureError::StillReferenced {
                entity: "department",
                id,
                dependents: "users",
            }
            .into());
        }

        user_managed_departments::Entity::delete_many()
            .filter(user_managed_departments::Column::DepartmentId.eq(id))
            .exec(&txn)
            .await?;
        departments::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(department_id = id, "Department deleted");
        Ok(())
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Gets a category by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get_category(&self, id: i32) -> Result<categories::Model, OrganizationError> {
        categories::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("category", id))
    }

    /// Creates a category.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the department is missing.
    pub async fn create_category(
        &self,
        department_id: i32,
        name: &str,
        budget: Decimal,
        is_welfare: bool,
    ) -> Result<categories::Model, OrganizationError> {
        validate_name(name)?;
        validate_budget(budget)?;
        self.get_department(department_id).await?;

        let created = insert_category(&self.db, department_id, name, budget, is_welfare).await?;
        info!(category_id = created.id, department_id, "Category created");
        Ok(created)
    }

    /// Updates a category.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn update_category(
        &self,
        id: i32,
        input: UpdateCategoryInput,
    ) -> Result<categories::Model, OrganizationError> {
        let mut model: categories::ActiveModel = self.get_category(id).await?.into();
        if let Some(name) = input.name {
            validate_name(&name)?;
            model.name = Set(name);
        }
        if let Some(budget) = input.budget {
            validate_budget(budget)?;
            model.budget = Set(budget);
        }
        if let Some(is_welfare) = input.is_welfare {
            model.is_welfare = Set(is_welfare);
        }
        Ok(model.update(&self.db).await?)
    }

    /// Deletes a category with no subcategories, pruning manager links.
    ///
    /// # Errors
    ///
    /// Returns `StillReferenced` if it has subcategories.
    pub async fn delete_category(&self, id: i32) -> Result<(), OrganizationError> {
        let txn = self.db.begin().await?;
        categories::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found("category", id))?;
        let count = subcategories::Entity::find()
            .filter(subcategories::Column::CategoryId.eq(id))
            .count(&txn)
            .await?;
        if count > 0 {
            return Err(StructureError::StillReferenced {
                entity: "category",
                id,
                dependents: "subcategories",
            }
            .into());
        }

        user_managed_categories::Entity::delete_many()
            .filter(user_managed_categories::Column::CategoryId.eq(id))
            .exec(&txn)
            .await?;
        categories::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(category_id = id, "Category deleted");
        Ok(())
    }

    /// Welfare categories of a year, with their departments.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_welfare_categories(
        &self,
        budget_year_id: i32,
    ) -> Result<Vec<(categories::Model, departments::Model)>, OrganizationError> {
        let rows = categories::Entity::find()
            .find_also_related(departments::Entity)
            .filter(categories::Column::IsWelfare.eq(true))
            .filter(departments::Column::BudgetYearId.eq(budget_year_id))
            .order_by_asc(departments::Column::Name)
            .order_by_asc(categories::Column::Name)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(cat, dept)| dept.map(|d| (cat, d)))
            .collect())
    }

    /// Departments owning the given categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn departments_of_categories(
        &self,
        category_ids: &[i32],
    ) -> Result<Vec<i32>, OrganizationError> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = categories::Entity::find()
            .select_only()
            .column(categories::Column::DepartmentId)
            .filter(categories::Column::Id.is_in(category_ids.iter().copied()))
            .distinct()
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    // ========================================================================
    // Subcategories
    // ========================================================================

    /// Gets a subcategory by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get_subcategory(
        &self,
        id: i32,
    ) -> Result<subcategories::Model, OrganizationError> {
        subcategories::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("subcategory", id))
    }

    /// Department and category a subcategory sits under.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the subcategory is missing.
    pub async fn scope_of_subcategory(
        &self,
        subcategory_id: i32,
    ) -> Result<ExpenseScope, OrganizationError> {
        let row: Option<(i32, i32)> = subcategories::Entity::find()
            .select_only()
            .column_as(categories::Column::DepartmentId, "department_id")
            .column_as(categories::Column::Id, "category_id")
            .join(
                JoinType::InnerJoin,
                subcategories::Relation::Categories.def(),
            )
            .filter(subcategories::Column::Id.eq(subcategory_id))
            .into_tuple()
            .one(&self.db)
            .await?;

        row.map(|(department_id, category_id)| ExpenseScope {
            department_id,
            category_id,
        })
        .ok_or_else(|| not_found("subcategory", subcategory_id))
    }

    /// Creates a subcategory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the category is missing.
    pub async fn create_subcategory(
        &self,
        category_id: i32,
        name: &str,
        budget: Decimal,
    ) -> Result<subcategories::Model, OrganizationError> {
        validate_name(name)?;
        validate_budget(budget)?;
        self.get_category(category_id).await?;

        let created = insert_subcategory(&self.db, category_id, name, budget).await?;
        info!(subcategory_id = created.id, category_id, "Subcategory created");
        Ok(created)
    }

    /// Updates a subcategory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn update_subcategory(
        &self,
        id: i32,
        input: UpdateSubcategoryInput,
    ) -> Result<subcategories::Model, OrganizationError> {
        let mut model: subcategories::ActiveModel = self.get_subcategory(id).await?.into();
        if let Some(name) = input.name {
            validate_name(&name)?;
            model.name = Set(name);
        }
        if let Some(budget) = input.budget {
            validate_budget(budget)?;
            model.budget = Set(budget);
        }
        Ok(model.update(&self.db).await?)
    }

    /// Deletes a subcategory with no expenses.
    ///
    /// # Errors
    ///
    /// Returns `StillReferenced` if it has expenses.
    pub async fn delete_subcategory(&self, id: i32) -> Result<(), OrganizationError> {
        let txn = self.db.begin().await?;
        subcategories::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| not_found("subcategory", id))?;
        let count = expenses::Entity::find()
            .filter(expenses::Column::SubcategoryId.eq(id))
            .count(&txn)
            .await?;
        if count > 0 {
            return Err(StructureError::StillReferenced {
                entity: "subcategory",
                id,
                dependents: "expenses",
            }
            .into());
        }

        subcategories::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        info!(subcategory_id = id, "Subcategory deleted");
        Ok(())
    }

    // ========================================================================
    // Structure tree
    // ========================================================================

    /// Loads a year's tree restricted to `scope`, in three queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load_structure(
        &self,
        budget_year_id: i32,
        scope: &StructureScope,
    ) -> Result<Vec<DepartmentNode>, OrganizationError> {
        load_tree(&self.db, budget_year_id, scope).await
    }

    // ========================================================================
    // Copy and migrate
    // ========================================================================

    /// Copies the source year's structure into the target year in one
    /// transaction, optionally moving users' home departments.
    ///
    /// Same-named departments in the target are reused and nothing is copied
    /// below them, so a second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SameYear`, `YearNotFound`, or a database error; any failure
    /// rolls back every step.
    pub async fn copy_structure(
        &self,
        source_year: i32,
        target_year: i32,
        migrate_users: bool,
    ) -> Result<CopyReport, OrganizationError> {
        if source_year == target_year {
            return Err(StructureError::SameYear.into());
        }
        let source = self.get_year(source_year).await?;
        let target = self.get_year(target_year).await?;

        let txn = self.db.begin().await?;

        let source_tree = load_tree(&txn, source.id, &StructureScope::All).await?;
        let source_departments: Vec<SourceDepartment> =
            source_tree.iter().map(to_source_department).collect();
        let target_by_name = department_names(&txn, target.id).await?;

        let plan = plan_copy(&source_departments, &target_by_name);
        let mut report = CopyReport::default();
        let mut department_map = HashMap::new();

        for step in &plan.departments {
            match step {
                DepartmentCopy::Reuse {
                    source_id,
                    target_id,
                } => {
                    department_map.insert(*source_id, *target_id);
                    report.departments_reused += 1;
                }
                DepartmentCopy::Create {
                    source_id,
                    name,
                    currency,
                    categories,
                } => {
                    let dept =
                        insert_department(&txn, target.id, name, Decimal::ZERO, currency).await?;
                    for category in categories {
                        let cat = insert_category(
                            &txn,
                            dept.id,
                            &category.name,
                            Decimal::ZERO,
                            category.is_welfare,
                        )
                        .await?;
                        for sub in &category.subcategories {
                            insert_subcategory(&txn, cat.id, sub, Decimal::ZERO).await?;
                        }
                    }
                    department_map.insert(*source_id, dept.id);
                    report.departments_created += 1;
                }
            }
        }

        let source_ids: Vec<i32> = department_map.keys().copied().collect();
        let target_ids: Vec<i32> = department_map.values().copied().collect();

        let source_links = manager_links(&txn, &source_ids).await?;
        let existing: HashSet<(i32, i32)> =
            manager_links(&txn, &target_ids).await?.into_iter().collect();
        let new_links = plan_manager_links(&source_links, &department_map, &existing);
        for (user_id, department_id) in &new_links {
            user_managed_departments::ActiveModel {
                user_id: Set(*user_id),
                department_id: Set(*department_id),
            }
            .insert(&txn)
            .await?;
        }
        report.manager_links_added = new_links.len();

        if migrate_users {
            report.users_migrated = move_users(&txn, &source_ids, &department_map).await?;
        }

        txn.commit().await?;
        info!(
            source_year,
            target_year,
            created = report.departments_created,
            reused = report.departments_reused,
            links = report.manager_links_added,
            users = report.users_migrated,
            "Structure copied"
        );
        Ok(report)
    }

    /// Moves users homed in the source year to the same-named department of
    /// the target year. Departments without a counterpart are skipped.
    ///
    /// # Errors
    ///
    /// Returns `SameYear`, `YearNotFound`, or a database error.
    pub async fn migrate_users(
        &self,
        source_year: i32,
        target_year: i32,
    ) -> Result<usize, OrganizationError> {
        if source_year == target_year {
            return Err(StructureError::SameYear.into());
        }
        let source = self.get_year(source_year).await?;
        let target = self.get_year(target_year).await?;

        let txn = self.db.begin().await?;
        let source_by_name = department_names(&txn, source.id).await?;
        let target_by_name = department_names(&txn, target.id).await?;
        let department_map: HashMap<i32, i32> = source_by_name
            .iter()
            .filter_map(|(name, src)| target_by_name.get(name).map(|tgt| (*src, *tgt)))
            .collect();
        let source_ids: Vec<i32> = department_map.keys().copied().collect();

        let moved = move_users(&txn, &source_ids, &department_map).await?;
        txn.commit().await?;

        info!(source_year, target_year, users = moved, "Users migrated");
        Ok(moved)
    }
}

fn validate_name(name: &str) -> Result<(), StructureError> {
    if name.trim().is_empty() {
        return Err(StructureError::InvalidInput("name is required".to_string()));
    }
    Ok(())
}

fn validate_budget(budget: Decimal) -> Result<(), StructureError> {
    if budget < Decimal::ZERO {
        return Err(StructureError::InvalidInput(
            "budget cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_currency(code: &str) -> Result<CurrencyCode, StructureError> {
    code.parse::<CurrencyCode>()
        .map_err(StructureError::InvalidInput)
}

fn to_source_department(node: &DepartmentNode) -> SourceDepartment {
    SourceDepartment {
        id: node.department.id,
        name: node.department.name.clone(),
        currency: node.department.currency.clone(),
        categories: node
            .categories
            .iter()
            .map(|c| SourceCategory {
                name: c.category.name.clone(),
                is_welfare: c.category.is_welfare,
                subcategories: c.subcategories.iter().map(|s| s.name.clone()).collect(),
            })
            .collect(),
    }
}

async fn insert_department<C: ConnectionTrait>(
    db: &C,
    budget_year_id: i32,
    name: &str,
    budget: Decimal,
    currency: &str,
) -> Result<departments::Model, DbErr> {
    departments::ActiveModel {
        budget_year_id: Set(budget_year_id),
        name: Set(name.to_string()),
        budget: Set(budget),
        currency: Set(currency.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

async fn insert_category<C: ConnectionTrait>(
    db: &C,
    department_id: i32,
    name: &str,
    budget: Decimal,
    is_welfare: bool,
) -> Result<categories::Model, DbErr> {
    categories::ActiveModel {
        department_id: Set(department_id),
        name: Set(name.to_string()),
        budget: Set(budget),
        is_welfare: Set(is_welfare),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

async fn insert_subcategory<C: ConnectionTrait>(
    db: &C,
    category_id: i32,
    name: &str,
    budget: Decimal,
) -> Result<subcategories::Model, DbErr> {
    subcategories::ActiveModel {
        category_id: Set(category_id),
        name: Set(name.to_string()),
        budget: Set(budget),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

async fn department_names<C: ConnectionTrait>(
    db: &C,
    budget_year_id: i32,
) -> Result<HashMap<String, i32>, DbErr> {
    let rows: Vec<(i32, String)> = departments::Entity::find()
        .select_only()
        .column(departments::Column::Id)
        .column(departments::Column::Name)
        .filter(departments::Column::BudgetYearId.eq(budget_year_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
}

async fn manager_links<C: ConnectionTrait>(
    db: &C,
    department_ids: &[i32],
) -> Result<Vec<(i32, i32)>, DbErr> {
    if department_ids.is_empty() {
        return Ok(Vec::new());
    }
    user_managed_departments::Entity::find()
        .select_only()
        .column(user_managed_departments::Column::UserId)
        .column(user_managed_departments::Column::DepartmentId)
        .filter(user_managed_departments::Column::DepartmentId.is_in(department_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await
}

async fn move_users<C: ConnectionTrait>(
    db: &C,
    source_department_ids: &[i32],
    department_map: &HashMap<i32, i32>,
) -> Result<usize, DbErr> {
    if source_department_ids.is_empty() {
        return Ok(0);
    }
    let homes: Vec<(i32, Option<i32>)> = users::Entity::find()
        .select_only()
        .column(users::Column::Id)
        .column(users::Column::DepartmentId)
        .filter(users::Column::DepartmentId.is_in(source_department_ids.iter().copied()))
        .into_tuple()
        .all(db)
        .await?;
    let homes: Vec<(i32, i32)> = homes
        .into_iter()
        .filter_map(|(user, home)| home.map(|h| (user, h)))
        .collect();

    let moves = plan_user_migration(&homes, department_map);
    for (user_id, target) in &moves {
        users::ActiveModel {
            id: Set(*user_id),
            department_id: Set(Some(*target)),
            ..Default::default()
        }
        .update(db)
        .await?;
    }
    Ok(moves.len())
}

async fn load_tree<C: ConnectionTrait>(
    db: &C,
    budget_year_id: i32,
    scope: &StructureScope,
) -> Result<Vec<DepartmentNode>, OrganizationError> {
    let depts: Vec<departments::Model> = departments::Entity::find()
        .filter(departments::Column::BudgetYearId.eq(budget_year_id))
        .order_by_asc(departments::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .filter(|d| scope.includes(d.id))
        .collect();
    if depts.is_empty() {
        return Ok(Vec::new());
    }

    let dept_ids: Vec<i32> = depts.iter().map(|d| d.id).collect();
    let cats = categories::Entity::find()
        .filter(categories::Column::DepartmentId.is_in(dept_ids))
        .order_by_asc(categories::Column::Name)
        .all(db)
        .await?;

    let cat_ids: Vec<i32> = cats.iter().map(|c| c.id).collect();
    let subs = if cat_ids.is_empty() {
        Vec::new()
    } else {
        subcategories::Entity::find()
            .filter(subcategories::Column::CategoryId.is_in(cat_ids))
            .order_by_asc(subcategories::Column::Name)
            .all(db)
            .await?
    };

    let mut subs_by_cat: HashMap<i32, Vec<subcategories::Model>> = HashMap::new();
    for sub in subs {
        subs_by_cat.entry(sub.category_id).or_default().push(sub);
    }
    let mut cats_by_dept: HashMap<i32, Vec<CategoryNode>> = HashMap::new();
    for category in cats {
        let subcategories = subs_by_cat.remove(&category.id).unwrap_or_default();
        cats_by_dept
            .entry(category.department_id)
            .or_default()
            .push(CategoryNode {
                category,
                subcategories,
            });
    }

    Ok(depts
        .into_iter()
        .map(|department| DepartmentNode {
            categories: cats_by_dept.remove(&department.id).unwrap_or_default(),
            department,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ILS", "ILS")]
    #[case(" usd ", "USD")]
    fn test_department_currency_accepted(#[case] input: &str, #[case] stored: &str) {
        assert_eq!(validate_currency(input).unwrap().as_str(), stored);
    }

    #[rstest]
    #[case("ILSX")]
    #[case("IL")]
    #[case("12$")]
    #[case("")]
    fn test_department_currency_rejected(#[case] input: &str) {
        let err = validate_currency(input).unwrap_err();
        assert!(matches!(err, StructureError::InvalidInput(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_other_db_errors_pass_through() {
        let err = on_unique_violation(DbErr::Custom("boom".into()), || {
            StructureError::DuplicateYear(2026)
        });
        assert!(matches!(err, OrganizationError::Database(_)));
        assert_eq!(err.status_code(), 500);
    }
}
