//! Supplier registry.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, Func},
};
use serde::Deserialize;
use tracing::info;

use crate::entities::{expenses, suppliers};

const ACTIVE: &str = "active";
const INACTIVE: &str = "inactive";

/// Error types for supplier operations.
#[derive(Debug, thiserror::Error)]
pub enum SupplierError {
    /// Supplier not found.
    #[error("Supplier not found: {0}")]
    NotFound(i32),

    /// Name is required.
    #[error("Supplier name is required")]
    NameRequired,

    /// Unknown status value.
    #[error("Invalid supplier status: {0}")]
    InvalidStatus(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl SupplierError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::NameRequired | Self::InvalidStatus(_) => 400,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "SUPPLIER_NOT_FOUND",
            Self::NameRequired | Self::InvalidStatus(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Supplier fields accepted on create and update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplierInput {
    /// Supplier name.
    pub name: String,
    /// Contact person.
    pub contact_person: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Tax identifier.
    pub tax_id: Option<String>,
    /// Bank name.
    pub bank_name: Option<String>,
    /// Bank account number.
    pub bank_account_number: Option<String>,
    /// Bank branch.
    pub bank_branch: Option<String>,
    /// SWIFT code.
    pub swift_code: Option<String>,
    /// IBAN.
    pub iban: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// `active` or `inactive`; defaults to active.
    pub status: Option<String>,
}

/// What a delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplierRemoval {
    /// Row removed.
    Deleted,
    /// Referenced by expenses; marked inactive instead.
    Deactivated,
}

/// Supplier repository.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    db: DatabaseConnection,
}

impl SupplierRepository {
    /// Creates a new supplier repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Lists suppliers by name, optionally including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<suppliers::Model>, SupplierError> {
        let mut query = suppliers::Entity::find().order_by_asc(suppliers::Column::Name);
        if !include_inactive {
            query = query.filter(suppliers::Column::Status.eq(ACTIVE));
        }
        Ok(query.all(&self.db).await?)
    }

    /// Case-insensitive substring search over name and tax id, active only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search(&self, term: &str, limit: u64) -> Result<Vec<suppliers::Model>, SupplierError> {
        let pattern = format!("%{}%", escape_like(&term.trim().to_lowercase()));
        Ok(suppliers::Entity::find()
            .filter(suppliers::Column::Status.eq(ACTIVE))
            .filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(suppliers::Column::Name))).like(&pattern))
                    .add(Expr::expr(Func::lower(Expr::col(suppliers::Column::TaxId))).like(&pattern)),
            )
            .order_by_asc(suppliers::Column::Name)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Gets a supplier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get(&self, id: i32) -> Result<suppliers::Model, SupplierError> {
        suppliers::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(SupplierError::NotFound(id))
    }

    /// Creates a supplier.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name or unknown status.
    pub async fn create(&self, input: SupplierInput) -> Result<suppliers::Model, SupplierError> {
        let status = validate(&input)?;
        let supplier = suppliers::ActiveModel {
            name: Set(input.name.trim().to_string()),
            contact_person: Set(input.contact_person),
            email: Set(input.email),
            phone: Set(input.phone),
            address: Set(input.address),
            tax_id: Set(input.tax_id),
            bank_name: Set(input.bank_name),
            bank_account_number: Set(input.bank_account_number),
            bank_branch: Set(input.bank_branch),
            swift_code: Set(input.swift_code),
            iban: Set(input.iban),
            notes: Set(input.notes),
            status: Set(status.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(supplier_id = supplier.id, "Supplier created");
        Ok(supplier)
    }

    /// Replaces a supplier's fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub async fn update(&self, id: i32, input: SupplierInput) -> Result<suppliers::Model, SupplierError> {
        let status = validate(&input)?;
        let mut model: suppliers::ActiveModel = self.get(id).await?.into();
        model.name = Set(input.name.trim().to_string());
        model.contact_person = Set(input.contact_person);
        model.email = Set(input.email);
        model.phone = Set(input.phone);
        model.address = Set(input.address);
        model.tax_id = Set(input.tax_id);
        model.bank_name = Set(input.bank_name);
        model.bank_account_number = Set(input.bank_account_number);
        model.bank_branch = Set(input.bank_branch);
        model.swift_code = Set(input.swift_code);
        model.iban = Set(input.iban);
        model.notes = Set(input.notes);
        model.status = Set(status.to_string());
        let updated = model.update(&self.db).await?;

        info!(supplier_id = id, status = %updated.status, "Supplier updated");
        Ok(updated)
    }

    /// Deletes a supplier, or deactivates it when expenses reference it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn delete(&self, id: i32) -> Result<SupplierRemoval, SupplierError> {
        let supplier = self.get(id).await?;
        let references = expenses::Entity::find()
            .filter(expenses::Column::SupplierId.eq(id))
            .count(&self.db)
            .await?;

        if references > 0 {
            let mut model: suppliers::ActiveModel = supplier.into();
            model.status = Set(INACTIVE.to_string());
            model.update(&self.db).await?;
            info!(supplier_id = id, references, "Supplier deactivated");
            return Ok(SupplierRemoval::Deactivated);
        }

        suppliers::Entity::delete_by_id(id).exec(&self.db).await?;
        info!(supplier_id = id, "Supplier deleted");
        Ok(SupplierRemoval::Deleted)
    }
}

fn validate(input: &SupplierInput) -> Result<&'static str, SupplierError> {
    if input.name.trim().is_empty() {
        return Err(SupplierError::NameRequired);
    }
    match input.status.as_deref().map(str::trim) {
        None | Some("" | ACTIVE) => Ok(ACTIVE),
        Some(INACTIVE) => Ok(INACTIVE),
        Some(other) => Err(SupplierError::InvalidStatus(other.to_string())),
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
