//! Company credit cards. Only the last four digits are ever stored.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::info;

use crate::entities::{credit_cards, expenses};

/// Error types for credit card operations.
#[derive(Debug, thiserror::Error)]
pub enum CreditCardError {
    /// Card not found.
    #[error("Credit card not found: {0}")]
    NotFound(i32),

    /// Last four digits malformed.
    #[error("last_four_digits must be exactly four digits")]
    InvalidDigits,

    /// Unknown status value.
    #[error("Invalid credit card status: {0}")]
    InvalidStatus(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl CreditCardError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidDigits | Self::InvalidStatus(_) => 400,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CREDIT_CARD_NOT_FOUND",
            Self::InvalidDigits | Self::InvalidStatus(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Whether `s` is exactly four ASCII digits.
#[must_use]
pub fn is_last_four(s: &str) -> bool {
    s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit())
}

/// What a delete did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardRemoval {
    /// Row removed.
    Deleted,
    /// Referenced by expenses; marked inactive instead.
    Deactivated,
}

/// Credit card repository.
#[derive(Debug, Clone)]
pub struct CreditCardRepository {
    db: DatabaseConnection,
}

impl CreditCardRepository {
    /// Creates a new credit card repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Lists cards, optionally including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<credit_cards::Model>, CreditCardError> {
        let mut query = credit_cards::Entity::find().order_by_asc(credit_cards::Column::LastFourDigits);
        if !include_inactive {
            query = query.filter(credit_cards::Column::Status.eq("active"));
        }
        Ok(query.all(&self.db).await?)
    }

    /// Gets a card.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn get(&self, id: i32) -> Result<credit_cards::Model, CreditCardError> {
        credit_cards::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(CreditCardError::NotFound(id))
    }

    /// Creates a card.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDigits` unless `last_four` is four ASCII digits.
    pub async fn create(
        &self,
        last_four: &str,
        description: Option<String>,
    ) -> Result<credit_cards::Model, CreditCardError> {
        let last_four = last_four.trim();
        if !is_last_four(last_four) {
            return Err(CreditCardError::InvalidDigits);
        }
        let card = credit_cards::ActiveModel {
            last_four_digits: Set(last_four.to_string()),
            description: Set(description),
            status: Set("active".to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(credit_card_id = card.id, "Credit card created");
        Ok(card)
    }

    /// Updates a card. `None` leaves a field unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub async fn update(
        &self,
        id: i32,
        last_four: Option<&str>,
        description: Option<Option<String>>,
        status: Option<&str>,
    ) -> Result<credit_cards::Model, CreditCardError> {
        let mut model: credit_cards::ActiveModel = self.get(id).await?.into();
        if let Some(digits) = last_four {
            let digits = digits.trim();
            if !is_last_four(digits) {
                return Err(CreditCardError::InvalidDigits);
            }
            model.last_four_digits = Set(digits.to_string());
        }
        if let Some(description) = description {
            model.description = Set(description);
        }
        if let Some(status) = status {
            if !matches!(status, "active" | "inactive") {
                return Err(CreditCardError::InvalidStatus(status.to_string()));
            }
            model.status = Set(status.to_string());
        }
        let updated = model.update(&self.db).await?;

        info!(credit_card_id = id, status = %updated.status, "Credit card updated");
        Ok(updated)
    }

    /// Deletes a card, or deactivates it when expenses reference it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent.
    pub async fn delete(&self, id: i32) -> Result<CardRemoval, CreditCardError> {
        let card = self.get(id).await?;
        let references = expenses::Entity::find()
            .filter(expenses::Column::CreditCardId.eq(id))
            .count(&self.db)
            .await?;

        if references > 0 {
            let mut model: credit_cards::ActiveModel = card.into();
            model.status = Set("inactive".to_string());
            model.update(&self.db).await?;
            info!(credit_card_id = id, references, "Credit card deactivated");
            return Ok(CardRemoval::Deactivated);
        }

        credit_cards::Entity::delete_by_id(id).exec(&self.db).await?;
        info!(credit_card_id = id, "Credit card deleted");
        Ok(CardRemoval::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1234", true)]
    #[case("0000", true)]
    #[case("123", false)]
    #[case("12345", false)]
    #[case("12a4", false)]
    #[case("١٢٣٤", false)]
    fn test_is_last_four(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_last_four(input), expected);
    }
}
