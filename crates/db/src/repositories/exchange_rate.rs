//! Per-day exchange rate cache backed by `exchange_rate_cache`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};
use tracing::debug;

use outlay_core::currency::{CurrencyError, RateCache};

use crate::entities::exchange_rate_cache;

/// Exchange rate cache repository.
///
/// Rows are keyed by `(currency, rate_date)` under a unique constraint, so
/// concurrent writers for the same key resolve to a single row.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    db: DatabaseConnection,
}

impl ExchangeRateRepository {
    /// Creates a new exchange rate repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Exact-date lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, currency: &str, date: NaiveDate) -> Result<Option<Decimal>, DbErr> {
        Ok(exchange_rate_cache::Entity::find()
            .filter(exchange_rate_cache::Column::Currency.eq(currency))
            .filter(exchange_rate_cache::Column::RateDate.eq(date))
            .one(&self.db)
            .await?
            .map(|row| row.rate))
    }

    /// Inserts unless the key exists, then re-reads the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database statement fails.
    pub async fn insert_if_absent(
        &self,
        currency: &str,
        date: NaiveDate,
        rate: Decimal,
    ) -> Result<Decimal, DbErr> {
        let row = exchange_rate_cache::ActiveModel {
            currency: Set(currency.to_string()),
            rate_date: Set(date),
            rate: Set(rate),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        // A lost race inserts nothing and is reported as RecordNotInserted.
        match exchange_rate_cache::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    exchange_rate_cache::Column::Currency,
                    exchange_rate_cache::Column::RateDate,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.db)
            .await
        {
            Ok(_) => {}
            Err(DbErr::RecordNotInserted) => {
                debug!(currency, %date, "Rate already cached by a concurrent writer");
            }
            Err(e) => return Err(e),
        }

        Ok(self.find(currency, date).await?.unwrap_or(rate))
    }
}

#[async_trait]
impl RateCache for ExchangeRateRepository {
    async fn get(&self, currency: &str, date: NaiveDate) -> Result<Option<Decimal>, CurrencyError> {
        self.find(currency, date)
            .await
            .map_err(|e| CurrencyError::Database(e.to_string()))
    }

    async fn insert_or_get(
        &self,
        currency: &str,
        date: NaiveDate,
        rate: Decimal,
    ) -> Result<Decimal, CurrencyError> {
        self.insert_if_absent(currency, date, rate)
            .await
            .map_err(|e| CurrencyError::Database(e.to_string()))
    }
}
