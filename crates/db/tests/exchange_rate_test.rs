//! Integration tests for the per-day exchange rate cache.

mod common;

use chrono::NaiveDate;
use common::connect;
use futures::future::join_all;
use outlay_core::currency::RateCache;
use outlay_db::{ExchangeRateRepository, entities::exchange_rate_cache};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

/// A three-letter code unlikely to collide with real rows.
fn test_currency() -> String {
    let n = Uuid::new_v4().as_u128();
    (0..3)
        .map(|i| char::from(b'A' + u8::try_from((n >> (i * 8)) % 26).expect("fits")))
        .collect()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_insert_or_get_keeps_first_rate() {
    let db = connect().await;
    let repo = ExchangeRateRepository::new(db.clone());
    let currency = test_currency();
    let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

    assert_eq!(repo.get(&currency, date).await.unwrap(), None);
    assert_eq!(
        repo.insert_or_get(&currency, date, dec!(3.95)).await.unwrap(),
        dec!(3.95)
    );
    assert_eq!(
        repo.insert_or_get(&currency, date, dec!(4.10)).await.unwrap(),
        dec!(3.95)
    );
    assert_eq!(repo.get(&currency, date).await.unwrap(), Some(dec!(3.95)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_inserts_leave_one_row() {
    let db = connect().await;
    let repo = ExchangeRateRepository::new(db.clone());
    let currency = test_currency();
    let date = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

    let writers = (0..8).map(|i| {
        let repo = repo.clone();
        let currency = currency.clone();
        async move {
            repo.insert_or_get(&currency, date, dec!(3.60) + rust_decimal::Decimal::from(i))
                .await
        }
    });
    let results: Vec<_> = join_all(writers).await;

    let stored: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(stored.windows(2).all(|w| w[0] == w[1]));

    let rows = exchange_rate_cache::Entity::find()
        .filter(exchange_rate_cache::Column::Currency.eq(&currency))
        .filter(exchange_rate_cache::Column::RateDate.eq(date))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
