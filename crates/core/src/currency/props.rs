//! Property tests for rate resolution.

use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::service::fakes::{FixedSource, MemoryCache, chain};
use super::service::CurrencyService;

fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|micros| Decimal::new(micros, 6))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// `amount_base` is exactly `amount × rate`.
    #[test]
    fn prop_normalized_amount_matches_rate(amount in positive_amount(), rate in positive_rate()) {
        let service = CurrencyService::new(
            "ILS",
            Arc::new(MemoryCache::default()),
            chain(&[&FixedSource::ok("boi", rate)]),
        );
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let normalized = runtime().block_on(service.normalize(amount, "USD", date)).unwrap();
        prop_assert_eq!(normalized.rate, rate);
        prop_assert_eq!(normalized.amount_base, amount * rate);
    }

    /// Repeated lookups for the same day leave one cache row and hit the source once.
    #[test]
    fn prop_one_cache_row_per_day(rate in positive_rate(), lookups in 1usize..8) {
        let cache = Arc::new(MemoryCache::default());
        let source = FixedSource::ok("boi", rate);
        let service = CurrencyService::new("ILS", cache.clone(), chain(&[&source]));
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let rt = runtime();
        for _ in 0..lookups {
            prop_assert_eq!(rt.block_on(service.rate("EUR", date)).unwrap(), rate);
        }
        prop_assert_eq!(cache.len(), 1);
        prop_assert_eq!(source.calls(), 1);
    }
}
