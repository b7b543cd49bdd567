//! Rate resolution: base short-circuit, per-day cache, source chain, fallback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use outlay_shared::types::{CurrencyCode, MAX_BASE_AMOUNT, round_rate};

use super::error::CurrencyError;
use super::fallback::fallback_rate;

/// Persistent per-day rate cache keyed by `(currency, date)`.
#[async_trait]
pub trait RateCache: Send + Sync {
    /// Returns the cached rate for an exact `(currency, date)`.
    async fn get(&self, currency: &str, date: NaiveDate) -> Result<Option<Decimal>, CurrencyError>;

    /// Inserts a rate unless a row already exists, then returns the stored
    /// rate. A concurrent writer winning the race is not an error; its
    /// value is returned.
    async fn insert_or_get(
        &self,
        currency: &str,
        date: NaiveDate,
        rate: Decimal,
    ) -> Result<Decimal, CurrencyError>;
}

/// A remote exchange-rate source.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches one unit of `currency` in `base` for `date`.
    async fn fetch(
        &self,
        currency: &str,
        base: &str,
        date: NaiveDate,
    ) -> Result<Decimal, CurrencyError>;
}

/// Where a rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Currency is the base currency.
    Base,
    /// Served from the per-day cache.
    Cache,
    /// Fetched from the named source.
    Source(&'static str),
    /// Built-in approximate table.
    Fallback,
}

/// A resolved rate with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuote {
    /// One unit of the currency in base currency, six places.
    pub rate: Decimal,
    /// Where it came from.
    pub origin: RateOrigin,
}

/// An amount normalized into the base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    /// Rate applied.
    pub rate: Decimal,
    /// `amount × rate`, unrounded.
    pub amount_base: Decimal,
}

/// Resolves exchange rates into the base currency.
#[derive(Clone)]
pub struct CurrencyService {
    base: String,
    cache: Arc<dyn RateCache>,
    sources: Vec<Arc<dyn RateSource>>,
}

impl std::fmt::Debug for CurrencyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyService")
            .field("base", &self.base)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl CurrencyService {
    /// Creates a service. `sources` are tried in order on a cache miss.
    #[must_use]
    pub fn new(
        base: impl Into<String>,
        cache: Arc<dyn RateCache>,
        sources: Vec<Arc<dyn RateSource>>,
    ) -> Self {
        Self {
            base: base.into(),
            cache,
            sources,
        }
    }

    /// The base currency code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// One unit of `currency` in base currency on `date`.
    ///
    /// # Errors
    ///
    /// `UnsupportedCurrency` when every source fails and no fallback exists;
    /// `Database` when the cache cannot be read or written.
    pub async fn rate(&self, currency: &str, date: NaiveDate) -> Result<Decimal, CurrencyError> {
        self.quote(currency, date).await.map(|q| q.rate)
    }

    /// Like [`Self::rate`], also reporting where the rate came from.
    ///
    /// # Errors
    ///
    /// See [`Self::rate`].
    pub async fn quote(&self, currency: &str, date: NaiveDate) -> Result<RateQuote, CurrencyError> {
        let code: CurrencyCode = currency
            .parse()
            .map_err(|_| CurrencyError::InvalidCode(currency.to_string()))?;
        let code = code.as_str();

        if code == self.base {
            return Ok(RateQuote {
                rate: Decimal::ONE,
                origin: RateOrigin::Base,
            });
        }

        if let Some(rate) = self.cache.get(code, date).await? {
            debug!(currency = %code, %date, %rate, "exchange rate cache hit");
            return Ok(RateQuote {
                rate,
                origin: RateOrigin::Cache,
            });
        }

        for source in &self.sources {
            match source.fetch(code, &self.base, date).await {
                Ok(rate) if rate > Decimal::ZERO => {
                    let rate = round_rate(rate);
                    // Stored under the requested date, not the observation date.
                    let stored = self.cache.insert_or_get(code, date, rate).await?;
                    debug!(
                        currency = %code,
                        %date,
                        rate = %stored,
                        source = source.name(),
                        "exchange rate fetched"
                    );
                    return Ok(RateQuote {
                        rate: stored,
                        origin: RateOrigin::Source(source.name()),
                    });
                }
                Ok(rate) => {
                    warn!(currency = %code, %date, %rate, source = source.name(), "rate source returned non-positive rate");
                }
                Err(e) => {
                    warn!(currency = %code, %date, source = source.name(), error = %e, "rate source failed");
                }
            }
        }

        match fallback_rate(code, &self.base) {
            Some(rate) => {
                let rate = round_rate(rate);
                warn!(currency = %code, %date, %rate, "using built-in fallback exchange rate");
                Ok(RateQuote {
                    rate,
                    origin: RateOrigin::Fallback,
                })
            }
            None => Err(CurrencyError::UnsupportedCurrency(code.to_string())),
        }
    }

    /// Normalizes `amount` in `currency` into the base currency on `date`.
    ///
    /// # Errors
    ///
    /// `AmountOutOfRange` when the product overflows or exceeds
    /// [`MAX_BASE_AMOUNT`]; otherwise see [`Self::rate`].
    pub async fn normalize(
        &self,
        amount: Decimal,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Normalized, CurrencyError> {
        let rate = self.rate(currency, date).await?;
        let amount_base = amount
            .checked_mul(rate)
            .filter(|base| base.abs() <= MAX_BASE_AMOUNT)
            .ok_or_else(|| CurrencyError::AmountOutOfRange {
                amount: amount.to_string(),
                currency: currency.to_string(),
            })?;
        Ok(Normalized { rate, amount_base })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory fakes for the rate seams.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct MemoryCache {
        pub rows: Mutex<HashMap<(String, NaiveDate), Decimal>>,
    }

    impl MemoryCache {
        pub fn len(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn stored(&self, currency: &str, date: NaiveDate) -> Option<Decimal> {
            self.rows
                .lock()
                .unwrap()
                .get(&(currency.to_string(), date))
                .copied()
        }
    }

    #[async_trait]
    impl RateCache for MemoryCache {
        async fn get(
            &self,
            currency: &str,
            date: NaiveDate,
        ) -> Result<Option<Decimal>, CurrencyError> {
            Ok(self.stored(currency, date))
        }

        async fn insert_or_get(
            &self,
            currency: &str,
            date: NaiveDate,
            rate: Decimal,
        ) -> Result<Decimal, CurrencyError> {
            let mut rows = self.rows.lock().unwrap();
            Ok(*rows.entry((currency.to_string(), date)).or_insert(rate))
        }
    }

    /// A source returning a fixed answer and counting calls.
    pub struct FixedSource {
        pub name: &'static str,
        pub answer: Result<Decimal, ()>,
        pub calls: AtomicUsize,
    }

    impl FixedSource {
        pub fn ok(name: &'static str, rate: Decimal) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: Ok(rate),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer: Err(()),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn chain(sources: &[&Arc<FixedSource>]) -> Vec<Arc<dyn RateSource>> {
        sources
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn RateSource>)
            .collect()
    }

    #[async_trait]
    impl RateSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(
            &self,
            _currency: &str,
            _base: &str,
            _date: NaiveDate,
        ) -> Result<Decimal, CurrencyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.map_err(|()| CurrencyError::Source {
                source_name: self.name,
                message: "timed out".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{FixedSource, MemoryCache, chain};
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_base_currency_is_one() {
        let cache = Arc::new(MemoryCache::default());
        let source = FixedSource::ok("a", dec!(9));
        let service = CurrencyService::new("ILS", cache.clone(), chain(&[&source]));

        let quote = service.quote("ils", day(2026, 1, 1)).await.unwrap();
        assert_eq!(quote.rate, Decimal::ONE);
        assert_eq!(quote.origin, RateOrigin::Base);
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_source_b_after_source_a_fails_then_cache() {
        let cache = Arc::new(MemoryCache::default());
        let a = FixedSource::failing("boi");
        let b = FixedSource::ok("open-er", dec!(3.95));
        let service = CurrencyService::new("ILS", cache.clone(), chain(&[&a, &b]));
        let date = day(2026, 1, 1);

        let first = service.quote("EUR", date).await.unwrap();
        assert_eq!(first.rate, dec!(3.95));
        assert_eq!(first.origin, RateOrigin::Source("open-er"));
        assert_eq!(cache.stored("EUR", date), Some(dec!(3.95)));

        let second = service.quote("EUR", date).await.unwrap();
        assert_eq!(second.origin, RateOrigin::Cache);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let cache = Arc::new(MemoryCache::default());
        let service = CurrencyService::new(
            "ILS",
            cache.clone(),
            chain(&[&FixedSource::failing("boi"), &FixedSource::failing("open-er")]),
        );

        let quote = service.quote("USD", day(2026, 2, 3)).await.unwrap();
        assert_eq!(quote.origin, RateOrigin::Fallback);
        assert_eq!(quote.rate, dec!(3.70));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_without_fallback() {
        let service = CurrencyService::new(
            "ILS",
            Arc::new(MemoryCache::default()),
            chain(&[&FixedSource::failing("boi")]),
        );
        let result = service.rate("XYZ", day(2026, 2, 3)).await;
        assert!(matches!(result, Err(CurrencyError::UnsupportedCurrency(c)) if c == "XYZ"));
    }

    #[tokio::test]
    async fn test_invalid_code_rejected() {
        let service = CurrencyService::new("ILS", Arc::new(MemoryCache::default()), vec![]);
        let result = service.rate("dollars", day(2026, 2, 3)).await;
        assert!(matches!(result, Err(CurrencyError::InvalidCode(_))));
    }

    #[tokio::test]
    async fn test_losing_insert_returns_winner_rate() {
        let cache = Arc::new(MemoryCache::default());
        let date = day(2026, 5, 1);
        cache
            .rows
            .lock()
            .unwrap()
            .insert(("USD".to_string(), date), dec!(3.65));
        // The cached row wins over anything a source would return.
        let service = CurrencyService::new("ILS", cache.clone(), chain(&[&FixedSource::ok("boi", dec!(3.99))]));
        assert_eq!(service.rate("USD", date).await.unwrap(), dec!(3.65));

        let stored = cache.insert_or_get("USD", date, dec!(4.10)).await.unwrap();
        assert_eq!(stored, dec!(3.65));
    }

    #[tokio::test]
    async fn test_normalize_submit_scenario() {
        let service = CurrencyService::new(
            "ILS",
            Arc::new(MemoryCache::default()),
            chain(&[&FixedSource::ok("boi", dec!(3.65))]),
        );
        let normalized = service
            .normalize(dec!(100), "USD", day(2026, 5, 1))
            .await
            .unwrap();
        assert_eq!(normalized.rate, dec!(3.65));
        assert_eq!(normalized.amount_base, dec!(365.00));
    }

    #[tokio::test]
    async fn test_normalize_overflow_is_rejected() {
        let service = CurrencyService::new(
            "ILS",
            Arc::new(MemoryCache::default()),
            chain(&[&FixedSource::ok("boi", dec!(3.65))]),
        );
        let date = day(2026, 5, 1);

        let overflow = service.normalize(Decimal::MAX, "USD", date).await;
        assert!(matches!(overflow, Err(CurrencyError::AmountOutOfRange { .. })));

        // Fits the amount column but not the base column once multiplied.
        let too_large = service
            .normalize(dec!(9999999999999999.99), "USD", date)
            .await;
        let err = too_large.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), "AMOUNT_OUT_OF_RANGE");

        let base = service.normalize(dec!(9999999999999999.99), "ILS", date).await;
        assert_eq!(base.unwrap().amount_base, dec!(9999999999999999.99));
    }
}
