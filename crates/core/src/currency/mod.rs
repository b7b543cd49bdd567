//! Multi-currency normalization.
//!
//! `rate(currency, date)` resolves a rate into the base currency through a
//! per-day cache, an ordered chain of remote sources and a built-in fallback
//! table.

mod error;
mod fallback;
mod service;

#[cfg(test)]
mod props;

pub use error::CurrencyError;
pub use fallback::fallback_rate;
pub use service::{CurrencyService, Normalized, RateCache, RateOrigin, RateQuote, RateSource};
