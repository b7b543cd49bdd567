//! Common types used across the application.

pub mod money;

pub use money::{
    CurrencyCode, MAX_AMOUNT, MAX_BASE_AMOUNT, MONEY_SCALE, RATE_SCALE, round_money, round_rate,
};
