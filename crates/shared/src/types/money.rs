//! Money helpers with decimal precision.
//!
//! CRITICAL: Never use floating-point for money calculations.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fractional digits kept for monetary amounts at the boundary.
pub const MONEY_SCALE: u32 = 2;

/// Fractional digits kept for exchange rates.
pub const RATE_SCALE: u32 = 6;

/// Largest amount a `NUMERIC(18, 2)` column holds: 9999999999999999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 2);

/// Largest base amount a `NUMERIC(24, 8)` column holds: 9999999999999999.99999999.
pub const MAX_BASE_AMOUNT: Decimal =
    Decimal::from_parts(0xA0FF_FFFF, 0x1BCE_CCED, 0xD3C2, false, 8);

/// Rounds a monetary amount to two places, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds an exchange rate to six places, half away from zero.
#[must_use]
pub fn round_rate(rate: Decimal) -> Decimal {
    rate.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// ISO 4217 currency code: exactly three ASCII uppercase letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    /// Accepts any letter case and surrounding whitespace; stores uppercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(format!("Invalid currency code: {s}"))
        }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_column_bounds() {
        assert_eq!(MAX_AMOUNT, dec!(9999999999999999.99));
        assert_eq!(MAX_BASE_AMOUNT, dec!(9999999999999999.99999999));
    }

    #[rstest]
    #[case(dec!(365.0), dec!(365.00))]
    #[case(dec!(1.005), dec!(1.01))]
    #[case(dec!(1.004999), dec!(1.00))]
    #[case(dec!(-2.345), dec!(-2.35))]
    fn test_round_money(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round_money(input), expected);
    }

    #[test]
    fn test_round_rate() {
        assert_eq!(round_rate(dec!(3.6512345678)), dec!(3.651235));
    }

    #[rstest]
    #[case("usd", "USD")]
    #[case(" ils ", "ILS")]
    #[case("EUR", "EUR")]
    fn test_currency_code_valid(#[case] input: &str, #[case] expected: &str) {
        let code: CurrencyCode = input.parse().unwrap();
        assert_eq!(code.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("US")]
    #[case("USDX")]
    #[case("U$D")]
    #[case("12A")]
    fn test_currency_code_invalid(#[case] input: &str) {
        assert!(input.parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_currency_code_serde() {
        let code: CurrencyCode = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"GBP\"");
        assert!(serde_json::from_str::<CurrencyCode>("\"pounds\"").is_err());
    }
}
