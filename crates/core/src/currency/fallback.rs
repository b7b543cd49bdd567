//! Approximate rates into ILS used when every remote source fails.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Well-known approximate rates: one unit of the currency in ILS.
const FALLBACK_TO_ILS: &[(&str, Decimal)] = &[
    ("USD", dec!(3.70)),
    ("EUR", dec!(4.00)),
    ("GBP", dec!(4.70)),
    ("CHF", dec!(4.15)),
    ("JPY", dec!(0.025)),
    ("CAD", dec!(2.70)),
    ("AUD", dec!(2.45)),
    ("CNY", dec!(0.51)),
    ("INR", dec!(0.044)),
    ("SEK", dec!(0.35)),
    ("NOK", dec!(0.34)),
    ("DKK", dec!(0.54)),
    ("PLN", dec!(0.93)),
    ("TRY", dec!(0.11)),
    ("RUB", dec!(0.040)),
    ("JOD", dec!(5.22)),
    ("EGP", dec!(0.076)),
];

/// Looks up a fallback rate for `currency` into `base`.
///
/// The table is anchored on ILS; other bases are derived by cross rate.
#[must_use]
pub fn fallback_rate(currency: &str, base: &str) -> Option<Decimal> {
    if currency == base {
        return Some(Decimal::ONE);
    }
    let to_ils = |code: &str| -> Option<Decimal> {
        if code == "ILS" {
            Some(Decimal::ONE)
        } else {
            FALLBACK_TO_ILS
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, r)| *r)
        }
    };
    let from = to_ils(currency)?;
    let into = to_ils(base)?;
    from.checked_div(into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_known_currency() {
        assert_eq!(fallback_rate("USD", "ILS"), Some(dec!(3.70)));
        assert_eq!(fallback_rate("ILS", "ILS"), Some(Decimal::ONE));
    }

    #[test]
    fn test_fallback_unknown_currency() {
        assert_eq!(fallback_rate("XYZ", "ILS"), None);
    }

    #[test]
    fn test_fallback_cross_rate() {
        assert_eq!(fallback_rate("ILS", "USD"), Some(Decimal::ONE / dec!(3.70)));
        assert_eq!(fallback_rate("EUR", "USD"), Some(dec!(4.00) / dec!(3.70)));
    }
}
