//! Spot rates from open.er-api.com. Always today's rate.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use outlay_core::currency::{CurrencyError, RateSource};

const SOURCE: &str = "open_er_api";
const DEFAULT_BASE_URL: &str = "https://open.er-api.com/v6/latest";

/// Free spot-rate source.
#[derive(Debug, Clone)]
pub struct OpenErSource {
    client: Client,
    base_url: String,
}

impl OpenErSource {
    /// Creates a source using the public endpoint.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Creates a source against another endpoint.
    #[must_use]
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

fn error(message: impl Into<String>) -> CurrencyError {
    CurrencyError::Source {
        source_name: SOURCE,
        message: message.into(),
    }
}

#[async_trait]
impl RateSource for OpenErSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(
        &self,
        currency: &str,
        base: &str,
        date: NaiveDate,
    ) -> Result<Decimal, CurrencyError> {
        let url = format!("{}/{currency}", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| error(e.to_string()))?
            .error_for_status()
            .map_err(|e| error(e.to_string()))?
            .json()
            .await
            .map_err(|e| error(e.to_string()))?;

        let rate = rate_from_body(&body, base)?;
        debug!(currency, base, requested = %date, %rate, "Spot rate");
        Ok(rate)
    }
}

/// Reads `rates[base]` from a successful response.
///
/// # Errors
///
/// Returns a source error unless `result` is `success` and the rate is a
/// positive number.
pub fn rate_from_body(body: &Value, base: &str) -> Result<Decimal, CurrencyError> {
    let result = body.get("result").and_then(Value::as_str).unwrap_or_default();
    if result != "success" {
        let kind = body
            .get("error-type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Err(error(format!("result {result}: {kind}")));
    }
    let rate = body
        .get("rates")
        .and_then(|rates| rates.get(base))
        .and_then(|v| match v {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            _ => None,
        })
        .ok_or_else(|| error(format!("no {base} rate")))?;
    if rate <= Decimal::ZERO {
        return Err(error(format!("non-positive {base} rate")));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_rate_from_success_body() {
        let body = json!({"result": "success", "base_code": "EUR", "rates": {"EUR": 1, "ILS": 3.95}});
        assert_eq!(rate_from_body(&body, "ILS").unwrap(), dec!(3.95));
    }

    #[test]
    fn test_error_body() {
        let body = json!({"result": "error", "error-type": "unsupported-code"});
        let err = rate_from_body(&body, "ILS").unwrap_err();
        assert!(err.to_string().contains("unsupported-code"));
    }

    #[test]
    fn test_missing_base() {
        let body = json!({"result": "success", "rates": {"USD": 1.08}});
        assert!(rate_from_body(&body, "ILS").is_err());
    }
}
