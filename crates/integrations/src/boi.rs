//! Bank of Israel representative rates (SDMX CSV).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use outlay_core::currency::{CurrencyError, RateSource};

const SOURCE: &str = "bank_of_israel";
const DEFAULT_BASE_URL: &str =
    "https://edge.boi.gov.il/FusionEdgeServer/sdmx/v2/data/dataflow/BOI.STATISTICS/EXR/1.0";

/// Days looked back from the requested date; rates are not published on
/// weekends and holidays.
pub const LOOKBACK_DAYS: u64 = 7;

/// Central-bank rate source. Only quotes against ILS.
#[derive(Debug, Clone)]
pub struct BankOfIsraelSource {
    client: Client,
    base_url: String,
}

impl BankOfIsraelSource {
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

    fn error(message: impl Into<String>) -> CurrencyError {
        CurrencyError::Source {
            source_name: SOURCE,
            message: message.into(),
        }
    }
}

#[async_trait]
impl RateSource for BankOfIsraelSource {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(
        &self,
        currency: &str,
        base: &str,
        date: NaiveDate,
    ) -> Result<Decimal, CurrencyError> {
        if base != "ILS" {
            return Err(Self::error(format!("base {base} is not quoted")));
        }
        let start = date
            .checked_sub_days(Days::new(LOOKBACK_DAYS))
            .unwrap_or(date);
        let url = format!("{}/RER_{currency}_ILS", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("startperiod", start.to_string()),
                ("endperiod", date.to_string()),
                ("format", "csv".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Self::error(e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::error(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| Self::error(e.to_string()))?;

        let (observed, rate) = latest_observation(&body, date)?
            .ok_or_else(|| Self::error(format!("no observation for {currency} up to {date}")))?;
        debug!(currency, %date, %observed, %rate, "Bank of Israel rate");
        Ok(rate)
    }
}

/// Picks the latest `(TIME_PERIOD, OBS_VALUE)` on or before `date`.
///
/// # Errors
///
/// Returns a source error if the CSV is malformed or lacks the columns.
pub fn latest_observation(
    body: &str,
    date: NaiveDate,
) -> Result<Option<(NaiveDate, Decimal)>, CurrencyError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| BankOfIsraelSource::error(e.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| BankOfIsraelSource::error(format!("missing column {name}")))
    };
    let period_idx = column("TIME_PERIOD")?;
    let value_idx = column("OBS_VALUE")?;

    let mut best: Option<(NaiveDate, Decimal)> = None;
    for record in reader.records() {
        let record = record.map_err(|e| BankOfIsraelSource::error(e.to_string()))?;
        let (Some(period), Some(value)) = (record.get(period_idx), record.get(value_idx)) else {
            continue;
        };
        let Ok(observed) = NaiveDate::parse_from_str(period.trim(), "%Y-%m-%d") else {
            continue;
        };
        let Ok(rate) = Decimal::from_str(value.trim()) else {
            continue;
        };
        if observed > date || rate <= Decimal::ZERO {
            continue;
        }
        if best.is_none_or(|(seen, _)| observed > seen) {
            best = Some((observed, rate));
        }
    }
    Ok(best)
}
