//! Azure Document Intelligence client.
//!
//! Analysis is asynchronous on the service side: the submit call answers
//! 202 with an `Operation-Location` that is polled until the run settles.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::debug;

use outlay_core::document::{AnalyzedDocument, DocType, DocumentAnalyzer, ExtractionError, FieldValue};
use outlay_shared::config::OcrConfig;

const API_VERSION: &str = "2023-07-31";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Document analysis over the prebuilt models.
#[derive(Debug, Clone)]
pub struct DocumentIntelligenceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    models: HashMap<DocType, String>,
    deadline: Duration,
}

impl DocumentIntelligenceClient {
    /// Builds a client from configuration; `None` when OCR is not configured.
    #[must_use]
    pub fn from_config(client: Client, config: &OcrConfig) -> Option<Self> {
        let endpoint = config.endpoint.as_deref()?.trim_end_matches('/').to_string();
        let api_key = config.api_key.clone()?;
        if endpoint.is_empty() || api_key.is_empty() {
            return None;
        }
        let models = HashMap::from([
            (DocType::Invoice, config.invoice_model.clone()),
            (DocType::Receipt, config.receipt_model.clone()),
            (DocType::Quote, config.quote_model.clone()),
        ]);
        Some(Self {
            client,
            endpoint,
            api_key,
            models,
            deadline: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn submit(&self, model: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let url = format!(
            "{}/formrecognizer/documentModels/{model}:analyze?api-version={API_VERSION}",
            self.endpoint
        );
        let response = self
            .client
            .post(&url)
            .header(KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractionError::Analyzer(e.to_string()))?;

        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Analyzer(format!("{status}: {text}")));
        }
        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::InvalidResponse("missing Operation-Location".into()))
    }

    async fn poll(&self, operation: &str) -> Result<Value, ExtractionError> {
        let started = Instant::now();
        loop {
            let body: Value = self
                .client
                .get(operation)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await
                .map_err(|e| ExtractionError::Analyzer(e.to_string()))?
                .error_for_status()
                .map_err(|e| ExtractionError::Analyzer(e.to_string()))?
                .json()
                .await
                .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

            match body.get("status").and_then(Value::as_str) {
                Some("succeeded") => return Ok(body),
                Some("failed") => {
                    let message = body
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("analysis failed");
                    return Err(ExtractionError::Analyzer(message.to_string()));
                }
                Some("notStarted" | "running") => {}
                other => {
                    return Err(ExtractionError::InvalidResponse(format!(
                        "unexpected status {other:?}"
                    )));
                }
            }

            if started.elapsed() >= self.deadline {
                return Err(ExtractionError::Analyzer("analysis timed out".into()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for DocumentIntelligenceClient {
    async fn analyze(
        &self,
        doc_type: DocType,
        bytes: &[u8],
    ) -> Result<Vec<AnalyzedDocument>, ExtractionError> {
        let model = self
            .models
            .get(&doc_type)
            .ok_or_else(|| ExtractionError::Analyzer(format!("no model for {doc_type}")))?;
        let operation = self.submit(model, bytes).await?;
        let body = self.poll(&operation).await?;
        let documents = documents_from_result(&body)?;
        debug!(model = %model, documents = documents.len(), "Document analyzed");
        Ok(documents)
    }
}

/// Converts `analyzeResult.documents[*].fields` into domain documents.
///
/// # Errors
///
/// Returns `InvalidResponse` if `analyzeResult` is missing.
pub fn documents_from_result(body: &Value) -> Result<Vec<AnalyzedDocument>, ExtractionError> {
    let result = body
        .get("analyzeResult")
        .ok_or_else(|| ExtractionError::InvalidResponse("missing analyzeResult".into()))?;
    let Some(documents) = result.get("documents").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(documents
        .iter()
        .map(|doc| AnalyzedDocument {
            fields: doc
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|(name, field)| Some((name.clone(), field_value(field)?)))
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect())
}

fn field_value(field: &Value) -> Option<FieldValue> {
    match field.get("type").and_then(Value::as_str)? {
        "currency" => {
            let value = field.get("valueCurrency")?;
            Some(FieldValue::Currency {
                amount: decimal(value.get("amount")?)?,
                symbol: value
                    .get("currencySymbol")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                code: value
                    .get("currencyCode")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        }
        "number" => field.get("valueNumber").and_then(decimal).map(FieldValue::Number),
        "date" => field
            .get("valueDate")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(FieldValue::Date),
        _ => field
            .get("valueString")
            .or_else(|| field.get("content"))
            .and_then(Value::as_str)
            .map(|s| FieldValue::Text(s.to_string())),
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    let Value::Number(n) = value else {
        return None;
    };
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_fields_are_mapped() {
        let body = json!({
            "status": "succeeded",
            "analyzeResult": {
                "documents": [{
                    "docType": "invoice",
                    "fields": {
                        "InvoiceTotal": {
                            "type": "currency",
                            "valueCurrency": {"amount": -1234.5, "currencySymbol": "₪", "currencyCode": "ILS"},
                            "content": "(1,234.50)"
                        },
                        "InvoiceDate": {"type": "date", "valueDate": "2026-05-01"},
                        "VendorName": {"type": "string", "valueString": "Acme"},
                        "Items": {"type": "array", "valueArray": []}
                    }
                }]
            }
        });

        let docs = documents_from_result(&body).unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(
            doc.field("InvoiceTotal"),
            Some(&FieldValue::Currency {
                amount: dec!(-1234.5),
                symbol: Some("₪".into()),
                code: Some("ILS".into()),
            })
        );
        assert_eq!(
            doc.field("InvoiceDate"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()))
        );
        assert_eq!(doc.field("VendorName"), Some(&FieldValue::Text("Acme".into())));
        assert!(doc.field("Items").is_none());
    }

    #[test]
    fn test_no_documents() {
        let body = json!({"status": "succeeded", "analyzeResult": {"documents": []}});
        assert!(documents_from_result(&body).unwrap().is_empty());
    }

    #[test]
    fn test_missing_result_is_invalid() {
        let err = documents_from_result(&json!({"status": "succeeded"})).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse(_)));
    }

    #[test]
    fn test_unconfigured_returns_none() {
        let config = OcrConfig {
            endpoint: None,
            api_key: Some("key".into()),
            ..OcrConfig::default()
        };
        assert!(DocumentIntelligenceClient::from_config(Client::new(), &config).is_none());
    }
}
