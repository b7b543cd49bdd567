//! Extraction pipeline over a pluggable analyzer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::error::ExtractionError;
use super::fields::{date_of, total_of};
use super::types::{AnalyzedDocument, DocType, ExtractedData, ExtractionStatus};

const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// A remote or local document-analysis backend.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Runs one model over the document bytes.
    ///
    /// An empty vector means the model recognized nothing.
    async fn analyze(
        &self,
        doc_type: DocType,
        bytes: &[u8],
    ) -> Result<Vec<AnalyzedDocument>, ExtractionError>;
}

/// Runs the model chain and caches per-model results by content hash.
#[derive(Clone)]
pub struct DocumentExtractor {
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    cache: Cache<(String, DocType), ExtractedData>,
}

impl DocumentExtractor {
    /// Creates an extractor; `None` means no backend is configured.
    #[must_use]
    pub fn new(analyzer: Option<Arc<dyn DocumentAnalyzer>>) -> Self {
        Self::with_config(analyzer, DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates an extractor with custom cache sizing.
    #[must_use]
    pub fn with_config(
        analyzer: Option<Arc<dyn DocumentAnalyzer>>,
        max_capacity: u64,
        ttl_secs: u64,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { analyzer, cache }
    }

    /// Whether an analysis backend is available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Hex SHA-256 of the content.
    #[must_use]
    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Extracts data from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::Unreadable` if the file cannot be read.
    /// Model failures are logged and skipped.
    pub async fn extract(&self, path: &Path) -> Result<ExtractedData, ExtractionError> {
        if !self.is_configured() {
            return Ok(ExtractedData::empty(ExtractionStatus::SkippedNoService));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
        Ok(self.extract_bytes(&bytes).await)
    }

    /// Extracts data from in-memory content.
    pub async fn extract_bytes(&self, bytes: &[u8]) -> ExtractedData {
        let Some(analyzer) = &self.analyzer else {
            return ExtractedData::empty(ExtractionStatus::SkippedNoService);
        };

        let hash = Self::content_hash(bytes);
        for doc_type in DocType::ORDER {
            let key = (hash.clone(), doc_type);
            let result = if let Some(cached) = self.cache.get(&key) {
                debug!(doc_type = %doc_type, hash = %hash, "Extraction cache hit");
                cached
            } else {
                match analyzer.analyze(doc_type, bytes).await {
                    Ok(documents) => {
                        let result = read_first(doc_type, &documents);
                        self.cache.insert(key, result.clone());
                        result
                    }
                    Err(e) => {
                        warn!(doc_type = %doc_type, error = %e, "Document model failed, trying next");
                        continue;
                    }
                }
            };

            if result.has_data() {
                return result;
            }
        }

        ExtractedData::empty(ExtractionStatus::NoData)
    }
}

fn read_first(doc_type: DocType, documents: &[AnalyzedDocument]) -> ExtractedData {
    let Some(doc) = documents.first() else {
        return ExtractedData::empty(ExtractionStatus::NoData);
    };

    let total = total_of(doc, doc_type);
    let date = date_of(doc, doc_type);
    let mut data = ExtractedData {
        amount: total.as_ref().map(|(amount, _)| *amount),
        currency: total.and_then(|(_, currency)| currency),
        date,
        doc_type: Some(doc_type),
        status: ExtractionStatus::Success,
    };
    if !data.has_data() {
        data.status = ExtractionStatus::NoData;
    }
    data
}
