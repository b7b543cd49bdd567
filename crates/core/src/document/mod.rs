//! Document extraction.
//!
//! Reads the total, currency and date off an uploaded invoice, receipt or
//! quote through a pluggable [`DocumentAnalyzer`]. Models are tried in the
//! order invoice, receipt, quote; per-model results are cached by content
//! hash so re-uploading the same file never repeats a remote call.

pub mod error;
pub mod fields;
pub mod service;
pub mod types;

pub use error::ExtractionError;
pub use fields::{parse_amount, resolve_currency};
pub use service::{DocumentAnalyzer, DocumentExtractor};
pub use types::{AnalyzedDocument, DocType, ExtractedData, ExtractionStatus, FieldValue};
