//! Extraction data types.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Document model, tried in [`DocType::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Supplier invoice.
    Invoice,
    /// Till receipt.
    Receipt,
    /// Price quote.
    Quote,
}

impl DocType {
    /// The fixed order models are attempted in.
    pub const ORDER: [Self; 3] = [Self::Invoice, Self::Receipt, Self::Quote];

    /// Convert to string value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::Quote => "quote",
        }
    }

    /// Field names carrying the document date, in preference order.
    #[must_use]
    pub const fn date_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Invoice => &["InvoiceDate"],
            Self::Receipt => &["TransactionDate"],
            Self::Quote => &["QuoteDate", "InvoiceDate"],
        }
    }

    /// Field names carrying the total, in preference order.
    #[must_use]
    pub const fn total_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Invoice => &["InvoiceTotal", "AmountDue"],
            Self::Receipt => &["Total"],
            Self::Quote => &["Total", "InvoiceTotal"],
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed field as reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Currency value with optional symbol and ISO code.
    Currency {
        /// Numeric amount, possibly negative.
        amount: Decimal,
        /// Symbol as printed, e.g. `₪`.
        symbol: Option<String>,
        /// ISO code reported by the analyzer.
        code: Option<String>,
    },
    /// Plain number.
    Number(Decimal),
    /// Calendar date.
    Date(NaiveDate),
    /// Raw text content.
    Text(String),
}

/// A document recognized by one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzedDocument {
    /// Fields keyed by the model's field name.
    pub fields: HashMap<String, FieldValue>,
}

impl AnalyzedDocument {
    /// Looks up a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Outcome of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// A model yielded an amount or a date.
    Success,
    /// No model yielded anything.
    NoData,
    /// No analyzer is configured.
    SkippedNoService,
}

/// Data read off a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedData {
    /// Total as a positive magnitude.
    pub amount: Option<Decimal>,
    /// ISO currency code.
    pub currency: Option<String>,
    /// Document date.
    pub date: Option<NaiveDate>,
    /// Model that produced the data.
    pub doc_type: Option<DocType>,
    /// Outcome.
    pub status: ExtractionStatus,
}

impl ExtractedData {
    /// An empty result with the given status.
    #[must_use]
    pub const fn empty(status: ExtractionStatus) -> Self {
        Self {
            amount: None,
            currency: None,
            date: None,
            doc_type: None,
            status,
        }
    }

    /// Whether an amount or a date was found.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.amount.is_some() || self.date.is_some()
    }
}
