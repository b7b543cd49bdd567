//! Field readers for analyzed documents.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::types::{AnalyzedDocument, DocType, FieldValue};

/// Symbols that identify exactly one currency.
const UNAMBIGUOUS_SYMBOLS: &[(&str, &str)] = &[("₪", "ILS"), ("€", "EUR"), ("£", "GBP")];

/// Best guess for symbols shared by several currencies.
const AMBIGUOUS_SYMBOLS: &[(&str, &str)] = &[("$", "USD"), ("¥", "JPY")];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%m/%d/%Y"];

/// Resolves a currency from a printed symbol and a reported code.
///
/// An unambiguous symbol wins, then the code, then the ambiguous-symbol table.
#[must_use]
pub fn resolve_currency(symbol: Option<&str>, code: Option<&str>) -> Option<String> {
    let symbol = symbol.map(str::trim).filter(|s| !s.is_empty());
    let lookup = |table: &[(&str, &str)]| {
        symbol.and_then(|s| {
            table
                .iter()
                .find(|(sym, _)| s.contains(sym))
                .map(|(_, code)| (*code).to_string())
        })
    };

    lookup(UNAMBIGUOUS_SYMBOLS)
        .or_else(|| {
            code.map(str::trim)
                .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
                .map(str::to_ascii_uppercase)
        })
        .or_else(|| lookup(AMBIGUOUS_SYMBOLS))
}

/// Parses a printed amount into a positive magnitude.
///
/// Accepts thousands separators, a leading minus, and accounting-style
/// parentheses. Returns `None` when no number can be read.
#[must_use]
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // "1.234,56": the comma is the decimal mark.
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // "12,50": a lone comma followed by two digits.
        (None, Some(comma)) if cleaned.len() - comma == 3 && cleaned.matches(',').count() == 1 => {
            cleaned.replace(',', ".")
        }
        _ => cleaned.replace(',', ""),
    };

    Decimal::from_str(&normalized).ok().map(|d| d.abs())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Reads an amount and currency out of one field.
fn read_total(value: &FieldValue) -> Option<(Decimal, Option<String>)> {
    match value {
        FieldValue::Currency {
            amount,
            symbol,
            code,
        } => Some((
            amount.abs(),
            resolve_currency(symbol.as_deref(), code.as_deref()),
        )),
        FieldValue::Number(n) => Some((n.abs(), None)),
        FieldValue::Text(text) => {
            parse_amount(text).map(|amount| (amount, resolve_currency(Some(text), None)))
        }
        FieldValue::Date(_) => None,
    }
}

fn read_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Date(d) => Some(*d),
        FieldValue::Text(text) => parse_date(text),
        FieldValue::Currency { .. } | FieldValue::Number(_) => None,
    }
}

/// Total and currency of a document under a model's field names.
#[must_use]
pub fn total_of(doc: &AnalyzedDocument, doc_type: DocType) -> Option<(Decimal, Option<String>)> {
    doc_type
        .total_fields()
        .iter()
        .filter_map(|name| doc.field(name))
        .find_map(read_total)
}

/// Date of a document under a model's field names.
#[must_use]
pub fn date_of(doc: &AnalyzedDocument, doc_type: DocType) -> Option<NaiveDate> {
    doc_type
        .date_fields()
        .iter()
        .filter_map(|name| doc.field(name))
        .find_map(read_date)
}
