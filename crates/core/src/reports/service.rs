//! Row flattening and the spreadsheet writer.

use chrono::{DateTime, Utc};
use outlay_shared::types::round_money;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};

use super::error::ExportError;
use super::types::{COLUMNS, ExportRow, SupplierBlock};

const SHEET_NAME: &str = "Expenses";
const AMOUNT_FORMAT: &str = "#,##0.00";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Text.
    Text(String),
    /// Monetary amount, already rounded.
    Amount(Decimal),
    /// Whole number.
    Integer(i32),
    /// Blank.
    Empty,
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn opt(value: Option<impl ToString>) -> Self {
        value.map_or(Self::Empty, |v| Self::Text(v.to_string()))
    }

    fn timestamp(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Empty, |at| Self::Text(at.format(DATETIME_FORMAT).to_string()))
    }
}

/// Export service for business logic.
pub struct ExportService;

impl ExportService {
    /// Flattens a row into cells matching [`COLUMNS`].
    #[must_use]
    pub fn flatten(row: &ExportRow) -> Vec<Cell> {
        let supplier = row.supplier.clone().unwrap_or_default();
        let has_supplier = row.supplier.is_some();

        let mut cells = vec![
            Cell::Integer(row.id),
            Cell::timestamp(Some(row.submitted_at)),
            Cell::text(&row.submitter),
            Cell::text(&row.department),
            Cell::text(&row.category),
            Cell::text(&row.subcategory),
            Cell::text(&row.description),
            Cell::text(&row.reason),
            Cell::text(row.expense_type.as_str()),
            Cell::Amount(round_money(row.amount)),
            Cell::text(&row.currency),
            row.amount_base.map_or(Cell::Empty, |v| Cell::Amount(round_money(v))),
            Cell::opt(row.handler.as_ref()),
            Cell::timestamp(row.handled_at),
            Cell::opt(row.card_last_four.as_ref()),
            Cell::opt(row.payment_method.map(|m| m.as_str())),
        ];

        let SupplierBlock {
            name,
            contact_person,
            email,
            phone,
            address,
            tax_id,
            bank_name,
            bank_account_number,
            bank_branch,
            swift_code,
            iban,
        } = supplier;
        cells.push(if has_supplier { Cell::Text(name) } else { Cell::Empty });
        cells.extend(
            [
                contact_person,
                email,
                phone,
                address,
                tax_id,
                bank_name,
                bank_account_number,
                bank_branch,
                swift_code,
                iban,
            ]
            .into_iter()
            .map(Cell::opt),
        );

        cells.extend([
            Cell::opt(row.invoice_date.map(|d| d.format("%Y-%m-%d"))),
            Cell::opt(row.payment_due_date.map(|d| d.as_str())),
            Cell::text(row.payment_status.as_str()),
            Cell::text(if row.external_entry { "yes" } else { "no" }),
            Cell::opt(row.external_entry_by.as_ref()),
            Cell::timestamp(row.external_entry_at),
        ]);

        cells
    }

    /// Writes rows as an `.xlsx` workbook with a bold header and fitted columns.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Spreadsheet` if the writer fails.
    pub fn write_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let amount = Format::new().set_num_format(AMOUNT_FORMAT);

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, title) in (0u16..).zip(COLUMNS) {
            sheet.write_string_with_format(0, col, *title, &header)?;
        }

        for (row_num, row) in (1u32..).zip(rows) {
            for (col, cell) in (0u16..).zip(Self::flatten(row)) {
                match cell {
                    Cell::Text(text) => {
                        sheet.write_string(row_num, col, text)?;
                    }
                    Cell::Amount(value) => {
                        sheet.write_number_with_format(
                            row_num,
                            col,
                            value.to_f64().unwrap_or_default(),
                            &amount,
                        )?;
                    }
                    Cell::Integer(value) => {
                        sheet.write_number(row_num, col, f64::from(value))?;
                    }
                    Cell::Empty => {}
                }
            }
        }

        sheet.set_freeze_panes(1, 0)?;
        sheet.autofit();

        Ok(workbook.save_to_buffer()?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{NaiveDate, TimeZone};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::expense::{ExpenseType, PaymentMethod, PaymentStatus};
    use crate::reports::MonthFilter;

    fn row() -> ExportRow {
        ExportRow {
            id: 7,
            submitted_at: Utc.with_ymd_and_hms(2026, 5, 2, 9, 30, 0).unwrap(),
            submitter: "Alice".into(),
            department: "R&D".into(),
            category: "Tools".into(),
            subcategory: "Software".into(),
            description: "IDE license".into(),
            reason: "dev tool".into(),
            expense_type: ExpenseType::NeedsApproval,
            amount: dec!(100),
            currency: "USD".into(),
            amount_base: Some(dec!(365.000000)),
            handler: Some("Bob".into()),
            handled_at: Some(Utc.with_ymd_and_hms(2026, 5, 3, 10, 0, 0).unwrap()),
            card_last_four: Some("4242".into()),
            payment_method: Some(PaymentMethod::Credit),
            supplier: Some(SupplierBlock {
                name: "JetBrains".into(),
                iban: Some("CZ00".into()),
                ..SupplierBlock::default()
            }),
            invoice_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            payment_due_date: None,
            payment_status: PaymentStatus::Paid,
            external_entry: true,
            external_entry_by: Some("Carol".into()),
            external_entry_at: None,
        }
    }

    #[test]
    fn test_flatten_matches_column_count() {
        assert_eq!(ExportService::flatten(&row()).len(), COLUMNS.len());
        let mut no_supplier = row();
        no_supplier.supplier = None;
        assert_eq!(ExportService::flatten(&no_supplier).len(), COLUMNS.len());
    }

    #[test]
    fn test_flatten_places_values_under_headers() {
        let cells = ExportService::flatten(&row());
        let at = |header: &str| {
            let idx = COLUMNS.iter().position(|c| *c == header).unwrap();
            cells[idx].clone()
        };

        assert_eq!(at("Amount (Base)"), Cell::Amount(dec!(365.00)));
        assert_eq!(at("Supplier"), Cell::Text("JetBrains".into()));
        assert_eq!(at("Supplier IBAN"), Cell::Text("CZ00".into()));
        assert_eq!(at("Supplier Email"), Cell::Empty);
        assert_eq!(at("Payment Status"), Cell::Text("paid".into()));
        assert_eq!(at("Invoice Date"), Cell::Text("2026-05-01".into()));
        assert_eq!(at("External Entry"), Cell::Text("yes".into()));
    }

    #[test]
    fn test_write_xlsx_produces_zip() {
        let bytes = ExportService::write_xlsx(&[row(), row()]).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_write_xlsx_empty_has_header_only() {
        assert!(ExportService::write_xlsx(&[]).is_ok());
    }

    #[rstest]
    #[case("all", MonthFilter::All)]
    #[case("", MonthFilter::All)]
    #[case("2026-05", MonthFilter::Month { year: 2026, month: 5 })]
    fn test_month_filter_parse(#[case] input: &str, #[case] expected: MonthFilter) {
        assert_eq!(MonthFilter::from_str(input).unwrap(), expected);
    }

    #[rstest]
    #[case("2026-13")]
    #[case("2026-5")]
    #[case("May")]
    fn test_month_filter_rejects(#[case] input: &str) {
        assert!(MonthFilter::from_str(input).is_err());
    }

    #[test]
    fn test_month_filter_range_crosses_year() {
        let (start, end) = MonthFilter::Month { year: 2025, month: 12 }.range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(MonthFilter::Month { year: 2026, month: 5 }.matches(row().submitted_at));
    }
}
