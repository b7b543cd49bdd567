//! Attachment download and the accounting spreadsheet export.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::{AppState, middleware::AuthUser};
use outlay_core::reports::{ExportService, MonthFilter};
use outlay_db::ReportRepository;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Creates the file routes; mounted outside `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/download/{filename}", get(download))
        .route("/export_accounting_excel", get(export_accounting))
}

/// Query parameters for the export.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    /// `YYYY-MM` or `all`.
    pub month: Option<String>,
}

/// Content type by extension; the upload whitelist bounds the set.
fn content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// GET /download/{filename} - Stream a stored attachment.
///
/// Names containing `..` or a path separator are refused, as is any name
/// whose resolved path leaves the upload root.
async fn download(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.uploads.read(&filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// GET /export_accounting_excel?month=YYYY-MM|all - Approved expenses as a
/// spreadsheet (admin, accounting).
async fn export_accounting(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    auth.require(auth.principal.can_manage_payments(), "export accounting data")?;

    let month: MonthFilter = query.month.as_deref().unwrap_or("all").parse()?;
    let rows = ReportRepository::new(state.conn()).export_rows(month).await?;
    let workbook = ExportService::write_xlsx(&rows)?;

    let suffix = match month {
        MonthFilter::All => "all".to_string(),
        MonthFilter::Month { year, month } => format!("{year}-{month:02}"),
    };
    info!(rows = rows.len(), month = %suffix, user_id = auth.user_id(), "Accounting export generated");

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"accounting_export_{suffix}.xlsx\""),
            ),
        ],
        workbook,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1_1700000000_invoice.PDF", "application/pdf")]
    #[case("scan.jpeg", "image/jpeg")]
    #[case("photo.heic", "image/heic")]
    #[case("noext", "application/octet-stream")]
    fn test_content_type(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(content_type(name), expected);
    }
}
