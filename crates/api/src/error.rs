//! Maps domain errors onto `{ "error": code, "message": text }` responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use outlay_core::auth::PasswordError;
use outlay_core::currency::CurrencyError;
use outlay_core::document::ExtractionError;
use outlay_core::expense::ExpenseError;
use outlay_core::reports::ExportError;
use outlay_core::storage::StorageError;
use outlay_db::repositories::{
    BudgetQueryError, CreditCardError, ExpenseRepoError, OrganizationError, ReportError,
    SupplierError, UserError,
};
use outlay_integrations::SsoError;
use outlay_shared::AppError;
use outlay_shared::error::SANITIZED_MESSAGE;

/// Result alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// An error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Builds an error from a status, code and client-facing message.
    ///
    /// 500-class messages are logged and replaced with a generic sentence.
    pub fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = message.into();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(code, detail = %message, "Request failed");
            SANITIZED_MESSAGE.to_string()
        } else {
            if status.is_server_error() {
                warn!(code, detail = %message, "Upstream failure");
            }
            message
        };
        Self {
            status,
            code,
            message,
        }
    }

    /// 401.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into()).into()
    }

    /// 403.
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into()).into()
    }

    /// 400.
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into()).into()
    }

    /// 404.
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into()).into()
    }

    /// 503.
    pub fn unavailable(message: impl Into<String>) -> Self {
        AppError::Unavailable(message.into()).into()
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.code,
                "message": self.message
            })),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        let status = e.status_code();
        let code = e.error_code();
        match e {
            AppError::Database(detail) | AppError::Internal(detail) => {
                Self::new(status, code, detail)
            }
            other => Self::new(status, code, other.public_message()),
        }
    }
}

/// Domain errors carry their own status and code.
macro_rules! from_domain_error {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ApiError {
                fn from(e: $ty) -> Self {
                    Self::new(e.status_code(), e.error_code(), e.to_string())
                }
            }
        )+
    };
}

from_domain_error!(
    ExpenseError,
    ExpenseRepoError,
    OrganizationError,
    UserError,
    SupplierError,
    CreditCardError,
    BudgetQueryError,
    ReportError,
    StorageError,
    CurrencyError,
    ExtractionError,
    ExportError,
    PasswordError,
    SsoError,
);

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use rstest::rstest;

    async fn body_json(err: ApiError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_database_detail_is_not_leaked() {
        let err = ApiError::from(AppError::Database("relation \"users\" does not exist".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(err).await;
        assert_eq!(body["error"], "DATABASE_ERROR");
        assert_eq!(body["message"], SANITIZED_MESSAGE);
    }

    #[tokio::test]
    async fn test_client_error_keeps_message() {
        let body = body_json(ApiError::from(ExpenseError::RejectionReasonRequired)).await;
        assert_eq!(body["error"], "REJECTION_REASON_REQUIRED");
        assert_eq!(body["message"], "Rejection reason is required");
    }

    #[rstest]
    #[case(ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED)]
    #[case(ApiError::forbidden("x"), StatusCode::FORBIDDEN)]
    #[case(ApiError::validation("x"), StatusCode::BAD_REQUEST)]
    #[case(ApiError::not_found("x"), StatusCode::NOT_FOUND)]
    #[case(ApiError::unavailable("x"), StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ApiError::from(ExpenseError::Locked(7)), StatusCode::CONFLICT)]
    #[case(ApiError::from(StorageError::InvalidFilename("../x".into())), StatusCode::BAD_REQUEST)]
    #[case(ApiError::from(SsoError::NotConfigured), StatusCode::SERVICE_UNAVAILABLE)]
    fn test_status_mapping(#[case] err: ApiError, #[case] status: StatusCode) {
        assert_eq!(err.status(), status);
    }
}
