//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes under `/api/v1`
//! - Session-cookie authentication middleware
//! - Error-to-response mapping

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use outlay_core::currency::CurrencyService;
use outlay_core::document::DocumentExtractor;
use outlay_core::notification::NotificationDispatcher;
use outlay_core::storage::UploadStore;
use outlay_integrations::SsoClient;
use outlay_shared::AppConfig;
use outlay_shared::jwt::SessionTokens;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Session token signer.
    pub sessions: Arc<SessionTokens>,
    /// Exchange-rate resolution.
    pub currency: Arc<CurrencyService>,
    /// Invoice and receipt extraction.
    pub extractor: Arc<DocumentExtractor>,
    /// Attachment storage.
    pub uploads: Arc<UploadStore>,
    /// Email notifications.
    pub notifier: Arc<NotificationDispatcher>,
    /// Single sign-on; `None` when not configured.
    pub sso: Option<Arc<SsoClient>>,
}

impl AppState {
    /// A connection handle for repositories.
    #[must_use]
    pub fn conn(&self) -> DatabaseConnection {
        (*self.db).clone()
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let upload_limit = body_limit(state.uploads.max_file_size());
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .merge(routes::root_routes_with_state(state.clone()))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Room for the three attachment slots plus the text fields.
fn body_limit(max_file_size: u64) -> usize {
    let limit = max_file_size.saturating_mul(3).saturating_add(1024 * 1024);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// CORS for the configured browser origins. Credentials are allowed so the
/// session cookie travels; with no origins configured, cross-origin calls
/// are refused.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::COOKIE};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use outlay_core::notification::NotificationRenderer;
    use outlay_db::ExchangeRateRepository;
    use outlay_shared::config::{
        CurrencyConfig, DatabaseConfig, EmailConfig, OcrConfig, OrganizationConfig, ServerConfig,
        SessionConfig, SsoConfig, StorageConfig,
    };
    use outlay_shared::email::EmailService;
    use outlay_shared::error::SANITIZED_MESSAGE;

    /// State over a disconnected database: every query fails.
    fn test_state(upload_root: &std::path::Path) -> AppState {
        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/outlay_test".into(),
                max_connections: 1,
                min_connections: 1,
            },
            session: SessionConfig {
                secret: "test-secret".into(),
                ttl_hours: 1,
                cookie_name: "outlay_session".into(),
                secure: false,
            },
            email: EmailConfig::default(),
            ocr: OcrConfig::default(),
            sso: SsoConfig::default(),
            storage: StorageConfig {
                upload_root: upload_root.to_string_lossy().into_owned(),
                max_file_size: 1024,
            },
            currency: CurrencyConfig::default(),
            organization: OrganizationConfig::default(),
        };
        let db = DatabaseConnection::Disconnected;
        let cache = Arc::new(ExchangeRateRepository::new(db.clone()));
        let renderer = NotificationRenderer::new(config.email.frontend_url.clone()).unwrap();
        let mailer = Arc::new(EmailService::new(config.email.clone()));

        AppState {
            db: Arc::new(db),
            sessions: Arc::new(SessionTokens::new(&config.session)),
            currency: Arc::new(CurrencyService::new("ILS", cache, Vec::new())),
            extractor: Arc::new(DocumentExtractor::new(None)),
            uploads: Arc::new(UploadStore::open(upload_root, 1024).unwrap()),
            notifier: Arc::new(NotificationDispatcher::new(Arc::new(renderer), mailer)),
            sso: None,
            config: Arc::new(config),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_database() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let (status, body) = send(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");

        let (status, _) = send(app, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        for uri in [
            "/api/v1/expenses",
            "/api/v1/auth/me",
            "/api/v1/organization/years",
            "/api/v1/admin/stats",
            "/download/1_1_invoice.pdf",
            "/export_accounting_excel?month=all",
        ] {
            let (status, body) = send(app.clone(), get(uri)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"], "UNAUTHORIZED", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_garbage_cookie_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let request = Request::builder()
            .uri("/api/v1/expenses")
            .header(COOKIE, "outlay_session=not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid session");
    }

    #[tokio::test]
    async fn test_sso_unconfigured_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let (status, _) = send(app.clone(), get("/api/v1/auth/sso/login")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(app, get("/auth/callback?code=abc&state=xyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_database_failure_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"username":"alice","password":"secret-pass"}"#))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], SANITIZED_MESSAGE);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.starts_with("outlay_session="));
    }

    #[test]
    fn test_body_limit_covers_three_files() {
        assert!(body_limit(10) >= 30);
        assert_eq!(body_limit(u64::MAX), usize::MAX);
    }
}
