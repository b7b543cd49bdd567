//! Outlay API Server
//!
//! Main entry point for the expense management service.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outlay_api::{AppState, create_router};
use outlay_core::currency::{CurrencyService, RateSource};
use outlay_core::document::{DocumentAnalyzer, DocumentExtractor};
use outlay_core::notification::{NotificationDispatcher, NotificationRenderer};
use outlay_core::storage::UploadStore;
use outlay_db::{ExchangeRateRepository, connect_with_pool};
use outlay_integrations::{
    BankOfIsraelSource, DocumentIntelligenceClient, OpenErSource, SsoClient, http_client,
};
use outlay_shared::AppConfig;
use outlay_shared::email::EmailService;
use outlay_shared::jwt::SessionTokens;

const SSO_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outlay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    // Exchange rates: Bank of Israel first, the open API as fallback
    let rate_client = http_client(Duration::from_secs(config.currency.source_timeout_secs))?;
    let sources: Vec<Arc<dyn RateSource>> = vec![
        Arc::new(BankOfIsraelSource::new(rate_client.clone())),
        Arc::new(OpenErSource::new(rate_client)),
    ];
    let currency = CurrencyService::new(
        config.currency.base.clone(),
        Arc::new(ExchangeRateRepository::new(db.clone())),
        sources,
    );
    info!(base = %config.currency.base, "Currency service configured");

    let ocr_client = http_client(Duration::from_secs(config.ocr.timeout_secs))?;
    let analyzer = DocumentIntelligenceClient::from_config(ocr_client, &config.ocr)
        .map(|client| Arc::new(client) as Arc<dyn DocumentAnalyzer>);
    if analyzer.is_none() {
        warn!("Document analysis not configured; extraction disabled");
    }
    let extractor = DocumentExtractor::new(analyzer);

    let uploads = UploadStore::open(
        config.storage.upload_root.clone(),
        config.storage.max_file_size,
    )?;
    info!(root = %config.storage.upload_root, "Upload storage ready");

    let renderer = NotificationRenderer::new(config.email.frontend_url.clone())?;
    let email_service = EmailService::new(config.email.clone());
    let notifier = NotificationDispatcher::new(Arc::new(renderer), Arc::new(email_service));
    info!(
        smtp_host = %config.email.smtp_host,
        "Email service configured"
    );

    let sso = if config.sso.is_configured() {
        let client = http_client(SSO_TIMEOUT)?;
        match SsoClient::from_config(client, &config.sso) {
            Ok(sso) => Some(Arc::new(sso)),
            Err(e) => {
                warn!(error = %e, "SSO configuration rejected; SSO disabled");
                None
            }
        }
    } else {
        None
    };

    let state = AppState {
        db: Arc::new(db),
        sessions: Arc::new(SessionTokens::new(&config.session)),
        currency: Arc::new(currency),
        extractor: Arc::new(extractor),
        uploads: Arc::new(uploads),
        notifier: Arc::new(notifier),
        sso,
        config: Arc::new(config),
    };

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
