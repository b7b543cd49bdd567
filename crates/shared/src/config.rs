//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Session cookie configuration.
    pub session: SessionConfig,
    /// Outbound email configuration.
    #[serde(default)]
    pub email: EmailConfig,
    /// Document analysis (OCR) configuration.
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Single sign-on configuration.
    #[serde(default)]
    pub sso: SsoConfig,
    /// Upload storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Currency normalization configuration.
    #[serde(default)]
    pub currency: CurrencyConfig,
    /// Organization defaults.
    #[serde(default)]
    pub organization: OrganizationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret key for signing session tokens.
    pub secret: String,
    /// Session lifetime in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Whether the cookie carries the `Secure` attribute.
    #[serde(default = "default_true")]
    pub secure: bool,
}

fn default_ttl_hours() -> i64 {
    12
}

fn default_cookie_name() -> String {
    "outlay_session".to_string()
}

const fn default_true() -> bool {
    true
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP relay port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub smtp_username: String,
    /// SMTP password.
    #[serde(default)]
    pub smtp_password: String,
    /// Sender address.
    #[serde(default = "default_from_email")]
    pub from_email: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Base URL of the web UI, used for links in emails.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Timeout for one SMTP exchange.
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            frontend_url: default_frontend_url(),
            timeout_secs: default_email_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Outlay".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_email_timeout() -> u64 {
    10
}

/// Document analysis service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Service endpoint, e.g. `https://<name>.cognitiveservices.azure.com`.
    pub endpoint: Option<String>,
    /// Subscription key.
    pub api_key: Option<String>,
    /// Timeout for a single analyze call including polling.
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
    /// Model id used for invoices.
    #[serde(default = "default_invoice_model")]
    pub invoice_model: String,
    /// Model id used for receipts.
    #[serde(default = "default_receipt_model")]
    pub receipt_model: String,
    /// Model id used for quotes.
    #[serde(default = "default_quote_model")]
    pub quote_model: String,
}

impl OcrConfig {
    /// OCR is usable only when both endpoint and key are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|s| !s.is_empty())
            && self.api_key.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_ocr_timeout(),
            invoice_model: default_invoice_model(),
            receipt_model: default_receipt_model(),
            quote_model: default_quote_model(),
        }
    }
}

fn default_ocr_timeout() -> u64 {
    30
}

fn default_invoice_model() -> String {
    "prebuilt-invoice".to_string()
}

fn default_receipt_model() -> String {
    "prebuilt-receipt".to_string()
}

fn default_quote_model() -> String {
    "prebuilt-invoice".to_string()
}

/// Single sign-on (OAuth2 authorization code) configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsoConfig {
    /// Directory tenant.
    pub tenant_id: Option<String>,
    /// Registered application id.
    pub client_id: Option<String>,
    /// Application secret.
    pub client_secret: Option<String>,
    /// Callback URL registered at the provider.
    pub redirect_uri: Option<String>,
}

impl SsoConfig {
    /// SSO is enabled only when every field is set.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        [
            &self.tenant_id,
            &self.client_id,
            &self.client_secret,
            &self.redirect_uri,
        ]
        .iter()
        .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every attachment.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,
    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_upload_root() -> String {
    "./uploads".to_string()
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024
}

/// Currency normalization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// Base currency all amounts normalize into.
    #[serde(default = "default_base_currency")]
    pub base: String,
    /// Timeout per rate source request.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            base: default_base_currency(),
            source_timeout_secs: default_source_timeout(),
        }
    }
}

fn default_base_currency() -> String {
    "ILS".to_string()
}

fn default_source_timeout() -> u64 {
    10
}

/// Organization defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationConfig {
    /// Department name assigned to users created through SSO.
    #[serde(default = "default_department")]
    pub default_department: String,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            default_department: default_department(),
        }
    }
}

fn default_department() -> String {
    "General".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("OUTLAY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_with(vars: &[(&str, Option<&str>)]) -> Result<AppConfig, config::ConfigError> {
        temp_env::with_vars(vars, AppConfig::load)
    }

    #[test]
    fn test_load_minimal_applies_defaults() {
        let config = load_with(&[
            ("OUTLAY__DATABASE__URL", Some("postgres://localhost/outlay")),
            ("OUTLAY__SESSION__SECRET", Some("secret")),
        ])
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.cookie_name, "outlay_session");
        assert_eq!(config.session.ttl_hours, 12);
        assert_eq!(config.email.smtp_port, 587);
        assert_eq!(config.storage.upload_root, "./uploads");
        assert_eq!(config.currency.base, "ILS");
        assert_eq!(config.organization.default_department, "General");
        assert!(!config.ocr.is_configured());
        assert!(!config.sso.is_configured());
    }

    #[test]
    fn test_load_reads_nested_overrides() {
        let config = load_with(&[
            ("OUTLAY__DATABASE__URL", Some("postgres://localhost/outlay")),
            ("OUTLAY__SESSION__SECRET", Some("secret")),
            ("OUTLAY__SERVER__PORT", Some("9000")),
            (
                "OUTLAY__SERVER__CORS_ORIGINS",
                Some("http://a.test,http://b.test"),
            ),
            ("OUTLAY__OCR__ENDPOINT", Some("https://ocr.test")),
            ("OUTLAY__OCR__API_KEY", Some("k")),
        ])
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(config.ocr.is_configured());
    }

    #[test]
    fn test_load_requires_database_url() {
        let result = load_with(&[
            ("OUTLAY__DATABASE__URL", None),
            ("OUTLAY__SESSION__SECRET", Some("secret")),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sso_requires_every_field() {
        let mut sso = SsoConfig {
            tenant_id: Some("t".into()),
            client_id: Some("c".into()),
            client_secret: Some("s".into()),
            redirect_uri: None,
        };
        assert!(!sso.is_configured());
        sso.redirect_uri = Some("http://localhost/auth/callback".into());
        assert!(sso.is_configured());
    }
}
