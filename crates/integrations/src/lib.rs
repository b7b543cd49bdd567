//! Outbound HTTP clients for Outlay.
//!
//! Every client carries a finite timeout. Response parsing is kept in plain
//! functions so it can be tested without a network.

pub mod boi;
pub mod document_intelligence;
pub mod open_er;
pub mod sso;

pub use boi::BankOfIsraelSource;
pub use document_intelligence::DocumentIntelligenceClient;
pub use open_er::OpenErSource;
pub use sso::{SsoClient, SsoError, SsoIdentity};

use std::time::Duration;

/// Builds an HTTP client with a request timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(concat!("outlay/", env!("CARGO_PKG_VERSION")))
        .build()
}
