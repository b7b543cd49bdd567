//! Microsoft Entra ID single sign-on (OAuth2 authorization code flow).

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use outlay_shared::config::SsoConfig;

const AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_ME: &str = "https://graph.microsoft.com/v1.0/me";
const SCOPES: &str = "openid profile email User.Read";

/// Error types for the SSO flow.
#[derive(Debug, thiserror::Error)]
pub enum SsoError {
    /// SSO settings are incomplete.
    #[error("Single sign-on is not configured")]
    NotConfigured,

    /// The provider rejected the authorization code.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The identity lookup failed or returned no email.
    #[error("Identity lookup failed: {0}")]
    Identity(String),
}

impl SsoError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotConfigured => 503,
            Self::TokenExchange(_) => 401,
            Self::Identity(_) => 502,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "SSO_NOT_CONFIGURED",
            Self::TokenExchange(_) => "SSO_TOKEN_EXCHANGE_FAILED",
            Self::Identity(_) => "SSO_IDENTITY_FAILED",
        }
    }
}

/// The claims consumed from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoIdentity {
    /// Lowercased email.
    pub email: String,
    /// Display name.
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

/// SSO client for one tenant and application.
#[derive(Debug, Clone)]
pub struct SsoClient {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SsoClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` unless every setting is present.
    pub fn from_config(client: Client, config: &SsoConfig) -> Result<Self, SsoError> {
        if !config.is_configured() {
            return Err(SsoError::NotConfigured);
        }
        let field = |v: &Option<String>| v.clone().ok_or(SsoError::NotConfigured);
        Ok(Self {
            client,
            tenant_id: field(&config.tenant_id)?,
            client_id: field(&config.client_id)?,
            client_secret: field(&config.client_secret)?,
            redirect_uri: field(&config.redirect_uri)?,
        })
    }

    /// The provider URL the browser is redirected to.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` if the tenant id makes an invalid URL.
    pub fn authorize_url(&self, state: &str) -> Result<String, SsoError> {
        let mut url = Url::parse(&format!(
            "{AUTHORITY}/{}/oauth2/v2.0/authorize",
            self.tenant_id
        ))
        .map_err(|_| SsoError::NotConfigured)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchanges an authorization code and reads the user's identity.
    ///
    /// # Errors
    ///
    /// Returns `TokenExchange` or `Identity` on provider failures.
    pub async fn exchange_code(&self, code: &str) -> Result<SsoIdentity, SsoError> {
        let token_url = format!("{AUTHORITY}/{}/oauth2/v2.0/token", self.tenant_id);
        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPES),
            ])
            .send()
            .await
            .map_err(|e| SsoError::TokenExchange(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "SSO token exchange rejected");
            return Err(SsoError::TokenExchange(status.to_string()));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SsoError::TokenExchange(e.to_string()))?;

        let user: GraphUser = self
            .client
            .get(GRAPH_ME)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| SsoError::Identity(e.to_string()))?
            .error_for_status()
            .map_err(|e| SsoError::Identity(e.to_string()))?
            .json()
            .await
            .map_err(|e| SsoError::Identity(e.to_string()))?;

        let identity = identity_from(user)?;
        debug!(email = %identity.email, "SSO identity resolved");
        Ok(identity)
    }
}

fn identity_from(user: GraphUser) -> Result<SsoIdentity, SsoError> {
    let email = user
        .mail
        .filter(|m| m.contains('@'))
        .or(user.user_principal_name.filter(|u| u.contains('@')))
        .map(|e| e.trim().to_lowercase())
        .ok_or_else(|| SsoError::Identity("no email claim".into()))?;
    let name = user
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    Ok(SsoIdentity { email, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> SsoConfig {
        SsoConfig {
            tenant_id: Some("tenant-1".into()),
            client_id: Some("app-1".into()),
            client_secret: Some("secret".into()),
            redirect_uri: Some("https://outlay.example/auth/callback".into()),
        }
    }

    #[rstest]
    #[case::tenant(|c: &mut SsoConfig| c.tenant_id = None)]
    #[case::client_id(|c: &mut SsoConfig| c.client_id = None)]
    #[case::secret(|c: &mut SsoConfig| c.client_secret = None)]
    #[case::redirect(|c: &mut SsoConfig| c.redirect_uri = Some(String::new()))]
    fn test_incomplete_config_is_rejected(#[case] strip: fn(&mut SsoConfig)) {
        let mut partial = config();
        strip(&mut partial);
        assert!(matches!(
            SsoClient::from_config(Client::new(), &partial),
            Err(SsoError::NotConfigured)
        ));
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let client = SsoClient::from_config(Client::new(), &config()).unwrap();
        let url = Url::parse(&client.authorize_url("abc123").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(url.path(), "/tenant-1/oauth2/v2.0/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["state"], "abc123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://outlay.example/auth/callback");
    }

    #[test]
    fn test_identity_prefers_mail() {
        let identity = identity_from(GraphUser {
            display_name: Some("Dana Levi".into()),
            mail: Some("Dana@Corp.Example".into()),
            user_principal_name: Some("dlevi@tenant.onmicrosoft.com".into()),
        })
        .unwrap();
        assert_eq!(identity.email, "dana@corp.example");
        assert_eq!(identity.name, "Dana Levi");
    }

    #[test]
    fn test_identity_falls_back_to_upn() {
        let identity = identity_from(GraphUser {
            display_name: None,
            mail: None,
            user_principal_name: Some("dlevi@corp.example".into()),
        })
        .unwrap();
        assert_eq!(identity.email, "dlevi@corp.example");
        assert_eq!(identity.name, "dlevi");
    }

    #[test]
    fn test_identity_without_email_fails() {
        assert!(identity_from(GraphUser {
            display_name: Some("x".into()),
            mail: None,
            user_principal_name: Some("not-an-email".into()),
        })
        .is_err());
    }
}
