//! Email service for sending transactional emails.
//!
//! Uses `lettre` over a STARTTLS SMTP relay.

use std::time::Duration;

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;

use crate::config::EmailConfig;

/// Email service errors.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Failed to build email message.
    #[error("Failed to build email: {0}")]
    BuildError(String),
    /// Failed to send email.
    #[error("Failed to send email: {0}")]
    SendError(String),
    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Email service for sending transactional emails.
#[derive(Debug, Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    /// Creates a new email service.
    #[must_use]
    pub const fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Base URL of the web UI.
    #[must_use]
    pub fn frontend_url(&self) -> &str {
        &self.config.frontend_url
    }

    fn create_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| EmailError::SendError(e.to_string()))?
                .port(self.config.smtp_port)
                .timeout(Some(Duration::from_secs(self.config.timeout_secs)));

        if !self.config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.smtp_username.clone(),
                self.config.smtp_password.clone(),
            ));
        }

        Ok(builder.build())
    }

    /// Builds an HTML message from the configured sender.
    fn build_message(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<Message, EmailError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        Message::builder()
            .from(
                from.parse()
                    .map_err(|e| EmailError::InvalidAddress(format!("{e}")))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| EmailError::InvalidAddress(format!("{e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| EmailError::BuildError(e.to_string()))
    }

    /// Sends one HTML email and waits for the relay to accept it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the relay rejects the message.
    pub async fn send_html(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = self.build_message(to_email, subject, html_body)?;
        let transport = self.create_transport()?;
        transport
            .send(email)
            .await
            .map_err(|e| EmailError::SendError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EmailService {
        EmailService::new(EmailConfig {
            smtp_username: "user".to_string(),
            smtp_password: "password".to_string(),
            from_email: "expenses@example.com".to_string(),
            from_name: "Expenses".to_string(),
            ..EmailConfig::default()
        })
    }

    #[tokio::test]
    async fn test_create_transport() {
        assert!(service().create_transport().is_ok());
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let result = service().build_message("not an address", "s", "<p>b</p>");
        assert!(matches!(result, Err(EmailError::InvalidAddress(_))));
    }

    #[test]
    fn test_build_message_is_html() {
        let message = service()
            .build_message("alice@example.com", "Subject", "<p>Hello</p>")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("From: Expenses <expenses@example.com>"));
    }

    #[test]
    fn test_email_error_display() {
        assert_eq!(
            format!("{}", EmailError::SendError("msg".into())),
            "Failed to send email: msg"
        );
    }
}
