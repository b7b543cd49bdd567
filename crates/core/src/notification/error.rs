//! Notification errors.

use outlay_shared::email::EmailError;
use thiserror::Error;

/// Errors raised while rendering or sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// A template failed to compile.
    #[error("Invalid template: {0}")]
    Template(String),

    /// A template failed to render.
    #[error("Failed to render notification: {0}")]
    Render(String),

    /// The mail transport failed.
    #[error(transparent)]
    Email(#[from] EmailError),
}

impl NotificationError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Template(_) | Self::Render(_) => 500,
            Self::Email(_) => 502,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Render(_) => "RENDER_ERROR",
            Self::Email(_) => "EMAIL_ERROR",
        }
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Render(err.to_string())
    }
}
