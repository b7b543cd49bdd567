//! Fire-and-log notification dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use outlay_shared::email::EmailService;
use tracing::{error, info, warn};

use super::error::NotificationError;
use super::templates::{Notification, NotificationRenderer};

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one HTML email.
    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError>;
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError> {
        Ok(Self::send_html(self, to, subject, html).await?)
    }
}

/// Renders and sends notifications, swallowing failures.
#[derive(Clone)]
pub struct NotificationDispatcher {
    renderer: Arc<NotificationRenderer>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(renderer: Arc<NotificationRenderer>, mailer: Arc<dyn Mailer>) -> Self {
        Self { renderer, mailer }
    }

    /// Sends one notification. Returns whether it was delivered.
    ///
    /// Failures are logged and never propagated.
    pub async fn dispatch(&self, notification: Notification) -> bool {
        let template = notification.template();
        let email = match self.renderer.render(&notification) {
            Ok(email) => email,
            Err(e) => {
                error!(template, error = %e, "Failed to render notification");
                return false;
            }
        };

        match self
            .mailer
            .send_html(&email.to, &email.subject, &email.html)
            .await
        {
            Ok(()) => {
                info!(template, to = %email.to, "Notification sent");
                true
            }
            Err(e) => {
                warn!(template, to = %email.to, error = %e, "Failed to send notification");
                false
            }
        }
    }

    /// Sends several notifications in order. Returns how many were delivered.
    pub async fn dispatch_all(&self, notifications: Vec<Notification>) -> usize {
        let mut delivered = 0;
        for notification in notifications {
            if self.dispatch(notification).await {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;
    use crate::notification::RenderedEmail;

    /// Records sent mail; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub fail: bool,
        pub sent: Mutex<Vec<RenderedEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError> {
            if self.fail {
                return Err(outlay_shared::email::EmailError::SendError("relay down".into()).into());
            }
            self.sent.lock().unwrap().push(RenderedEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                html: html.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::RecordingMailer;
    use super::*;

    fn dispatcher(mailer: Arc<RecordingMailer>) -> NotificationDispatcher {
        let renderer = Arc::new(NotificationRenderer::new("http://localhost:3000").unwrap());
        NotificationDispatcher::new(renderer, mailer)
    }

    fn password_changed(to: &str) -> Notification {
        Notification::PasswordChanged {
            to: to.to_string(),
            name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_rendered_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let delivered = dispatcher(mailer.clone())
            .dispatch(password_changed("alice@example.com"))
            .await;

        assert!(delivered);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, "Your password was changed");
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let delivered = dispatcher(mailer)
            .dispatch_all(vec![
                password_changed("a@example.com"),
                password_changed("b@example.com"),
            ])
            .await;

        assert_eq!(delivered, 0);
    }
}
