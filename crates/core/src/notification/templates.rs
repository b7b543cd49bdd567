//! Notification templates.

use handlebars::Handlebars;
use outlay_shared::types::round_money;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};

use super::error::NotificationError;

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
{{> content}}
<p style="color: #666; font-size: 12px;">This is an automated message from Outlay.</p>
</body>
</html>"#;

const EXPENSE_BLOCK: &str = r#"<table style="border-collapse: collapse;">
<tr><td><strong>Description</strong></td><td>{{expense.description}}</td></tr>
<tr><td><strong>Reason</strong></td><td>{{expense.reason}}</td></tr>
<tr><td><strong>Amount</strong></td><td>{{expense.amount}} {{expense.currency}}</td></tr>
<tr><td><strong>Department</strong></td><td>{{expense.department}}</td></tr>
</table>
<p><a href="{{link}}">View expense</a></p>"#;

/// Template name, subject and body for each notification.
const TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "submission_confirmation",
        "Expense submitted: {{expense.description}}",
        "<h2>Hello {{name}},</h2><p>Your expense request was received.</p>{{> expense}}",
    ),
    (
        "manager_heads_up",
        "New expense awaiting approval from {{submitter}}",
        "<h2>Hello {{name}},</h2><p>{{submitter}} submitted an expense that needs your approval.</p>{{> expense}}",
    ),
    (
        "approved",
        "Expense approved: {{expense.description}}",
        "<h2>Hello {{name}},</h2><p>Your expense was approved by {{handler}}.</p>{{> expense}}",
    ),
    (
        "rejected",
        "Expense rejected: {{expense.description}}",
        "<h2>Hello {{name}},</h2><p>Your expense was rejected by {{handler}}.</p><p><strong>Reason:</strong> {{reason}}</p>{{> expense}}",
    ),
    (
        "paid",
        "Expense paid: {{expense.description}}",
        "<h2>Hello {{name}},</h2><p>Your expense has been paid.</p>{{> expense}}",
    ),
    (
        "password_changed",
        "Your password was changed",
        "<h2>Hello {{name}},</h2><p>The password for your account was just changed. If this was not you, contact an administrator.</p>",
    ),
];

/// Expense details shown in notifications.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseSummary {
    /// Expense id.
    pub id: i32,
    /// Description.
    pub description: String,
    /// Business reason.
    pub reason: String,
    /// Amount in the expense's currency.
    pub amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Department name.
    pub department: String,
}

/// One notification to one recipient.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Sent to the submitter after submission.
    SubmissionConfirmation {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
        /// The expense.
        expense: ExpenseSummary,
    },
    /// Sent to each department manager for expenses needing approval.
    ManagerHeadsUp {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
        /// Submitter display name.
        submitter: String,
        /// The expense.
        expense: ExpenseSummary,
    },
    /// Sent to the submitter on approval.
    Approved {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
        /// Approver display name.
        handler: String,
        /// The expense.
        expense: ExpenseSummary,
    },
    /// Sent to the submitter on rejection.
    Rejected {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
        /// Rejecter display name.
        handler: String,
        /// Rejection reason.
        reason: String,
        /// The expense.
        expense: ExpenseSummary,
    },
    /// Sent to the submitter when marked paid.
    Paid {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
        /// The expense.
        expense: ExpenseSummary,
    },
    /// Sent after a password change.
    PasswordChanged {
        /// Recipient address.
        to: String,
        /// Recipient display name.
        name: String,
    },
}

impl Notification {
    /// Template name.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        match self {
            Self::SubmissionConfirmation { .. } => "submission_confirmation",
            Self::ManagerHeadsUp { .. } => "manager_heads_up",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Paid { .. } => "paid",
            Self::PasswordChanged { .. } => "password_changed",
        }
    }

    /// Recipient address.
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::SubmissionConfirmation { to, .. }
            | Self::ManagerHeadsUp { to, .. }
            | Self::Approved { to, .. }
            | Self::Rejected { to, .. }
            | Self::Paid { to, .. }
            | Self::PasswordChanged { to, .. } => to,
        }
    }

    fn context(&self, frontend_url: &str) -> Value {
        let expense_json = |expense: &ExpenseSummary| {
            json!({
                "description": expense.description,
                "reason": expense.reason,
                "amount": format!("{:.2}", round_money(expense.amount)),
                "currency": expense.currency,
                "department": expense.department,
            })
        };
        let link = |expense: &ExpenseSummary| {
            format!("{}/expenses/{}", frontend_url.trim_end_matches('/'), expense.id)
        };

        match self {
            Self::SubmissionConfirmation { name, expense, .. } | Self::Paid { name, expense, .. } => {
                json!({ "name": name, "expense": expense_json(expense), "link": link(expense) })
            }
            Self::ManagerHeadsUp {
                name,
                submitter,
                expense,
                ..
            } => json!({
                "name": name,
                "submitter": submitter,
                "expense": expense_json(expense),
                "link": link(expense),
            }),
            Self::Approved {
                name,
                handler,
                expense,
                ..
            } => json!({
                "name": name,
                "handler": handler,
                "expense": expense_json(expense),
                "link": link(expense),
            }),
            Self::Rejected {
                name,
                handler,
                reason,
                expense,
                ..
            } => json!({
                "name": name,
                "handler": handler,
                "reason": reason,
                "expense": expense_json(expense),
                "link": link(expense),
            }),
            Self::PasswordChanged { name, .. } => json!({ "name": name }),
        }
    }
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Compiled template registry.
#[derive(Debug)]
pub struct NotificationRenderer {
    registry: Handlebars<'static>,
    subjects: Handlebars<'static>,
    frontend_url: String,
}

impl NotificationRenderer {
    /// Compiles every template.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Template` if a template fails to compile.
    pub fn new(frontend_url: impl Into<String>) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_partial("expense", EXPENSE_BLOCK)?;

        // Subjects go into a header, not HTML.
        let mut subjects = Handlebars::new();
        subjects.set_strict_mode(true);
        subjects.register_escape_fn(handlebars::no_escape);

        for (name, subject, body) in TEMPLATES {
            subjects.register_template_string(name, subject)?;
            let page = LAYOUT.replace("{{> content}}", body);
            registry.register_template_string(name, page)?;
        }

        Ok(Self {
            registry,
            subjects,
            frontend_url: frontend_url.into(),
        })
    }

    /// Renders a notification.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Render` if the context is missing a field.
    pub fn render(&self, notification: &Notification) -> Result<RenderedEmail, NotificationError> {
        let name = notification.template();
        let context = notification.context(&self.frontend_url);

        let subject = self.subjects.render(name, &context)?;
        let html = self.registry.render(name, &context)?;

        Ok(RenderedEmail {
            to: notification.recipient().to_string(),
            subject,
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn summary(description: &str) -> ExpenseSummary {
        ExpenseSummary {
            id: 42,
            description: description.to_string(),
            reason: "dev tool".to_string(),
            amount: dec!(100),
            currency: "USD".to_string(),
            department: "R&D".to_string(),
        }
    }

    fn renderer() -> NotificationRenderer {
        NotificationRenderer::new("https://expenses.example.com/").unwrap()
    }

    #[test]
    fn test_every_template_renders() {
        let notifications = vec![
            Notification::SubmissionConfirmation {
                to: "alice@example.com".into(),
                name: "Alice".into(),
                expense: summary("IDE license"),
            },
            Notification::ManagerHeadsUp {
                to: "bob@example.com".into(),
                name: "Bob".into(),
                submitter: "Alice".into(),
                expense: summary("IDE license"),
            },
            Notification::Approved {
                to: "alice@example.com".into(),
                name: "Alice".into(),
                handler: "Bob".into(),
                expense: summary("IDE license"),
            },
            Notification::Rejected {
                to: "alice@example.com".into(),
                name: "Alice".into(),
                handler: "Bob".into(),
                reason: "over budget".into(),
                expense: summary("IDE license"),
            },
            Notification::Paid {
                to: "alice@example.com".into(),
                name: "Alice".into(),
                expense: summary("IDE license"),
            },
            Notification::PasswordChanged {
                to: "alice@example.com".into(),
                name: "Alice".into(),
            },
        ];

        let renderer = renderer();
        for notification in &notifications {
            let email = renderer.render(notification).unwrap();
            assert_eq!(email.to, notification.recipient());
            assert!(email.html.contains("Alice") || email.html.contains("Bob"));
            assert!(!email.subject.is_empty());
        }
    }

    #[test]
    fn test_html_is_escaped() {
        let email = renderer()
            .render(&Notification::SubmissionConfirmation {
                to: "alice@example.com".into(),
                name: "<script>alert(1)</script>".into(),
                expense: summary("<b>IDE</b>"),
            })
            .unwrap();

        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("R&amp;D"));
        assert_eq!(email.subject, "Expense submitted: <b>IDE</b>");
    }

    #[test]
    fn test_amount_and_link() {
        let email = renderer()
            .render(&Notification::Paid {
                to: "alice@example.com".into(),
                name: "Alice".into(),
                expense: summary("IDE license"),
            })
            .unwrap();

        assert!(email.html.contains("100.00 USD"));
        assert!(email.html.contains("https://expenses.example.com/expenses/42"));
    }
}
