//! Email notifications.
//!
//! Templates render with HTML escaping through `handlebars`. Sending goes
//! through the [`Mailer`] seam; failures are logged by the dispatcher and
//! never reach the caller, whose transaction has already committed.

pub mod dispatcher;
pub mod error;
pub mod templates;

pub use dispatcher::{Mailer, NotificationDispatcher};
pub use error::NotificationError;
pub use templates::{ExpenseSummary, Notification, NotificationRenderer, RenderedEmail};
