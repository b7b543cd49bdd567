//! Expense engine.
//!
//! Submission validation, the approval machine (pending → approved |
//! rejected), the payment-status machine on approved expenses and the
//! independent external-entry flag.
//!
//! ```text
//! pending_attention ──mark_pending_payment──▶ pending_payment ──mark_paid──▶ paid
//!       ▲                                           │                         │
//!       └────────────────── mark_unpaid ────────────┴──────── mark_unpaid ────┘
//! ```

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::ExpenseError;
pub use service::{ExpenseWorkflow, SubmissionInput, ValidSubmission};
pub use types::{
    AttachmentKind, ExpenseAction, ExpenseState, ExpenseStatus, ExpenseType, PaymentDueDate,
    PaymentMethod, PaymentStatus,
};
