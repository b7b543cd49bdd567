//! Expense domain types.
//!
//! Every enum here is persisted and rendered by its lowercase snake_case
//! name, so `as_str` and `parse` are the single source of those names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the persisted name.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parses the persisted name, ignoring ASCII case.
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

/// Approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    /// Awaiting a manager.
    Pending,
    /// Approved (or pre-approved at submission).
    Approved,
    /// Rejected with a reason.
    Rejected,
}

string_enum!(ExpenseStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// How an expense enters the approval flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseType {
    /// Needs a manager decision.
    NeedsApproval,
    /// Approved by the submitter at submission.
    PreApproved,
    /// Approved, but excluded from spending totals.
    FutureApproval,
}

string_enum!(ExpenseType {
    NeedsApproval => "needs_approval",
    PreApproved => "pre_approved",
    FutureApproval => "future_approval",
});

/// Accounting-visible payment sub-state of an approved expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not yet looked at by accounting.
    #[default]
    PendingAttention,
    /// Scheduled for payment.
    PendingPayment,
    /// Paid.
    Paid,
}

string_enum!(PaymentStatus {
    PendingAttention => "pending_attention",
    PendingPayment => "pending_payment",
    Paid => "paid",
});

/// Payment instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Company credit card.
    Credit,
    /// Bank transfer.
    BankTransfer,
    /// Standing order.
    StandingOrder,
    /// Check.
    Check,
}

string_enum!(PaymentMethod {
    Credit => "credit",
    BankTransfer => "bank_transfer",
    StandingOrder => "standing_order",
    Check => "check",
});

/// When in the month the payment is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDueDate {
    /// Start of month.
    StartOfMonth,
    /// End of month.
    EndOfMonth,
}

string_enum!(PaymentDueDate {
    StartOfMonth => "start_of_month",
    EndOfMonth => "end_of_month",
});

/// Attachment slot on an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Price quote.
    Quote,
    /// Invoice.
    Invoice,
    /// Receipt.
    Receipt,
}

string_enum!(AttachmentKind {
    Quote => "quote",
    Invoice => "invoice",
    Receipt => "receipt",
});

/// The mutable workflow fields of an expense.
///
/// Transitions take a state and return an [`ExpenseAction`]; applying the
/// action yields the next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseState {
    /// Approval status.
    pub status: ExpenseStatus,
    /// Set iff rejected.
    pub rejection_reason: Option<String>,
    /// Approving or rejecting user.
    pub handler_id: Option<i32>,
    /// When the decision was made.
    pub handled_at: Option<DateTime<Utc>>,
    /// Mirrors `payment_status == Paid`.
    pub is_paid: bool,
    /// Who marked it paid.
    pub paid_by_id: Option<i32>,
    /// When it was marked paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Payment sub-state.
    pub payment_status: PaymentStatus,
    /// Recorded in the external accounting system.
    pub external_entry: bool,
    /// Who set the external flag.
    pub external_entry_by: Option<i32>,
    /// When the external flag was set.
    pub external_entry_at: Option<DateTime<Utc>>,
}

impl ExpenseState {
    /// A fresh pending expense.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: ExpenseStatus::Pending,
            rejection_reason: None,
            handler_id: None,
            handled_at: None,
            is_paid: false,
            paid_by_id: None,
            paid_at: None,
            payment_status: PaymentStatus::PendingAttention,
            external_entry: false,
            external_entry_by: None,
            external_entry_at: None,
        }
    }

    /// Checks the cross-field invariants.
    ///
    /// - rejected implies a non-empty rejection reason
    /// - `is_paid` iff `payment_status == Paid` iff `paid_at` is set
    /// - not approved implies not paid and no external entry
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let rejection_ok = self.status != ExpenseStatus::Rejected
            || self
                .rejection_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty());
        let paid_ok = self.is_paid == (self.payment_status == PaymentStatus::Paid)
            && self.is_paid == self.paid_at.is_some();
        let approval_ok =
            self.status == ExpenseStatus::Approved || (!self.is_paid && !self.external_entry);
        rejection_ok && paid_ok && approval_ok
    }

    /// Applies a transition.
    #[must_use]
    pub fn apply(&self, action: &ExpenseAction) -> Self {
        let mut next = self.clone();
        match action {
            ExpenseAction::Approve {
                handler_id,
                handled_at,
            } => {
                next.status = ExpenseStatus::Approved;
                next.handler_id = Some(*handler_id);
                next.handled_at = Some(*handled_at);
                next.rejection_reason = None;
            }
            ExpenseAction::Reject {
                handler_id,
                handled_at,
                reason,
            } => {
                next.status = ExpenseStatus::Rejected;
                next.handler_id = Some(*handler_id);
                next.handled_at = Some(*handled_at);
                next.rejection_reason = Some(reason.clone());
            }
            ExpenseAction::MarkPendingPayment => {
                next.payment_status = PaymentStatus::PendingPayment;
            }
            ExpenseAction::MarkPaid { paid_by, paid_at } => {
                next.payment_status = PaymentStatus::Paid;
                next.is_paid = true;
                next.paid_by_id = Some(*paid_by);
                next.paid_at = Some(*paid_at);
            }
            ExpenseAction::MarkUnpaid => {
                next.payment_status = PaymentStatus::PendingAttention;
                next.is_paid = false;
                next.paid_by_id = None;
                next.paid_at = None;
            }
            ExpenseAction::SetExternalEntry { value, by, at } => {
                next.external_entry = *value;
                next.external_entry_by = value.then_some(*by);
                next.external_entry_at = if *value { Some(*at) } else { None };
            }
        }
        next
    }
}

/// A validated transition with its audit stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpenseAction {
    /// pending → approved.
    Approve {
        /// Deciding user.
        handler_id: i32,
        /// Decision time.
        handled_at: DateTime<Utc>,
    },
    /// pending → rejected.
    Reject {
        /// Deciding user.
        handler_id: i32,
        /// Decision time.
        handled_at: DateTime<Utc>,
        /// Non-empty reason.
        reason: String,
    },
    /// pending_attention → pending_payment.
    MarkPendingPayment,
    /// pending_payment → paid.
    MarkPaid {
        /// Accounting user.
        paid_by: i32,
        /// Payment time.
        paid_at: DateTime<Utc>,
    },
    /// pending_payment | paid → pending_attention.
    MarkUnpaid,
    /// Sets or clears the external-entry flag.
    SetExternalEntry {
        /// New flag value.
        value: bool,
        /// Acting user.
        by: i32,
        /// Action time.
        at: DateTime<Utc>,
    },
}

impl ExpenseAction {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::MarkPendingPayment => "mark_pending_payment",
            Self::MarkPaid { .. } => "mark_paid",
            Self::MarkUnpaid => "mark_unpaid",
            Self::SetExternalEntry { .. } => "set_external_entry",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pending", Some(ExpenseStatus::Pending))]
    #[case("APPROVED", Some(ExpenseStatus::Approved))]
    #[case("rejected", Some(ExpenseStatus::Rejected))]
    #[case("draft", None)]
    fn test_status_parse(#[case] input: &str, #[case] expected: Option<ExpenseStatus>) {
        assert_eq!(ExpenseStatus::parse(input), expected);
    }

    #[test]
    fn test_names_match_serde() {
        for t in ExpenseType::ALL {
            assert_eq!(
                serde_json::to_string(t).unwrap(),
                format!("\"{}\"", t.as_str())
            );
        }
        for p in PaymentStatus::ALL {
            assert_eq!(
                serde_json::to_string(p).unwrap(),
                format!("\"{}\"", p.as_str())
            );
        }
        for m in PaymentMethod::ALL {
            assert_eq!(
                serde_json::to_string(m).unwrap(),
                format!("\"{}\"", m.as_str())
            );
        }
        for d in PaymentDueDate::ALL {
            assert_eq!(
                serde_json::to_string(d).unwrap(),
                format!("\"{}\"", d.as_str())
            );
        }
    }

    #[test]
    fn test_pending_is_consistent() {
        assert!(ExpenseState::pending().is_consistent());
    }

    #[test]
    fn test_rejected_without_reason_is_inconsistent() {
        let state = ExpenseState {
            status: ExpenseStatus::Rejected,
            rejection_reason: Some("  ".into()),
            ..ExpenseState::pending()
        };
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_paid_without_timestamp_is_inconsistent() {
        let state = ExpenseState {
            status: ExpenseStatus::Approved,
            is_paid: true,
            payment_status: PaymentStatus::Paid,
            ..ExpenseState::pending()
        };
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_external_entry_clear_drops_stamps() {
        let now = Utc::now();
        let approved = ExpenseState {
            status: ExpenseStatus::Approved,
            ..ExpenseState::pending()
        };
        let set = approved.apply(&ExpenseAction::SetExternalEntry {
            value: true,
            by: 3,
            at: now,
        });
        assert_eq!(set.external_entry_by, Some(3));
        let cleared = set.apply(&ExpenseAction::SetExternalEntry {
            value: false,
            by: 3,
            at: now,
        });
        assert!(!cleared.external_entry);
        assert_eq!(cleared.external_entry_by, None);
        assert_eq!(cleared.external_entry_at, None);
    }
}
