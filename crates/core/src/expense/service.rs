//! Expense state machines: approval and payment status.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use outlay_shared::types::{MAX_AMOUNT, round_money};

use super::error::ExpenseError;
use super::types::{ExpenseAction, ExpenseState, ExpenseStatus, ExpenseType, PaymentStatus};

/// Required submission inputs, before persistence.
#[derive(Debug, Clone)]
pub struct SubmissionInput<'a> {
    /// Amount in `currency`.
    pub amount: Decimal,
    /// Three-letter currency code.
    pub currency: &'a str,
    /// What was bought.
    pub description: &'a str,
    /// Why it was needed.
    pub reason: &'a str,
    /// Approval flow.
    pub expense_type: ExpenseType,
    /// Target subcategory.
    pub subcategory_id: Option<i32>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidSubmission {
    /// Target subcategory.
    pub subcategory_id: i32,
    /// Amount rounded to cents; normalize and store this one.
    pub amount: Decimal,
}

/// Stateless service validating expense transitions.
///
/// Each method checks the current state and returns the [`ExpenseAction`]
/// carrying the audit stamps; persisting it is the caller's job.
pub struct ExpenseWorkflow;

impl ExpenseWorkflow {
    /// Rounds an amount to cents and checks it fits the stored range.
    ///
    /// # Errors
    ///
    /// `AmountNotPositive` when the rounded amount is zero or negative,
    /// `AmountTooLarge` above [`MAX_AMOUNT`].
    pub fn money_amount(amount: Decimal) -> Result<Decimal, ExpenseError> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(ExpenseError::AmountNotPositive);
        }
        if amount > MAX_AMOUNT {
            return Err(ExpenseError::AmountTooLarge(MAX_AMOUNT));
        }
        Ok(amount)
    }

    /// Validates the required submission fields.
    ///
    /// # Errors
    ///
    /// See [`Self::money_amount`] for the amount; `MissingField` for blank
    /// text or a missing subcategory, `InvalidField` for a malformed
    /// currency code.
    pub fn validate_submission(
        input: &SubmissionInput<'_>,
    ) -> Result<ValidSubmission, ExpenseError> {
        let amount = Self::money_amount(input.amount)?;
        if input.currency.trim().is_empty() {
            return Err(ExpenseError::MissingField("currency"));
        }
        input
            .currency
            .parse::<outlay_shared::types::CurrencyCode>()
            .map_err(|message| ExpenseError::InvalidField {
                field: "currency",
                message,
            })?;
        if input.description.trim().is_empty() {
            return Err(ExpenseError::MissingField("description"));
        }
        if input.reason.trim().is_empty() {
            return Err(ExpenseError::MissingField("reason"));
        }
        let subcategory_id = input
            .subcategory_id
            .ok_or(ExpenseError::MissingField("subcategory_id"))?;
        Ok(ValidSubmission {
            subcategory_id,
            amount,
        })
    }

    /// Date used for currency normalization: invoice date when given,
    /// otherwise the submission date.
    #[must_use]
    pub fn effective_rate_date(
        invoice_date: Option<NaiveDate>,
        submitted_at: DateTime<Utc>,
    ) -> NaiveDate {
        invoice_date.unwrap_or_else(|| submitted_at.date_naive())
    }

    /// Initial workflow state for a new submission.
    ///
    /// `needs_approval` starts pending. `pre_approved` and `future_approval`
    /// start approved with the submitter as handler.
    #[must_use]
    pub fn initial_state(
        expense_type: ExpenseType,
        submitter_id: i32,
        now: DateTime<Utc>,
    ) -> ExpenseState {
        match expense_type {
            ExpenseType::NeedsApproval => ExpenseState::pending(),
            ExpenseType::PreApproved | ExpenseType::FutureApproval => ExpenseState {
                status: ExpenseStatus::Approved,
                handler_id: Some(submitter_id),
                handled_at: Some(now),
                ..ExpenseState::pending()
            },
        }
    }

    /// Approve a pending expense.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the expense is pending.
    pub fn approve(state: &ExpenseState, handler_id: i32) -> Result<ExpenseAction, ExpenseError> {
        Self::require_pending(state, "approve")?;
        Ok(ExpenseAction::Approve {
            handler_id,
            handled_at: Utc::now(),
        })
    }

    /// Reject a pending expense with a reason.
    ///
    /// # Errors
    ///
    /// `RejectionReasonRequired` for a blank reason, `InvalidTransition`
    /// unless the expense is pending.
    pub fn reject(
        state: &ExpenseState,
        handler_id: i32,
        reason: &str,
    ) -> Result<ExpenseAction, ExpenseError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ExpenseError::RejectionReasonRequired);
        }
        Self::require_pending(state, "reject")?;
        Ok(ExpenseAction::Reject {
            handler_id,
            handled_at: Utc::now(),
            reason: reason.to_string(),
        })
    }

    /// pending_attention → pending_payment.
    ///
    /// # Errors
    ///
    /// `NotApproved` or `InvalidTransition`.
    pub fn mark_pending_payment(state: &ExpenseState) -> Result<ExpenseAction, ExpenseError> {
        Self::require_approved(state)?;
        match state.payment_status {
            PaymentStatus::PendingAttention => Ok(ExpenseAction::MarkPendingPayment),
            other => Err(Self::payment_transition(other, "mark_pending_payment")),
        }
    }

    /// pending_payment → paid.
    ///
    /// # Errors
    ///
    /// `NotApproved` or `InvalidTransition`.
    pub fn mark_paid(state: &ExpenseState, paid_by: i32) -> Result<ExpenseAction, ExpenseError> {
        Self::require_approved(state)?;
        match state.payment_status {
            PaymentStatus::PendingPayment => Ok(ExpenseAction::MarkPaid {
                paid_by,
                paid_at: Utc::now(),
            }),
            other => Err(Self::payment_transition(other, "mark_paid")),
        }
    }

    /// pending_payment | paid → pending_attention; clears the paid stamps.
    ///
    /// # Errors
    ///
    /// `NotApproved` or `InvalidTransition`.
    pub fn mark_unpaid(state: &ExpenseState) -> Result<ExpenseAction, ExpenseError> {
        Self::require_approved(state)?;
        match state.payment_status {
            PaymentStatus::PendingPayment | PaymentStatus::Paid => Ok(ExpenseAction::MarkUnpaid),
            PaymentStatus::PendingAttention => Err(Self::payment_transition(
                PaymentStatus::PendingAttention,
                "mark_unpaid",
            )),
        }
    }

    /// Sets or clears the external accounting flag, independent of payment.
    ///
    /// # Errors
    ///
    /// `NotApproved` unless the expense is approved.
    pub fn set_external_entry(
        state: &ExpenseState,
        value: bool,
        by: i32,
    ) -> Result<ExpenseAction, ExpenseError> {
        Self::require_approved(state)?;
        Ok(ExpenseAction::SetExternalEntry {
            value,
            by,
            at: Utc::now(),
        })
    }

    /// Whether an expense may be deleted at all.
    ///
    /// # Errors
    ///
    /// `Locked` when paid or entered externally.
    pub fn check_deletable(expense_id: i32, state: &ExpenseState) -> Result<(), ExpenseError> {
        if state.is_paid || state.external_entry {
            return Err(ExpenseError::Locked(expense_id));
        }
        Ok(())
    }

    /// Whether an expense may be edited or deleted right now.
    ///
    /// Paid or externally entered expenses are locked for everyone. Outside
    /// `pending`, only an editor with `any_status` (admin) may proceed.
    ///
    /// # Errors
    ///
    /// `Locked`, or `InvalidTransition` for a decided expense.
    pub fn check_editable(
        expense_id: i32,
        state: &ExpenseState,
        any_status: bool,
    ) -> Result<(), ExpenseError> {
        Self::check_deletable(expense_id, state)?;
        if any_status {
            Ok(())
        } else {
            Self::require_pending(state, "edit")
        }
    }

    /// Check if a payment-status transition is valid.
    #[must_use]
    pub fn is_valid_payment_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        matches!(
            (from, to),
            (PaymentStatus::PendingAttention, PaymentStatus::PendingPayment)
                | (PaymentStatus::PendingPayment, PaymentStatus::Paid)
                | (
                    PaymentStatus::PendingPayment | PaymentStatus::Paid,
                    PaymentStatus::PendingAttention
                )
        )
    }

    fn require_pending(state: &ExpenseState, action: &'static str) -> Result<(), ExpenseError> {
        if state.status == ExpenseStatus::Pending {
            Ok(())
        } else {
            Err(ExpenseError::InvalidTransition {
                from: state.status.as_str().to_string(),
                action,
            })
        }
    }

    fn require_approved(state: &ExpenseState) -> Result<(), ExpenseError> {
        if state.status == ExpenseStatus::Approved {
            Ok(())
        } else {
            Err(ExpenseError::NotApproved)
        }
    }

    fn payment_transition(from: PaymentStatus, action: &'static str) -> ExpenseError {
        ExpenseError::InvalidTransition {
            from: from.as_str().to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn approved() -> ExpenseState {
        ExpenseWorkflow::initial_state(ExpenseType::PreApproved, 1, Utc::now())
    }

    fn input(amount: Decimal) -> SubmissionInput<'static> {
        SubmissionInput {
            amount,
            currency: "USD",
            description: "IDE license",
            reason: "dev tool",
            expense_type: ExpenseType::NeedsApproval,
            subcategory_id: Some(7),
        }
    }

    #[test]
    fn test_validate_submission_ok() {
        let valid = ExpenseWorkflow::validate_submission(&input(dec!(100))).unwrap();
        assert_eq!(valid.subcategory_id, 7);
        assert_eq!(valid.amount, dec!(100.00));
    }

    #[rstest]
    #[case(dec!(10.005), dec!(10.01))]
    #[case(dec!(0.005), dec!(0.01))]
    #[case(dec!(12.344999), dec!(12.34))]
    #[case(dec!(9999999999999999.99), dec!(9999999999999999.99))]
    fn test_amount_rounded_to_cents(#[case] submitted: Decimal, #[case] stored: Decimal) {
        let valid = ExpenseWorkflow::validate_submission(&input(submitted)).unwrap();
        assert_eq!(valid.amount, stored);
    }

    #[rstest]
    #[case(dec!(0.001))]
    #[case(dec!(0.004999))]
    fn test_sub_cent_amount_rejected(#[case] amount: Decimal) {
        assert!(matches!(
            ExpenseWorkflow::validate_submission(&input(amount)),
            Err(ExpenseError::AmountNotPositive)
        ));
    }

    #[rstest]
    #[case(Decimal::MAX)]
    #[case(dec!(10000000000000000))]
    #[case(dec!(9999999999999999.995))]
    fn test_oversized_amount_rejected(#[case] amount: Decimal) {
        let err = ExpenseWorkflow::validate_submission(&input(amount)).unwrap_err();
        assert!(matches!(err, ExpenseError::AmountTooLarge(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_validate_submission_rejects_non_positive() {
        for amount in [dec!(0), dec!(-5)] {
            assert!(matches!(
                ExpenseWorkflow::validate_submission(&input(amount)),
                Err(ExpenseError::AmountNotPositive)
            ));
        }
    }

    #[test]
    fn test_validate_submission_requires_fields() {
        let mut blank = input(dec!(1));
        blank.reason = "  ";
        assert!(matches!(
            ExpenseWorkflow::validate_submission(&blank),
            Err(ExpenseError::MissingField("reason"))
        ));

        let mut bad_currency = input(dec!(1));
        bad_currency.currency = "dollars";
        assert!(matches!(
            ExpenseWorkflow::validate_submission(&bad_currency),
            Err(ExpenseError::InvalidField { field: "currency", .. })
        ));

        let mut no_sub = input(dec!(1));
        no_sub.subcategory_id = None;
        assert!(matches!(
            ExpenseWorkflow::validate_submission(&no_sub),
            Err(ExpenseError::MissingField("subcategory_id"))
        ));
    }

    #[test]
    fn test_effective_rate_date_prefers_invoice_date() {
        let submitted = "2026-06-10T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let invoice = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert_eq!(
            ExpenseWorkflow::effective_rate_date(Some(invoice), submitted),
            invoice
        );
        assert_eq!(
            ExpenseWorkflow::effective_rate_date(None, submitted),
            NaiveDate::from_ymd_opt(2026, 6, 10).unwrap()
        );
    }

    #[test]
    fn test_initial_states() {
        let now = Utc::now();
        let pending = ExpenseWorkflow::initial_state(ExpenseType::NeedsApproval, 1, now);
        assert_eq!(pending.status, ExpenseStatus::Pending);
        assert_eq!(pending.handler_id, None);

        let pre = ExpenseWorkflow::initial_state(ExpenseType::PreApproved, 1, now);
        assert_eq!(pre.status, ExpenseStatus::Approved);
        assert_eq!(pre.handler_id, Some(1));
        assert_eq!(pre.handled_at, Some(now));

        let future = ExpenseWorkflow::initial_state(ExpenseType::FutureApproval, 1, now);
        assert_eq!(future.status, ExpenseStatus::Approved);
    }

    #[test]
    fn test_submit_approve_pay_scenario() {
        let submitted = ExpenseState::pending();
        let approved = submitted.apply(&ExpenseWorkflow::approve(&submitted, 2).unwrap());
        assert_eq!(approved.status, ExpenseStatus::Approved);
        assert_eq!(approved.handler_id, Some(2));

        let scheduled = approved.apply(&ExpenseWorkflow::mark_pending_payment(&approved).unwrap());
        assert_eq!(scheduled.payment_status, PaymentStatus::PendingPayment);

        let paid = scheduled.apply(&ExpenseWorkflow::mark_paid(&scheduled, 3).unwrap());
        assert!(paid.is_paid);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.paid_by_id, Some(3));
        assert!(paid.paid_at.is_some());
        assert!(paid.is_consistent());
    }

    #[test]
    fn test_reject_without_reason_keeps_pending() {
        let state = ExpenseState::pending();
        assert!(matches!(
            ExpenseWorkflow::reject(&state, 2, ""),
            Err(ExpenseError::RejectionReasonRequired)
        ));
        assert_eq!(state.status, ExpenseStatus::Pending);
    }

    #[test]
    fn test_approve_then_reject_forbidden() {
        let state = ExpenseState::pending();
        let approved = state.apply(&ExpenseWorkflow::approve(&state, 2).unwrap());
        assert!(matches!(
            ExpenseWorkflow::reject(&approved, 2, "too expensive"),
            Err(ExpenseError::InvalidTransition { action: "reject", .. })
        ));
    }

    #[test]
    fn test_mark_paid_then_unpaid_restores() {
        let approved = approved();
        let scheduled = approved.apply(&ExpenseWorkflow::mark_pending_payment(&approved).unwrap());
        let paid = scheduled.apply(&ExpenseWorkflow::mark_paid(&scheduled, 3).unwrap());
        let unpaid = paid.apply(&ExpenseWorkflow::mark_unpaid(&paid).unwrap());

        assert!(!unpaid.is_paid);
        assert_eq!(unpaid.paid_at, None);
        assert_eq!(unpaid.paid_by_id, None);
        assert_eq!(unpaid.payment_status, PaymentStatus::PendingAttention);
    }

    #[test]
    fn test_payment_requires_approval() {
        let pending = ExpenseState::pending();
        assert!(matches!(
            ExpenseWorkflow::mark_pending_payment(&pending),
            Err(ExpenseError::NotApproved)
        ));
        assert!(matches!(
            ExpenseWorkflow::set_external_entry(&pending, true, 3),
            Err(ExpenseError::NotApproved)
        ));
    }

    #[test]
    fn test_mark_paid_requires_pending_payment() {
        assert!(matches!(
            ExpenseWorkflow::mark_paid(&approved(), 3),
            Err(ExpenseError::InvalidTransition { action: "mark_paid", .. })
        ));
    }

    #[rstest]
    #[case::submitter(false)]
    #[case::admin(true)]
    fn test_paid_or_entered_expense_not_editable(#[case] any_status: bool) {
        let approved = approved();
        let scheduled = approved.apply(&ExpenseWorkflow::mark_pending_payment(&approved).unwrap());
        let paid = scheduled.apply(&ExpenseWorkflow::mark_paid(&scheduled, 3).unwrap());
        assert!(matches!(
            ExpenseWorkflow::check_editable(4, &paid, any_status),
            Err(ExpenseError::Locked(4))
        ));

        let entered = approved.apply(&ExpenseWorkflow::set_external_entry(&approved, true, 3).unwrap());
        let err = ExpenseWorkflow::check_editable(4, &entered, any_status).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_decided_expense_editable_by_admin_only() {
        let approved = approved();
        assert!(ExpenseWorkflow::check_editable(1, &approved, true).is_ok());
        assert!(matches!(
            ExpenseWorkflow::check_editable(1, &approved, false),
            Err(ExpenseError::InvalidTransition { action: "edit", .. })
        ));
        assert!(ExpenseWorkflow::check_editable(1, &ExpenseState::pending(), false).is_ok());
    }

    #[test]
    fn test_locked_expense_not_deletable() {
        let mut state = approved();
        assert!(ExpenseWorkflow::check_deletable(1, &state).is_ok());
        state.external_entry = true;
        assert!(matches!(
            ExpenseWorkflow::check_deletable(1, &state),
            Err(ExpenseError::Locked(1))
        ));
    }

    #[test]
    fn test_payment_transition_table() {
        use PaymentStatus::{Paid, PendingAttention, PendingPayment};
        assert!(ExpenseWorkflow::is_valid_payment_transition(PendingAttention, PendingPayment));
        assert!(ExpenseWorkflow::is_valid_payment_transition(PendingPayment, Paid));
        assert!(ExpenseWorkflow::is_valid_payment_transition(Paid, PendingAttention));
        assert!(ExpenseWorkflow::is_valid_payment_transition(PendingPayment, PendingAttention));
        assert!(!ExpenseWorkflow::is_valid_payment_transition(PendingAttention, Paid));
        assert!(!ExpenseWorkflow::is_valid_payment_transition(Paid, PendingPayment));
    }
}
