//! Property tests for the expense state machines.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use outlay_shared::types::{MAX_AMOUNT, MAX_BASE_AMOUNT, round_rate};

use super::service::ExpenseWorkflow;
use super::types::{ExpenseState, ExpenseStatus, ExpenseType, PaymentStatus};

#[derive(Debug, Clone)]
enum Step {
    Approve,
    Reject(String),
    MarkPendingPayment,
    MarkPaid,
    MarkUnpaid,
    External(bool),
}

fn any_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Approve),
        "[ a-z]{0,8}".prop_map(Step::Reject),
        Just(Step::MarkPendingPayment),
        Just(Step::MarkPaid),
        Just(Step::MarkUnpaid),
        any::<bool>().prop_map(Step::External),
    ]
}

/// Amounts with up to six fractional digits, from sub-cent to far past the column.
fn any_amount() -> impl Strategy<Value = Decimal> {
    (any::<i64>(), 0u32..=6).prop_map(|(units, scale)| Decimal::new(units, scale))
}

fn any_type() -> impl Strategy<Value = ExpenseType> {
    prop::sample::select(ExpenseType::ALL.to_vec())
}

fn run(state: &ExpenseState, step: &Step) -> Option<ExpenseState> {
    let action = match step {
        Step::Approve => ExpenseWorkflow::approve(state, 2),
        Step::Reject(reason) => ExpenseWorkflow::reject(state, 2, reason),
        Step::MarkPendingPayment => ExpenseWorkflow::mark_pending_payment(state),
        Step::MarkPaid => ExpenseWorkflow::mark_paid(state, 3),
        Step::MarkUnpaid => ExpenseWorkflow::mark_unpaid(state),
        Step::External(v) => ExpenseWorkflow::set_external_entry(state, *v, 3),
    };
    action.ok().map(|a| state.apply(&a))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// No sequence of accepted transitions breaks the cross-field invariants.
    #[test]
    fn prop_invariants_hold_under_any_sequence(
        expense_type in any_type(),
        steps in prop::collection::vec(any_step(), 0..20),
    ) {
        let mut state = ExpenseWorkflow::initial_state(expense_type, 1, Utc::now());
        prop_assert!(state.is_consistent());
        for step in &steps {
            if let Some(next) = run(&state, step) {
                prop_assert!(next.is_consistent(), "{:?} after {:?}", next, step);
                state = next;
            }
        }
    }

    /// Decisions are final: once out of pending, approve and reject always fail.
    #[test]
    fn prop_decisions_are_final(steps in prop::collection::vec(any_step(), 1..12)) {
        let mut state = ExpenseState::pending();
        for step in &steps {
            if let Some(next) = run(&state, step) {
                state = next;
            }
        }
        if state.status != ExpenseStatus::Pending {
            prop_assert!(ExpenseWorkflow::approve(&state, 2).is_err());
            prop_assert!(ExpenseWorkflow::reject(&state, 2, "late").is_err());
        }
    }

    /// Accepted payment moves follow the transition table.
    #[test]
    fn prop_payment_moves_follow_table(steps in prop::collection::vec(any_step(), 0..20)) {
        let mut state = ExpenseWorkflow::initial_state(ExpenseType::PreApproved, 1, Utc::now());
        for step in &steps {
            if let Some(next) = run(&state, step) {
                if next.payment_status != state.payment_status {
                    prop_assert!(ExpenseWorkflow::is_valid_payment_transition(
                        state.payment_status,
                        next.payment_status
                    ));
                }
                state = next;
            }
        }
        prop_assert_eq!(state.is_paid, state.payment_status == PaymentStatus::Paid);
    }

    /// Accepted amounts are whole cents inside the column, and their base
    /// product is exact at eight places for any six-place rate.
    #[test]
    fn prop_accepted_amounts_fit_storage(amount in any_amount(), micros in 1i64..10_000_000) {
        match ExpenseWorkflow::money_amount(amount) {
            Ok(stored) => {
                prop_assert!(stored > Decimal::ZERO && stored <= MAX_AMOUNT);
                prop_assert!(stored.scale() <= 2);
                prop_assert!((stored - amount).abs() <= Decimal::new(5, 3));

                let rate = round_rate(Decimal::new(micros, 6));
                if let Some(base) = stored.checked_mul(rate).filter(|b| *b <= MAX_BASE_AMOUNT) {
                    prop_assert!(base.normalize().scale() <= 8);
                }
            }
            Err(_) => prop_assert!(amount < Decimal::new(5, 3) || amount > MAX_AMOUNT),
        }
    }
}
