use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    EntitlementGate, EntitlementLedger, EntitlementSnapshot, InMemoryLedger, LedgerError,
    Reservation, ReservationOutcome, ReservationStage, UserContext,
};

const FEATURE: &str = "objection_practice";

fn snapshot(credits_remaining: u32, trial_used: bool) -> EntitlementSnapshot {
    EntitlementSnapshot {
        credits_remaining,
        trial_used,
    }
}

async fn ledger_with(user: &str, credits: u32, trial_used: bool) -> Arc<InMemoryLedger> {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .insert_account(user, snapshot(credits, trial_used))
        .await;
    ledger
}

struct FlakyLedger {
    balance: EntitlementSnapshot,
    fail_deduct: bool,
    fail_grant: bool,
    deduct_calls: AtomicUsize,
}

impl FlakyLedger {
    fn new(balance: EntitlementSnapshot) -> Self {
        Self {
            balance,
            fail_deduct: false,
            fail_grant: false,
            deduct_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EntitlementLedger for FlakyLedger {
    async fn balance(&self, _user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        Ok(self.balance)
    }

    async fn grant_trial(&self, _user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        if self.fail_grant {
            return Err(LedgerError::unavailable("grant endpoint down"));
        }
        Ok(snapshot(self.balance.credits_remaining + 1, true))
    }

    async fn deduct(
        &self,
        _user_id: &str,
        _feature: &str,
        _amount: u32,
    ) -> Result<EntitlementSnapshot, LedgerError> {
        self.deduct_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deduct {
            return Err(LedgerError::unavailable("connection reset"));
        }
        Ok(snapshot(self.balance.credits_remaining.saturating_sub(1), true))
    }
}

#[tokio::test]
async fn anonymous_user_requires_authentication() {
    let ledger = ledger_with("alice", 5, true).await;
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-1", &UserContext::Anonymous, FEATURE, 1)
        .await;

    assert_eq!(outcome, ReservationOutcome::AuthenticationRequired);
    assert_eq!(ledger.deduct_calls(), 0);
}

#[tokio::test]
async fn guest_mode_is_unmetered() {
    let ledger = Arc::new(InMemoryLedger::new());
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-guest", &UserContext::Guest, FEATURE, 1)
        .await;

    assert_eq!(
        outcome,
        ReservationOutcome::Reserved(Reservation {
            session_id: "s-guest".into(),
            remaining: None,
            metered: false,
        })
    );
    assert_eq!(ledger.deduct_calls(), 0);
    assert_eq!(ledger.grant_calls(), 0);
}

#[tokio::test]
async fn unused_trial_with_empty_balance_grants_then_deducts() {
    let ledger = ledger_with("alice", 0, false).await;
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-1", &UserContext::authenticated("alice"), FEATURE, 1)
        .await;

    match outcome {
        ReservationOutcome::Reserved(reservation) => {
            assert_eq!(reservation.remaining, Some(0));
            assert!(reservation.metered);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ledger.grant_calls(), 1);
    assert_eq!(ledger.deduct_calls(), 1);
    assert_eq!(ledger.snapshot("alice").await, Some(snapshot(0, true)));
}

#[tokio::test]
async fn trial_is_offered_instead_of_granted_when_opted_out() {
    let ledger = ledger_with("alice", 0, false).await;
    let gate = EntitlementGate::with_trial_policy(ledger.clone(), false);

    let outcome = gate
        .check_and_reserve("s-1", &UserContext::authenticated("alice"), FEATURE, 1)
        .await;

    assert_eq!(outcome, ReservationOutcome::TrialAvailable { balance: 0 });
    assert_eq!(ledger.grant_calls(), 0);
    assert_eq!(ledger.deduct_calls(), 0);
}

#[tokio::test]
async fn sufficient_balance_deducts_cost() {
    let ledger = ledger_with("bob", 3, true).await;
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-2", &UserContext::authenticated("bob"), FEATURE, 2)
        .await;

    assert!(outcome.is_reserved());
    assert_eq!(ledger.snapshot("bob").await, Some(snapshot(1, true)));
    assert_eq!(ledger.grant_calls(), 0);
}

#[tokio::test]
async fn exhausted_trial_and_balance_is_insufficient() {
    let ledger = ledger_with("carol", 0, true).await;
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-3", &UserContext::authenticated("carol"), FEATURE, 1)
        .await;

    assert_eq!(outcome, ReservationOutcome::InsufficientCredits { balance: 0 });
    assert_eq!(ledger.deduct_calls(), 0);
}

#[tokio::test]
async fn unknown_account_surfaces_as_reservation_failure() {
    let ledger = Arc::new(InMemoryLedger::new());
    let gate = EntitlementGate::new(ledger);

    let outcome = gate
        .check_and_reserve("s-4", &UserContext::authenticated("ghost"), FEATURE, 1)
        .await;

    assert!(matches!(
        outcome,
        ReservationOutcome::ReservationFailed {
            stage: ReservationStage::Balance,
            error: LedgerError::UnknownAccount { .. }
        }
    ));
}

#[tokio::test]
async fn deduct_failure_is_distinct_from_insufficient_credits() {
    let mut ledger = FlakyLedger::new(snapshot(4, true));
    ledger.fail_deduct = true;
    let ledger = Arc::new(ledger);
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-5", &UserContext::authenticated("dave"), FEATURE, 1)
        .await;

    assert!(matches!(
        outcome,
        ReservationOutcome::ReservationFailed {
            stage: ReservationStage::Deduct,
            ..
        }
    ));
    assert!(!gate.has_reservation("s-5").await);
}

#[tokio::test]
async fn trial_grant_failure_reports_grant_error() {
    let mut ledger = FlakyLedger::new(snapshot(0, false));
    ledger.fail_grant = true;
    let ledger = Arc::new(ledger);
    let gate = EntitlementGate::new(ledger.clone());

    let outcome = gate
        .check_and_reserve("s-6", &UserContext::authenticated("erin"), FEATURE, 1)
        .await;

    match outcome {
        ReservationOutcome::ReservationFailed { stage, error } => {
            assert_eq!(stage, ReservationStage::TrialGrant);
            assert_eq!(error, LedgerError::unavailable("grant endpoint down"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(ledger.deduct_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_reservation_for_same_session_deducts_once() {
    let ledger = ledger_with("frank", 5, true).await;
    let gate = EntitlementGate::new(ledger.clone());
    let user = UserContext::authenticated("frank");

    let first = gate.check_and_reserve("s-7", &user, FEATURE, 1).await;
    let second = gate.check_and_reserve("s-7", &user, FEATURE, 1).await;

    assert_eq!(first, second);
    assert_eq!(ledger.deduct_calls(), 1);
    assert_eq!(ledger.snapshot("frank").await, Some(snapshot(4, true)));

    assert!(gate.settle("s-7").await);
    assert!(!gate.settle("s-7").await);
}

#[tokio::test]
async fn concurrent_reservations_for_same_session_deduct_once() {
    let ledger = ledger_with("gina", 5, true).await;
    let gate = Arc::new(EntitlementGate::new(ledger.clone()));
    let user = UserContext::authenticated("gina");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gate = Arc::clone(&gate);
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            gate.check_and_reserve("s-8", &user, FEATURE, 1).await
        }));
    }

    for handle in handles {
        assert!(handle.await.expect("task joins").is_reserved());
    }
    assert_eq!(ledger.deduct_calls(), 1);
}

/// "slow" 用户的余额查询永不返回，其余用户走内存账本。
struct StallingLedger {
    inner: InMemoryLedger,
}

#[async_trait]
impl EntitlementLedger for StallingLedger {
    async fn balance(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        if user_id == "slow" {
            std::future::pending::<()>().await;
        }
        self.inner.balance(user_id).await
    }

    async fn grant_trial(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        self.inner.grant_trial(user_id).await
    }

    async fn deduct(
        &self,
        user_id: &str,
        feature: &str,
        amount: u32,
    ) -> Result<EntitlementSnapshot, LedgerError> {
        self.inner.deduct(user_id, feature, amount).await
    }
}

async fn stalling_gate() -> Arc<EntitlementGate> {
    let inner = InMemoryLedger::new();
    inner.insert_account("fast", snapshot(3, true)).await;
    inner.insert_account("slow", snapshot(3, true)).await;
    Arc::new(
        EntitlementGate::new(Arc::new(StallingLedger { inner }))
            .with_ledger_timeout(Duration::from_secs(30)),
    )
}

#[tokio::test(start_paused = true)]
async fn stalled_ledger_call_does_not_block_other_users() {
    let gate = stalling_gate().await;

    let slow = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            gate.check_and_reserve("s-slow", &UserContext::authenticated("slow"), FEATURE, 1)
                .await
        })
    };
    tokio::task::yield_now().await;

    let fast = tokio::time::timeout(
        Duration::from_secs(2),
        gate.check_and_reserve("s-fast", &UserContext::authenticated("fast"), FEATURE, 1),
    )
    .await
    .expect("fast user is not held up by the stalled ledger call");
    assert!(fast.is_reserved());
    assert!(!slow.is_finished());

    let slow = slow.await.expect("task joins");
    assert_eq!(
        slow,
        ReservationOutcome::ReservationFailed {
            stage: ReservationStage::Balance,
            error: LedgerError::TimedOut { elapsed_ms: 30_000 },
        }
    );
    assert!(!gate.has_reservation("s-slow").await);
    assert!(gate.has_reservation("s-fast").await);
}
