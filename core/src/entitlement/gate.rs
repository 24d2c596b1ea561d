use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::entitlement::error::LedgerError;
use crate::entitlement::ledger::EntitlementLedger;
use crate::entitlement::types::{
    EntitlementSnapshot, Reservation, ReservationOutcome, ReservationStage, UserContext,
};
use crate::telemetry::events::record_entitlement_decision;

const TARGET: &str = "entitlement_gate";
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// 单个 session 的预留槽。账本调用期间只持有这把锁。
type ReservationSlot = Arc<AsyncMutex<Option<Reservation>>>;

/// 按决策表检查并扣减权益。
///
/// 同一 session id 最多扣减一次：预留结果保留到 [`EntitlementGate::settle`]
/// 被调用为止，重复调用直接返回已有预留。不同 session 之间互不等待，
/// 每次账本调用都受 `ledger_timeout` 约束。
pub struct EntitlementGate {
    ledger: Arc<dyn EntitlementLedger>,
    auto_grant_trial: bool,
    ledger_timeout: Duration,
    reservations: Mutex<HashMap<String, ReservationSlot>>,
}

impl std::fmt::Debug for EntitlementGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementGate")
            .field("auto_grant_trial", &self.auto_grant_trial)
            .field("ledger_timeout", &self.ledger_timeout)
            .finish_non_exhaustive()
    }
}

impl EntitlementGate {
    pub fn new(ledger: Arc<dyn EntitlementLedger>) -> Self {
        Self::with_trial_policy(ledger, true)
    }

    pub fn with_trial_policy(ledger: Arc<dyn EntitlementLedger>, auto_grant_trial: bool) -> Self {
        Self {
            ledger,
            auto_grant_trial,
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
            reservations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ledger_timeout(mut self, ledger_timeout: Duration) -> Self {
        self.ledger_timeout = ledger_timeout;
        self
    }

    fn slot(&self, session_id: &str) -> ReservationSlot {
        let mut slots = self.reservations.lock().unwrap_or_else(|err| err.into_inner());
        Arc::clone(slots.entry(session_id.to_string()).or_default())
    }

    fn remove_slot(&self, session_id: &str) -> Option<ReservationSlot> {
        self.reservations
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(session_id)
    }

    pub async fn check_and_reserve(
        &self,
        session_id: &str,
        user: &UserContext,
        feature_key: &str,
        cost: u32,
    ) -> ReservationOutcome {
        // 同一会话的并发调用在槽锁上排队，不会重复扣减；表锁不跨 await。
        let slot = self.slot(session_id);
        let mut reserved = slot.lock().await;
        if let Some(existing) = reserved.as_ref() {
            debug!(
                target: TARGET,
                session_id,
                "reservation already recorded for session, skipping ledger"
            );
            return ReservationOutcome::Reserved(existing.clone());
        }

        let outcome = self.decide(session_id, user, feature_key, cost).await;
        match &outcome {
            ReservationOutcome::Reserved(reservation) => *reserved = Some(reservation.clone()),
            _ => {
                drop(reserved);
                self.forget_empty_slot(session_id, &slot);
            }
        }

        report(session_id, &outcome);
        outcome
    }

    /// 会话结束后释放预留记录。
    pub async fn settle(&self, session_id: &str) -> bool {
        match self.remove_slot(session_id) {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    pub async fn has_reservation(&self, session_id: &str) -> bool {
        let slot = self
            .reservations
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(session_id)
            .cloned();
        match slot {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    fn forget_empty_slot(&self, session_id: &str, slot: &ReservationSlot) {
        let mut slots = self.reservations.lock().unwrap_or_else(|err| err.into_inner());
        let unused = slots
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(current) <= 2);
        if unused {
            slots.remove(session_id);
        }
    }

    async fn ledger_call<F>(&self, call: F) -> Result<EntitlementSnapshot, LedgerError>
    where
        F: Future<Output = Result<EntitlementSnapshot, LedgerError>>,
    {
        match timeout(self.ledger_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    target: TARGET,
                    timeout_ms = self.ledger_timeout.as_millis() as u64,
                    "ledger call timed out"
                );
                Err(LedgerError::TimedOut {
                    elapsed_ms: self.ledger_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn decide(
        &self,
        session_id: &str,
        user: &UserContext,
        feature_key: &str,
        cost: u32,
    ) -> ReservationOutcome {
        let user_id = match user {
            UserContext::Anonymous => return ReservationOutcome::AuthenticationRequired,
            UserContext::Guest => {
                return ReservationOutcome::Reserved(Reservation {
                    session_id: session_id.to_string(),
                    remaining: None,
                    metered: false,
                })
            }
            UserContext::Authenticated { user_id } => user_id.as_str(),
        };

        let mut snapshot: EntitlementSnapshot = match self.ledger_call(self.ledger.balance(user_id)).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                return ReservationOutcome::ReservationFailed {
                    stage: ReservationStage::Balance,
                    error,
                }
            }
        };

        if !snapshot.trial_used && snapshot.credits_remaining < cost {
            if !self.auto_grant_trial {
                return ReservationOutcome::TrialAvailable {
                    balance: snapshot.credits_remaining,
                };
            }

            snapshot = match self.ledger_call(self.ledger.grant_trial(user_id)).await {
                Ok(granted) => {
                    info!(target: TARGET, session_id, user_id, "granted one-time trial credit");
                    granted
                }
                Err(error) => {
                    return ReservationOutcome::ReservationFailed {
                        stage: ReservationStage::TrialGrant,
                        error,
                    }
                }
            };
        }

        if snapshot.credits_remaining < cost {
            return ReservationOutcome::InsufficientCredits {
                balance: snapshot.credits_remaining,
            };
        }

        match self
            .ledger_call(self.ledger.deduct(user_id, feature_key, cost))
            .await
        {
            Ok(after) => ReservationOutcome::Reserved(Reservation {
                session_id: session_id.to_string(),
                remaining: Some(after.credits_remaining),
                metered: true,
            }),
            Err(error) => ReservationOutcome::ReservationFailed {
                stage: ReservationStage::Deduct,
                error,
            },
        }
    }
}

fn report(session_id: &str, outcome: &ReservationOutcome) {
    match outcome {
        ReservationOutcome::Reserved(reservation) => record_entitlement_decision(
            session_id,
            outcome.as_str(),
            reservation.remaining,
            None,
            false,
        ),
        ReservationOutcome::ReservationFailed { stage, error } => {
            let detail = format!("{}: {error}", stage.as_str());
            record_entitlement_decision(session_id, outcome.as_str(), None, Some(&detail), true)
        }
        ReservationOutcome::InsufficientCredits { balance }
        | ReservationOutcome::TrialAvailable { balance } => record_entitlement_decision(
            session_id,
            outcome.as_str(),
            Some(*balance),
            None,
            false,
        ),
        ReservationOutcome::AuthenticationRequired => {
            record_entitlement_decision(session_id, outcome.as_str(), None, None, false)
        }
    }
}
