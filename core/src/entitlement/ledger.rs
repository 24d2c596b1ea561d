use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::entitlement::error::LedgerError;
use crate::entitlement::types::EntitlementSnapshot;

/// 外部权威账本。引擎只调用，不实现其持久化。
#[async_trait]
pub trait EntitlementLedger: Send + Sync {
    async fn balance(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError>;

    async fn grant_trial(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError>;

    async fn deduct(
        &self,
        user_id: &str,
        feature: &str,
        amount: u32,
    ) -> Result<EntitlementSnapshot, LedgerError>;
}

/// 进程内账本，用于本地演示与测试。
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<String, EntitlementSnapshot>>,
    deduct_calls: AtomicUsize,
    grant_calls: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account<S: Into<String>>(&self, user_id: S, snapshot: EntitlementSnapshot) {
        self.accounts.lock().await.insert(user_id.into(), snapshot);
    }

    pub async fn snapshot(&self, user_id: &str) -> Option<EntitlementSnapshot> {
        self.accounts.lock().await.get(user_id).copied()
    }

    pub fn deduct_calls(&self) -> usize {
        self.deduct_calls.load(Ordering::SeqCst)
    }

    pub fn grant_calls(&self) -> usize {
        self.grant_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementLedger for InMemoryLedger {
    async fn balance(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        self.snapshot(user_id)
            .await
            .ok_or_else(|| LedgerError::UnknownAccount {
                user_id: user_id.to_string(),
            })
    }

    async fn grant_trial(&self, user_id: &str) -> Result<EntitlementSnapshot, LedgerError> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::UnknownAccount {
                user_id: user_id.to_string(),
            })?;

        if account.trial_used {
            return Err(LedgerError::TrialAlreadyUsed);
        }

        account.trial_used = true;
        account.credits_remaining = account.credits_remaining.saturating_add(1);
        Ok(*account)
    }

    async fn deduct(
        &self,
        user_id: &str,
        _feature: &str,
        amount: u32,
    ) -> Result<EntitlementSnapshot, LedgerError> {
        self.deduct_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::UnknownAccount {
                user_id: user_id.to_string(),
            })?;

        if account.credits_remaining < amount {
            return Err(LedgerError::InsufficientBalance {
                balance: account.credits_remaining,
                requested: amount,
            });
        }

        account.credits_remaining -= amount;
        Ok(*account)
    }
}
