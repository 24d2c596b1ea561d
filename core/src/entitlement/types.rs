use serde::{Deserialize, Serialize};

use crate::entitlement::error::LedgerError;

/// 账本在某一时刻返回的余额快照，不跨会话缓存。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub credits_remaining: u32,
    pub trial_used: bool,
}

/// 发起会话的用户身份。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserContext {
    Authenticated { user_id: String },
    /// 访客模式不计量。
    Guest,
    Anonymous,
}

impl UserContext {
    pub fn authenticated<S: Into<String>>(user_id: S) -> Self {
        Self::Authenticated {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            UserContext::Authenticated { user_id } => Some(user_id),
            UserContext::Guest | UserContext::Anonymous => None,
        }
    }

    /// 限流等按用户分桶的服务使用的键。
    pub fn rate_limit_key(&self, session_id: &str) -> String {
        match self {
            UserContext::Authenticated { user_id } => format!("user:{user_id}"),
            UserContext::Guest => format!("guest:{session_id}"),
            UserContext::Anonymous => format!("anonymous:{session_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub session_id: String,
    /// 访客模式下为 None。
    pub remaining: Option<u32>,
    pub metered: bool,
}

/// 预留失败发生在哪个账本调用上。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStage {
    Balance,
    TrialGrant,
    Deduct,
}

impl ReservationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStage::Balance => "balance",
            ReservationStage::TrialGrant => "trial_grant",
            ReservationStage::Deduct => "deduct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    Reserved(Reservation),
    InsufficientCredits { balance: u32 },
    TrialAvailable { balance: u32 },
    AuthenticationRequired,
    ReservationFailed {
        stage: ReservationStage,
        error: LedgerError,
    },
}

impl ReservationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationOutcome::Reserved(_) => "reserved",
            ReservationOutcome::InsufficientCredits { .. } => "insufficient_credits",
            ReservationOutcome::TrialAvailable { .. } => "trial_available",
            ReservationOutcome::AuthenticationRequired => "authentication_required",
            ReservationOutcome::ReservationFailed { .. } => "reservation_failed",
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, ReservationOutcome::Reserved(_))
    }
}
