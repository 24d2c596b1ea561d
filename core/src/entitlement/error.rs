use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("ledger rejected request: {reason}")]
    Rejected { reason: String },
    #[error("unknown account: {user_id}")]
    UnknownAccount { user_id: String },
    #[error("trial already used")]
    TrialAlreadyUsed,
    #[error("insufficient balance: {balance} < {requested}")]
    InsufficientBalance { balance: u32, requested: u32 },
    #[error("ledger call timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u64 },
}

impl LedgerError {
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}
