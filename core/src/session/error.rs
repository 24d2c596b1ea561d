use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while session is {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("session worker has shut down")]
    Closed,
    #[error("completion delivery failed: {reason}")]
    Delivery { reason: String },
}

impl SessionError {
    pub(crate) fn invalid(from: &'static str, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }
}
