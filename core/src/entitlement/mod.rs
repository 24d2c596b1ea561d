//! 权益闸门：会话开始前检查并扣减计量余额。

pub mod error;
pub mod gate;
pub mod ledger;
pub mod types;

pub use error::LedgerError;
pub use gate::EntitlementGate;
pub use ledger::{EntitlementLedger, InMemoryLedger};
pub use types::{
    EntitlementSnapshot, Reservation, ReservationOutcome, ReservationStage, UserContext,
};

#[cfg(test)]
mod tests;
