pub mod models;
pub mod pii;
pub mod repository;
pub mod search;
pub mod supplier;
pub mod validation;

use models::{OrderId, SlotNumber};
use rust_decimal::Decimal;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Malformed request: {0}")]
    Structural(String),
    #[error("Allocations do not reconcile: expected {expected}, allocated {allocated}")]
    InvariantViolation {
        expected: Decimal,
        allocated: Decimal,
    },
    #[error("Payment order not found: {0}")]
    NotFound(OrderId),
    #[error("Signer {signer} may not sign slot {slot}")]
    PermissionDenied { signer: String, slot: SlotNumber },
    #[error("Invalid signature slot {0}, expected 1..=3")]
    InvalidSlot(i64),
    #[error("Transaction aborted: {0}")]
    Transaction(#[source] BoxError),
    #[error("Connection failure: {0}")]
    Connection(#[source] BoxError),
}

impl OrderError {
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
