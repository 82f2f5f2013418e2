pub mod memory;
pub mod service;
pub mod signature;

pub use memory::{InMemoryDirectory, InMemoryOrderRepository, WriteStage};
pub use service::OrderService;
pub use signature::{SignatureReceipt, SignatureWorkflow, SlotSecrets, SlotStatus};
