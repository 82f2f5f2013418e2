use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{OrderDetails, OrderId, OrderView, PaymentOrder, Signatures, SlotNumber};
use crate::search::Predicate;
use crate::OrderResult;

/// Persistence of the payment order aggregate across the header table and
/// its three child tables.
///
/// Every write is all-or-nothing. Multi-statement reads (`get_details`,
/// `get_by_id`) are not taken inside one transaction; a concurrent update may
/// be observed half way.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert header and children in one transaction, returning the new id.
    async fn create(&self, order: &PaymentOrder) -> OrderResult<OrderId>;

    /// Replace header fields and every child collection. `NotFound` when the
    /// header update touches no row.
    async fn update(&self, id: OrderId, order: &PaymentOrder) -> OrderResult<()>;

    async fn get_by_id(&self, id: OrderId) -> OrderResult<Option<OrderView>>;

    async fn get_details(&self, id: OrderId) -> OrderResult<Option<OrderDetails>>;

    /// Open orders with at least one empty signature slot, newest first.
    async fn list_pending(&self) -> OrderResult<Vec<OrderView>>;

    /// Mark the order cancelled. Children and signatures are kept.
    async fn cancel(&self, id: OrderId) -> OrderResult<()>;

    /// Orders matching the predicate, newest first.
    async fn search(&self, predicate: &Predicate) -> OrderResult<Vec<OrderView>>;

    /// Fill one empty signature slot of an open order. `NotFound` when the
    /// order does not exist, `Structural` when it is cancelled or the slot is
    /// already signed. The check and the write are one atomic step.
    async fn record_signature(
        &self,
        id: OrderId,
        slot: SlotNumber,
        token: &str,
        signer: &str,
        signed_at: DateTime<Utc>,
    ) -> OrderResult<()>;

    async fn signatures(&self, id: OrderId) -> OrderResult<Option<Signatures>>;
}

/// Read-only lookup of which signer may fill which slot.
#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    async fn has_signature_permission(&self, signer: &str, slot: SlotNumber) -> OrderResult<bool>;
}

/// Reference lists an order's fields are chosen from.
///
/// With no query the whole list is returned. A query returns exact matches
/// when there are any, otherwise case-insensitive substring matches.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn management_accounts(&self, query: Option<&str>) -> OrderResult<Vec<String>>;

    async fn cost_centers(&self, query: Option<&str>) -> OrderResult<Vec<String>>;

    async fn suppliers(&self, query: &str) -> OrderResult<Vec<String>>;

    async fn branches(&self, query: Option<&str>) -> OrderResult<Vec<String>>;
}
