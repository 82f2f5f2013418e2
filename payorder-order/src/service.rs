use chrono::NaiveDate;
use payorder_core::models::{OrderDetails, OrderId, OrderView, PaymentOrder};
use payorder_core::repository::{DirectoryRepository, OrderRepository, PermissionDirectory};
use payorder_core::search::{build_date_range_filter, build_filter, SearchCriteria};
use payorder_core::validation::validate;
use payorder_core::{OrderError, OrderResult};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::signature::{SignatureReceipt, SignatureWorkflow, SlotSecrets};

/// Entry point for every payment order operation. Holds no state besides
/// the injected repositories.
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    directory: Arc<dyn DirectoryRepository>,
    signatures: SignatureWorkflow,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        directory: Arc<dyn DirectoryRepository>,
        permissions: Arc<dyn PermissionDirectory>,
        secrets: SlotSecrets,
    ) -> Self {
        let signatures = SignatureWorkflow::new(orders.clone(), permissions, secrets);
        Self {
            orders,
            directory,
            signatures,
        }
    }

    /// Validate and persist a new order.
    #[instrument(skip_all, fields(invoice = %order.header.invoice_number))]
    pub async fn create_order(&self, order: &PaymentOrder) -> OrderResult<OrderId> {
        validate(order)?;
        let id = self.orders.create(order).await?;
        info!(order_id = %id, items = order.line_items.len(), "Payment order created");
        Ok(id)
    }

    pub async fn get_order(&self, id: OrderId) -> OrderResult<OrderView> {
        self.orders
            .get_by_id(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    pub async fn get_order_details(&self, id: OrderId) -> OrderResult<OrderDetails> {
        self.orders
            .get_details(id)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    /// Whether an order exists, for callers that attach files to it.
    pub async fn order_exists(&self, id: OrderId) -> OrderResult<bool> {
        Ok(self.orders.get_by_id(id).await?.is_some())
    }

    pub async fn list_pending(&self) -> OrderResult<Vec<OrderView>> {
        self.orders.list_pending().await
    }

    /// Replace an order's header and child collections. The replacement must
    /// reconcile just like a new order.
    #[instrument(skip(self, order), fields(order_id = %id))]
    pub async fn update_order(&self, id: OrderId, order: &PaymentOrder) -> OrderResult<OrderView> {
        validate(order)?;
        self.orders.update(id, order).await?;
        info!("Payment order updated");
        self.get_order(id).await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: OrderId) -> OrderResult<OrderView> {
        self.orders.cancel(id).await?;
        info!("Payment order cancelled");
        self.get_order(id).await
    }

    pub async fn search_orders(&self, criteria: &SearchCriteria) -> OrderResult<Vec<OrderView>> {
        let predicate = build_filter(criteria);
        self.orders.search(&predicate).await
    }

    pub async fn search_orders_by_date_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> OrderResult<Vec<OrderView>> {
        let predicate = build_date_range_filter(start, end)?;
        self.orders.search(&predicate).await
    }

    pub async fn sign(
        &self,
        order_id: OrderId,
        signer: &str,
        slot: i64,
    ) -> OrderResult<SignatureReceipt> {
        self.signatures.sign(order_id, signer, slot).await
    }

    pub fn signature_workflow(&self) -> &SignatureWorkflow {
        &self.signatures
    }

    pub async fn lookup_management_accounts(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.directory.management_accounts(query).await
    }

    pub async fn lookup_cost_centers(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.directory.cost_centers(query).await
    }

    pub async fn lookup_suppliers(&self, query: &str) -> OrderResult<Vec<String>> {
        self.directory.suppliers(query).await
    }

    pub async fn lookup_branches(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.directory.branches(query).await
    }
}
