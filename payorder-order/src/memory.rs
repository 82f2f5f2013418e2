//! In-memory implementations of the repository seams.
//!
//! Writes are staged on a copy of the tables and swapped in only when every
//! step succeeded, which gives the same all-or-nothing behaviour as a
//! database transaction. A write can be made to fail at a chosen step to
//! exercise rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payorder_core::models::{
    CostCenterAllocation, InstallmentEntry, LineItem, OrderDetails, OrderHeader, OrderId,
    OrderStatus, OrderView, PaymentOrder, SignatureSlot, Signatures, SlotNumber,
};
use payorder_core::repository::{DirectoryRepository, OrderRepository, PermissionDirectory};
use payorder_core::search::Predicate;
use payorder_core::supplier::Supplier;
use payorder_core::{OrderError, OrderResult};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{Mutex, RwLock};

/// Steps of a write, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    Header,
    ClearChildren,
    Allocations,
    LineItems,
    Installments,
    Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub orders: usize,
    pub line_items: usize,
    pub allocations: usize,
    pub installments: usize,
}

#[derive(Debug, Clone)]
struct StoredHeader {
    header: OrderHeader,
    status: OrderStatus,
    signatures: Signatures,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: i64,
    headers: BTreeMap<OrderId, StoredHeader>,
    line_items: Vec<(OrderId, LineItem)>,
    allocations: Vec<(OrderId, CostCenterAllocation)>,
    installments: Vec<(OrderId, InstallmentEntry)>,
}

impl Tables {
    fn insert_children(
        &mut self,
        id: OrderId,
        order: &PaymentOrder,
        fault: &Fault,
    ) -> OrderResult<()> {
        fault.check(WriteStage::Allocations)?;
        self.allocations
            .extend(order.allocations.iter().cloned().map(|a| (id, a)));

        fault.check(WriteStage::LineItems)?;
        self.line_items
            .extend(order.line_items.iter().cloned().map(|i| (id, i)));

        fault.check(WriteStage::Installments)?;
        self.installments
            .extend(order.installments.iter().cloned().map(|e| (id, e)));
        Ok(())
    }

    fn project(&self, id: OrderId, stored: &StoredHeader) -> OrderView {
        let total: Decimal = self
            .line_items
            .iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, item)| item.amount)
            .sum();
        OrderView::project(id, stored.status, &stored.header, total, &stored.signatures)
    }

    fn views_newest_first(&self) -> impl Iterator<Item = OrderView> + '_ {
        self.headers
            .iter()
            .rev()
            .map(|(id, stored)| self.project(*id, stored))
    }
}

struct Fault(Option<WriteStage>);

impl Fault {
    fn check(&self, stage: WriteStage) -> OrderResult<()> {
        match self.0 {
            Some(failing) if failing == stage => Err(OrderError::Transaction(
                format!("injected failure at {:?}", stage).into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    tables: RwLock<Tables>,
    fail_at: Mutex<Option<WriteStage>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail when it reaches `stage`.
    pub async fn fail_at(&self, stage: Option<WriteStage>) {
        *self.fail_at.lock().await = stage;
    }

    pub async fn row_counts(&self) -> RowCounts {
        let tables = self.tables.read().await;
        RowCounts {
            orders: tables.headers.len(),
            line_items: tables.line_items.len(),
            allocations: tables.allocations.len(),
            installments: tables.installments.len(),
        }
    }

    async fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables, &Fault) -> OrderResult<T>,
    ) -> OrderResult<T> {
        let fault = Fault(*self.fail_at.lock().await);
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let out = f(&mut staged, &fault)?;
        *tables = staged;
        Ok(out)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &PaymentOrder) -> OrderResult<OrderId> {
        self.write(|tables, fault| {
            fault.check(WriteStage::Header)?;
            tables.last_id += 1;
            let id = OrderId(tables.last_id);
            tables.headers.insert(
                id,
                StoredHeader {
                    header: order.header.clone(),
                    status: OrderStatus::Open,
                    signatures: Signatures::default(),
                },
            );
            tables.insert_children(id, order, fault)?;
            Ok(id)
        })
        .await
    }

    async fn update(&self, id: OrderId, order: &PaymentOrder) -> OrderResult<()> {
        self.write(|tables, fault| {
            fault.check(WriteStage::Header)?;
            let stored = tables.headers.get_mut(&id).ok_or(OrderError::NotFound(id))?;
            stored.header = order.header.clone();

            fault.check(WriteStage::ClearChildren)?;
            tables.line_items.retain(|(owner, _)| *owner != id);
            tables.allocations.retain(|(owner, _)| *owner != id);
            tables.installments.retain(|(owner, _)| *owner != id);

            tables.insert_children(id, order, fault)
        })
        .await
    }

    async fn get_by_id(&self, id: OrderId) -> OrderResult<Option<OrderView>> {
        let tables = self.tables.read().await;
        Ok(tables.headers.get(&id).map(|stored| tables.project(id, stored)))
    }

    async fn get_details(&self, id: OrderId) -> OrderResult<Option<OrderDetails>> {
        let tables = self.tables.read().await;
        if !tables.headers.contains_key(&id) {
            return Ok(None);
        }

        fn owned_by<T: Clone>(rows: &[(OrderId, T)], id: OrderId) -> Vec<T> {
            rows.iter()
                .filter(|(owner, _)| *owner == id)
                .map(|(_, row)| row.clone())
                .collect()
        }

        Ok(Some(OrderDetails {
            order_id: id,
            line_items: owned_by(&tables.line_items, id),
            allocations: owned_by(&tables.allocations, id),
            installments: owned_by(&tables.installments, id),
        }))
    }

    async fn list_pending(&self) -> OrderResult<Vec<OrderView>> {
        let tables = self.tables.read().await;
        Ok(tables
            .views_newest_first()
            .filter(|view| view.status == OrderStatus::Open && view.is_pending())
            .collect())
    }

    async fn cancel(&self, id: OrderId) -> OrderResult<()> {
        self.write(|tables, fault| {
            fault.check(WriteStage::Header)?;
            let stored = tables.headers.get_mut(&id).ok_or(OrderError::NotFound(id))?;
            stored.status = OrderStatus::Cancelled;
            Ok(())
        })
        .await
    }

    async fn search(&self, predicate: &Predicate) -> OrderResult<Vec<OrderView>> {
        let tables = self.tables.read().await;
        Ok(tables
            .views_newest_first()
            .filter(|view| predicate.matches(view))
            .collect())
    }

    async fn record_signature(
        &self,
        id: OrderId,
        slot: SlotNumber,
        token: &str,
        signer: &str,
        signed_at: DateTime<Utc>,
    ) -> OrderResult<()> {
        self.write(|tables, fault| {
            fault.check(WriteStage::Signature)?;
            let stored = tables.headers.get_mut(&id).ok_or(OrderError::NotFound(id))?;
            if stored.status == OrderStatus::Cancelled {
                return Err(OrderError::structural(format!(
                    "order {} is cancelled and cannot be signed",
                    id
                )));
            }
            if !stored.signatures.slot(slot).is_empty() {
                return Err(OrderError::structural(format!(
                    "signature slot {} of order {} is already signed",
                    slot, id
                )));
            }
            stored.signatures.set(
                slot,
                SignatureSlot::Signed {
                    token: token.to_string(),
                    signer: signer.to_string(),
                    signed_at,
                },
            );
            Ok(())
        })
        .await
    }

    async fn signatures(&self, id: OrderId) -> OrderResult<Option<Signatures>> {
        let tables = self.tables.read().await;
        Ok(tables.headers.get(&id).map(|stored| stored.signatures.clone()))
    }
}

const DEFAULT_LOOKUP_LIMIT: usize = 10;

/// Reference lists and signer permissions held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDirectory {
    management_accounts: Vec<String>,
    cost_centers: Vec<String>,
    suppliers: Vec<Supplier>,
    branches: Vec<String>,
    permissions: HashMap<String, [bool; 3]>,
    lookup_limit: usize,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self {
            management_accounts: Vec::new(),
            cost_centers: Vec::new(),
            suppliers: Vec::new(),
            branches: Vec::new(),
            permissions: HashMap::new(),
            lookup_limit: DEFAULT_LOOKUP_LIMIT,
        }
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_management_accounts<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.management_accounts.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_cost_centers<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cost_centers.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn with_suppliers(mut self, suppliers: impl IntoIterator<Item = Supplier>) -> Self {
        self.suppliers.extend(suppliers);
        self
    }

    pub fn with_branches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.branches.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_lookup_limit(mut self, limit: usize) -> Self {
        self.lookup_limit = limit;
        self
    }

    /// Allow `signer` to fill `slot`. Signer names compare case-insensitively.
    pub fn grant(mut self, signer: &str, slot: SlotNumber) -> Self {
        let flags = self.permissions.entry(signer.to_uppercase()).or_default();
        flags[usize::from(slot.get() - 1)] = true;
        self
    }
}

fn lookup(entries: &[String], query: Option<&str>) -> Vec<String> {
    let mut found: Vec<String> = match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => entries.to_vec(),
        Some(q) => {
            let exact: Vec<String> = entries.iter().filter(|e| e.as_str() == q).cloned().collect();
            if exact.is_empty() {
                let needle = q.to_lowercase();
                entries
                    .iter()
                    .filter(|e| e.to_lowercase().contains(&needle))
                    .cloned()
                    .collect()
            } else {
                exact
            }
        }
    };
    found.sort();
    found
}

#[async_trait]
impl DirectoryRepository for InMemoryDirectory {
    async fn management_accounts(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        Ok(lookup(&self.management_accounts, query))
    }

    async fn cost_centers(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        Ok(lookup(&self.cost_centers, query))
    }

    async fn suppliers(&self, query: &str) -> OrderResult<Vec<String>> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .suppliers
            .iter()
            .map(Supplier::to_string)
            .filter(|s| s.to_lowercase().contains(&needle))
            .take(self.lookup_limit)
            .collect())
    }

    async fn branches(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        let upper: Vec<String> = self.branches.iter().map(|b| b.to_uppercase()).collect();
        Ok(lookup(&upper, query))
    }
}

#[async_trait]
impl PermissionDirectory for InMemoryDirectory {
    async fn has_signature_permission(&self, signer: &str, slot: SlotNumber) -> OrderResult<bool> {
        Ok(self
            .permissions
            .get(&signer.to_uppercase())
            .map(|flags| flags[usize::from(slot.get() - 1)])
            .unwrap_or(false))
    }
}
