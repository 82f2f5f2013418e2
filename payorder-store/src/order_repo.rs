use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use payorder_core::models::{
    CostCenterAllocation, InstallmentEntry, LineItem, OrderDetails, OrderHeader, OrderId,
    OrderStatus, OrderView, PaymentOrder, SignatureSlot, Signatures, SlotNumber,
};
use payorder_core::repository::OrderRepository;
use payorder_core::search::{FilterValue, Predicate};
use payorder_core::supplier::Supplier;
use payorder_core::{OrderError, OrderResult};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};

use crate::error::classify;

/// Header columns joined with the per-order line item total. Search clauses
/// refer to the `o.` alias.
const VIEW_SELECT: &str = r#"
    SELECT o.id, o.status, o.branch, o.supplier_name, o.supplier_cnpj, o.management_account,
           o.invoice_number, o.invoice_series, o.payment_method, o.installment_count,
           o.item_count, o.tax_amount, o.posting_date, o.note, o.posting_type, o.created_by,
           COALESCE(t.total, 0) AS total_amount,
           o.signature_token_1, o.signer_1, o.signed_at_1,
           o.signature_token_2, o.signer_2, o.signed_at_2,
           o.signature_token_3, o.signer_3, o.signed_at_3
    FROM payment_orders o
    LEFT JOIN (
        SELECT order_id, SUM(amount) AS total
        FROM order_line_items
        GROUP BY order_id
    ) t ON t.order_id = o.id"#;

const INSERT_HEADER: &str = r#"
    INSERT INTO payment_orders (
        branch, supplier_name, supplier_cnpj, management_account, invoice_number,
        invoice_series, payment_method, installment_count, item_count, tax_amount,
        posting_date, note, posting_type, created_by
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    RETURNING id"#;

const UPDATE_HEADER: &str = r#"
    UPDATE payment_orders SET
        branch = $1, supplier_name = $2, supplier_cnpj = $3, management_account = $4,
        invoice_number = $5, invoice_series = $6, payment_method = $7,
        installment_count = $8, item_count = $9, tax_amount = $10, posting_date = $11,
        note = $12, posting_type = $13, created_by = $14, updated_at = NOW()
    WHERE id = $15"#;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    status: String,
    branch: String,
    supplier_name: String,
    supplier_cnpj: Option<String>,
    management_account: String,
    invoice_number: String,
    invoice_series: String,
    payment_method: String,
    installment_count: i32,
    item_count: i32,
    tax_amount: Decimal,
    posting_date: NaiveDate,
    note: Option<String>,
    posting_type: String,
    created_by: String,
    total_amount: Decimal,
    #[sqlx(flatten)]
    signatures: SignatureRow,
}

#[derive(sqlx::FromRow)]
struct SignatureRow {
    signature_token_1: Option<String>,
    signer_1: Option<String>,
    signed_at_1: Option<DateTime<Utc>>,
    signature_token_2: Option<String>,
    signer_2: Option<String>,
    signed_at_2: Option<DateTime<Utc>>,
    signature_token_3: Option<String>,
    signer_3: Option<String>,
    signed_at_3: Option<DateTime<Utc>>,
}

impl From<SignatureRow> for Signatures {
    fn from(row: SignatureRow) -> Self {
        Signatures::new([
            SignatureSlot::from_columns(row.signature_token_1, row.signer_1, row.signed_at_1),
            SignatureSlot::from_columns(row.signature_token_2, row.signer_2, row.signed_at_2),
            SignatureSlot::from_columns(row.signature_token_3, row.signer_3, row.signed_at_3),
        ])
    }
}

impl OrderRow {
    fn into_view(self) -> OrderResult<OrderView> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            OrderError::Transaction(format!("unknown order status {:?}", self.status).into())
        })?;
        let header = OrderHeader {
            branch: self.branch,
            supplier: Supplier::new(self.supplier_name, self.supplier_cnpj),
            management_account: self.management_account,
            invoice_number: self.invoice_number,
            invoice_series: self.invoice_series,
            payment_method: self.payment_method,
            installment_count: self.installment_count,
            item_count: self.item_count,
            tax_amount: self.tax_amount,
            posting_date: self.posting_date,
            note: self.note,
            posting_type: self.posting_type,
            created_by: self.created_by,
        };
        let signatures = Signatures::from(self.signatures);
        Ok(OrderView::project(
            OrderId(self.id),
            status,
            &header,
            self.total_amount,
            &signatures,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    product_name: String,
    amount: Decimal,
    cost_center_ref: String,
}

#[derive(sqlx::FromRow)]
struct AllocationRow {
    cost_center: String,
    amount: Decimal,
}

#[derive(sqlx::FromRow)]
struct InstallmentRow {
    due_date: NaiveDate,
    bank: String,
    branch_code: String,
    account: String,
    pix_type: Option<String>,
    pix_key: Option<String>,
}

fn bind_header<'q>(
    query: Query<'q, Postgres, PgArguments>,
    header: &'q OrderHeader,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(header.branch.as_str())
        .bind(header.supplier.name.as_str())
        .bind(header.supplier.cnpj.as_deref())
        .bind(header.management_account.as_str())
        .bind(header.invoice_number.as_str())
        .bind(header.invoice_series.as_str())
        .bind(header.payment_method.as_str())
        .bind(header.installment_count)
        .bind(header.item_count)
        .bind(header.tax_amount)
        .bind(header.posting_date)
        .bind(header.note.as_deref())
        .bind(header.posting_type.as_str())
        .bind(header.created_by.as_str())
}

/// Column names are fixed per slot; never built from input.
fn signature_update_sql(slot: SlotNumber) -> &'static str {
    match slot.get() {
        1 => "UPDATE payment_orders SET signature_token_1 = $1, signer_1 = $2, signed_at_1 = $3, updated_at = NOW() WHERE id = $4 AND status = 'OPEN' AND signature_token_1 IS NULL",
        2 => "UPDATE payment_orders SET signature_token_2 = $1, signer_2 = $2, signed_at_2 = $3, updated_at = NOW() WHERE id = $4 AND status = 'OPEN' AND signature_token_2 IS NULL",
        _ => "UPDATE payment_orders SET signature_token_3 = $1, signer_3 = $2, signed_at_3 = $3, updated_at = NOW() WHERE id = $4 AND status = 'OPEN' AND signature_token_3 IS NULL",
    }
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Allocations, then line items, then installments, all inside `tx`.
    async fn insert_children(
        tx: &mut Transaction<'_, Postgres>,
        id: OrderId,
        order: &PaymentOrder,
    ) -> OrderResult<()> {
        for allocation in &order.allocations {
            sqlx::query(
                "INSERT INTO order_cost_allocations (order_id, cost_center, amount) VALUES ($1, $2, $3)",
            )
            .bind(id.0)
            .bind(allocation.cost_center.as_str())
            .bind(allocation.amount)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        }

        for item in &order.line_items {
            sqlx::query(
                "INSERT INTO order_line_items (order_id, product_name, amount, cost_center_ref) VALUES ($1, $2, $3, $4)",
            )
            .bind(id.0)
            .bind(item.product_name.as_str())
            .bind(item.amount)
            .bind(item.cost_center_ref.as_str())
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        }

        for entry in &order.installments {
            sqlx::query(
                r#"
                INSERT INTO order_installments (order_id, due_date, bank, branch_code, account, pix_type, pix_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(id.0)
            .bind(entry.due_date)
            .bind(entry.bank.as_str())
            .bind(entry.branch_code.as_str())
            .bind(entry.account.as_str())
            .bind(entry.pix_type.as_deref())
            .bind(entry.pix_key.as_deref())
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        }

        Ok(())
    }

    async fn exists(&self, id: OrderId) -> OrderResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM payment_orders WHERE id = $1)")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)
    }

    async fn fetch_views(&self, sql: &str, params: &[FilterValue]) -> OrderResult<Vec<OrderView>> {
        let mut query = sqlx::query_as::<_, OrderRow>(sql);
        for param in params {
            query = match param {
                FilterValue::Pattern(pattern) => query.bind(pattern.as_str()),
                FilterValue::Date(date) => query.bind(*date),
            };
        }
        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;
        rows.into_iter().map(OrderRow::into_view).collect()
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[instrument(skip(self, order), fields(invoice = %order.header.invoice_number))]
    async fn create(&self, order: &PaymentOrder) -> OrderResult<OrderId> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let row = bind_header(sqlx::query(INSERT_HEADER), &order.header)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
        let id = OrderId(row.try_get("id").map_err(classify)?);

        Self::insert_children(&mut tx, id, order).await?;
        tx.commit().await.map_err(classify)?;

        debug!(order_id = %id, "Inserted payment order rows");
        Ok(id)
    }

    #[instrument(skip(self, order), fields(order_id = %id))]
    async fn update(&self, id: OrderId, order: &PaymentOrder) -> OrderResult<()> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let updated = bind_header(sqlx::query(UPDATE_HEADER), &order.header)
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        if updated.rows_affected() == 0 {
            return Err(OrderError::NotFound(id));
        }

        for table in ["order_cost_allocations", "order_line_items", "order_installments"] {
            sqlx::query(&format!("DELETE FROM {} WHERE order_id = $1", table))
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }

        Self::insert_children(&mut tx, id, order).await?;
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn get_by_id(&self, id: OrderId) -> OrderResult<Option<OrderView>> {
        let sql = format!("{} WHERE o.id = $1", VIEW_SELECT);
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.map(OrderRow::into_view).transpose()
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn get_details(&self, id: OrderId) -> OrderResult<Option<OrderDetails>> {
        if !self.exists(id).await? {
            return Ok(None);
        }

        let line_items = sqlx::query_as::<_, LineItemRow>(
            "SELECT product_name, amount, cost_center_ref FROM order_line_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let allocations = sqlx::query_as::<_, AllocationRow>(
            "SELECT cost_center, amount FROM order_cost_allocations WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        let installments = sqlx::query_as::<_, InstallmentRow>(
            r#"
            SELECT due_date, bank, branch_code, account, pix_type, pix_key
            FROM order_installments WHERE order_id = $1 ORDER BY id
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(Some(OrderDetails {
            order_id: id,
            line_items: line_items
                .into_iter()
                .map(|r| LineItem {
                    product_name: r.product_name,
                    amount: r.amount,
                    cost_center_ref: r.cost_center_ref,
                })
                .collect(),
            allocations: allocations
                .into_iter()
                .map(|r| CostCenterAllocation {
                    cost_center: r.cost_center,
                    amount: r.amount,
                })
                .collect(),
            installments: installments
                .into_iter()
                .map(|r| InstallmentEntry {
                    due_date: r.due_date,
                    bank: r.bank,
                    branch_code: r.branch_code,
                    account: r.account,
                    pix_type: r.pix_type,
                    pix_key: r.pix_key,
                })
                .collect(),
        }))
    }

    async fn list_pending(&self) -> OrderResult<Vec<OrderView>> {
        let sql = format!(
            "{} WHERE o.status = 'OPEN' AND (o.signature_token_1 IS NULL OR o.signature_token_2 IS NULL OR o.signature_token_3 IS NULL) ORDER BY o.id DESC",
            VIEW_SELECT
        );
        self.fetch_views(&sql, &[]).await
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn cancel(&self, id: OrderId) -> OrderResult<()> {
        let result = sqlx::query(
            "UPDATE payment_orders SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(OrderStatus::Cancelled.as_str())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(OrderError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(clauses = predicate.clauses().len()))]
    async fn search(&self, predicate: &Predicate) -> OrderResult<Vec<OrderView>> {
        let sql = format!("{}{} ORDER BY o.id DESC", VIEW_SELECT, predicate.where_sql());
        self.fetch_views(&sql, predicate.params()).await
    }

    #[instrument(skip(self, token), fields(order_id = %id, slot = %slot))]
    async fn record_signature(
        &self,
        id: OrderId,
        slot: SlotNumber,
        token: &str,
        signer: &str,
        signed_at: DateTime<Utc>,
    ) -> OrderResult<()> {
        let result = sqlx::query(signature_update_sql(slot))
            .bind(token)
            .bind(signer)
            .bind(signed_at)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            // the order is gone, was cancelled, or another signer got there first
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM payment_orders WHERE id = $1",
            )
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

            return match status {
                None => Err(OrderError::NotFound(id)),
                Some(s) if OrderStatus::parse(&s) == Some(OrderStatus::Cancelled) => Err(
                    OrderError::structural(format!("order {} is cancelled and cannot be signed", id)),
                ),
                Some(_) => Err(OrderError::structural(format!(
                    "signature slot {} of order {} is already signed",
                    slot, id
                ))),
            };
        }
        Ok(())
    }

    async fn signatures(&self, id: OrderId) -> OrderResult<Option<Signatures>> {
        let row = sqlx::query_as::<_, SignatureRow>(
            r#"
            SELECT signature_token_1, signer_1, signed_at_1,
                   signature_token_2, signer_2, signed_at_2,
                   signature_token_3, signer_3, signed_at_3
            FROM payment_orders WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        Ok(row.map(Signatures::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_sql_targets_one_slot() {
        for slot in SlotNumber::ALL {
            let sql = signature_update_sql(slot);
            let n = slot.get();
            assert!(sql.contains(&format!("signature_token_{n} = $1")));
            assert!(sql.contains(&format!("signed_at_{n} = $3")));
            assert!(sql.ends_with(&format!("AND status = 'OPEN' AND signature_token_{n} IS NULL")));
            for other in SlotNumber::ALL.into_iter().filter(|s| *s != slot) {
                assert!(!sql.contains(&format!("signer_{}", other.get())));
            }
        }
    }

    #[test]
    fn test_search_sql_appends_predicate() {
        use payorder_core::search::{build_filter, SearchCriteria, SearchField};

        let predicate = build_filter(
            &SearchCriteria::default()
                .with(SearchField::Supplier, "acme")
                .with(SearchField::ItemCount, "2"),
        );
        let sql = format!("{}{} ORDER BY o.id DESC", VIEW_SELECT, predicate.where_sql());
        assert!(sql.ends_with(
            "WHERE o.supplier_name ILIKE $1 AND CAST(o.item_count AS TEXT) LIKE $2 ORDER BY o.id DESC"
        ));
    }
}
