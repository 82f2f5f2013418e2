use async_trait::async_trait;
use payorder_core::models::SlotNumber;
use payorder_core::repository::{DirectoryRepository, PermissionDirectory};
use payorder_core::search::escape_like;
use payorder_core::supplier::Supplier;
use payorder_core::OrderResult;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::error::classify;

/// Reference lists keyed by a single text column. The table and column
/// names are compile-time constants.
#[derive(Debug, Clone, Copy)]
struct CodeList {
    table: &'static str,
    column: &'static str,
}

const MANAGEMENT_ACCOUNTS: CodeList = CodeList {
    table: "management_accounts",
    column: "code",
};

const COST_CENTERS: CodeList = CodeList {
    table: "cost_centers",
    column: "code",
};

const BRANCHES: CodeList = CodeList {
    table: "branches",
    column: "UPPER(name)",
};

pub struct PgDirectoryRepository {
    pool: PgPool,
    lookup_limit: i64,
}

impl PgDirectoryRepository {
    pub fn new(pool: PgPool, lookup_limit: i64) -> Self {
        Self { pool, lookup_limit }
    }

    async fn fetch_codes(
        &self,
        list: CodeList,
        filter: &str,
        value: Option<&str>,
    ) -> OrderResult<Vec<String>> {
        let sql = format!(
            "SELECT {col} AS code FROM {table}{filter} ORDER BY code",
            col = list.column,
            table = list.table,
            filter = filter,
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }
        query.fetch_all(&self.pool).await.map_err(classify)
    }

    /// Exact match first, then case-insensitive substring.
    async fn lookup(&self, list: CodeList, query: Option<&str>) -> OrderResult<Vec<String>> {
        let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) else {
            return self.fetch_codes(list, "", None).await;
        };

        let exact_filter = format!(" WHERE {} = $1", list.column);
        let exact = self.fetch_codes(list, &exact_filter, Some(q)).await?;
        if !exact.is_empty() {
            return Ok(exact);
        }

        let pattern = format!("%{}%", escape_like(q));
        let fuzzy_filter = format!(" WHERE {} ILIKE $1", list.column);
        self.fetch_codes(list, &fuzzy_filter, Some(&pattern)).await
    }
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    async fn management_accounts(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.lookup(MANAGEMENT_ACCOUNTS, query).await
    }

    async fn cost_centers(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.lookup(COST_CENTERS, query).await
    }

    #[instrument(skip(self))]
    async fn suppliers(&self, query: &str) -> OrderResult<Vec<String>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            SELECT name, cnpj FROM suppliers
            WHERE name || COALESCE(' - CNPJ ' || cnpj, '') ILIKE $1
            ORDER BY name
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(self.lookup_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        debug!(found = rows.len(), "Supplier lookup");
        Ok(rows
            .into_iter()
            .map(|(name, cnpj)| Supplier::new(name, cnpj).to_string())
            .collect())
    }

    async fn branches(&self, query: Option<&str>) -> OrderResult<Vec<String>> {
        self.lookup(BRANCHES, query).await
    }
}

#[async_trait]
impl PermissionDirectory for PgDirectoryRepository {
    #[instrument(skip(self), fields(slot = %slot))]
    async fn has_signature_permission(&self, signer: &str, slot: SlotNumber) -> OrderResult<bool> {
        let sql = match slot.get() {
            1 => "SELECT can_sign_1 FROM signers WHERE UPPER(name) = UPPER($1)",
            2 => "SELECT can_sign_2 FROM signers WHERE UPPER(name) = UPPER($1)",
            _ => "SELECT can_sign_3 FROM signers WHERE UPPER(name) = UPPER($1)",
        };
        let allowed = sqlx::query_scalar::<_, bool>(sql)
            .bind(signer)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(allowed.unwrap_or(false))
    }
}
