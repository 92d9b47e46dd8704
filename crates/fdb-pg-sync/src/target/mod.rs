//! PostgreSQL destination operations.
//!
//! The destination is written through one set-based upsert statement per
//! batch: `INSERT ... ON CONFLICT (identifier) DO UPDATE` with the
//! quantity-remain column folded through `COALESCE`, so an existing non-null
//! balance always wins over the incoming quantity. Every value is a bound
//! parameter; identifiers come from validated configuration.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::{Result, SyncError};
use crate::value::SqlValue;

/// PostgreSQL caps bound parameters per statement at 65535; leave headroom.
pub const MAX_BIND_PARAMS: usize = 60_000;

/// A source row reduced to what the destination needs: the projected
/// values in spec order plus the derived quantity, which seeds the
/// quantity-remain column.
#[derive(Debug, Clone)]
pub struct ReconciledRow {
    /// Values in column-spec order, identifier included.
    pub values: Vec<SqlValue>,

    /// Quantity as a decimal; becomes quantity-remain on insert and the
    /// COALESCE fallback on update.
    pub quantity: Decimal,
}

/// The write plan shared by every batch of a run.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    /// Destination table name.
    pub table: String,

    /// Effective column names, in spec order.
    pub columns: Vec<String>,

    /// Unique identifier column (conflict target).
    pub identifier_column: String,

    /// Destination-only remaining-quantity column.
    pub quantity_remain_column: String,
}

impl UpsertPlan {
    /// Bound parameters consumed by one row.
    pub fn params_per_row(&self) -> usize {
        self.columns.len() + 1
    }

    /// Build the upsert statement for a batch of `row_count` rows.
    pub fn statement(&self, row_count: usize) -> String {
        let insert_columns = format!(
            "{}, {}",
            self.columns.join(", "),
            self.quantity_remain_column
        );

        let width = self.params_per_row();
        let mut value_groups = Vec::with_capacity(row_count);
        for row in 0..row_count {
            let params: Vec<String> = (1..=width).map(|i| format!("${}", row * width + i)).collect();
            value_groups.push(format!("({})", params.join(", ")));
        }

        let mut set_list: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(&self.identifier_column))
            .map(|c| format!("{} = EXCLUDED.{}", c, c))
            .collect();
        set_list.push(format!(
            "{qr} = COALESCE({table}.{qr}, EXCLUDED.{qr})",
            qr = self.quantity_remain_column,
            table = self.table
        ));

        format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {}",
            self.table,
            insert_columns,
            value_groups.join(", "),
            self.identifier_column,
            set_list.join(", ")
        )
    }
}

/// Seam between the reconciliation engine and the destination.
#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// Apply one batch of rows; returns the number of rows applied.
    async fn upsert_batch(&self, plan: &UpsertPlan, rows: &[ReconciledRow]) -> Result<u64>;
}

/// PostgreSQL destination store.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create a pooled connection to the destination and probe it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TargetUnavailable`] if the pool cannot be built
    /// or the probe query fails.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let pg_config = config.pg_config();

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| SyncError::TargetUnavailable(format!("failed to create pool: {}", e)))?;

        // Probe
        let client = pool
            .get()
            .await
            .map_err(|e| SyncError::TargetUnavailable(e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SyncError::TargetUnavailable(e.to_string()))?;

        info!(
            "Connected to PostgreSQL destination: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// Destination column names for a table, in ordinal order. Names come
    /// back lower-cased by the catalog since the destination table is
    /// created with unquoted identifiers.
    pub async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "reading destination columns"))?;

        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_schema = current_schema()
                   AND lower(table_name) = lower($1)
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    /// Whether the identifier column carries a single-column unique
    /// constraint or index. The set-based upsert depends on one.
    pub async fn has_unique_identifier(&self, table: &str, column: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "checking identifier uniqueness"))?;

        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1
                    FROM pg_index i
                    JOIN pg_class c ON c.oid = i.indrelid
                    JOIN pg_namespace n ON n.oid = c.relnamespace
                    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = i.indkey[0]
                    WHERE n.nspname = current_schema()
                      AND lower(c.relname) = lower($1)
                      AND i.indisunique
                      AND i.indnkeyatts = 1
                      AND lower(a.attname) = lower($2)
                )",
                &[&table, &column],
            )
            .await?;

        Ok(row.get(0))
    }
}

#[async_trait]
impl ReconcileStore for PgStore {
    async fn upsert_batch(&self, plan: &UpsertPlan, rows: &[ReconciledRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| SyncError::pool(e.to_string(), "getting upsert connection"))?;

        let sql = plan.statement(rows.len());
        debug!("upsert batch: {} rows", rows.len());

        let mut params: Vec<&(dyn ToSql + Sync)> =
            Vec::with_capacity(rows.len() * plan.params_per_row());
        for row in rows {
            for value in &row.values {
                params.push(value);
            }
            params.push(&row.quantity);
        }

        let applied = client
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| SyncError::write(plan.table.clone(), e))?;

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> UpsertPlan {
        UpsertPlan {
            table: "Label_Data".to_string(),
            columns: vec![
                "ITEMCODE1".to_string(),
                "QTY1".to_string(),
                "DTLKEY1".to_string(),
                "DOCDATE".to_string(),
            ],
            identifier_column: "DTLKEY1".to_string(),
            quantity_remain_column: "qtyremain".to_string(),
        }
    }

    #[test]
    fn test_single_row_statement() {
        let sql = plan().statement(1);
        assert_eq!(
            sql,
            "INSERT INTO Label_Data (ITEMCODE1, QTY1, DTLKEY1, DOCDATE, qtyremain) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (DTLKEY1) DO UPDATE SET \
             ITEMCODE1 = EXCLUDED.ITEMCODE1, QTY1 = EXCLUDED.QTY1, \
             DOCDATE = EXCLUDED.DOCDATE, \
             qtyremain = COALESCE(Label_Data.qtyremain, EXCLUDED.qtyremain)"
        );
    }

    #[test]
    fn test_batch_statement_numbers_parameters_contiguously() {
        let sql = plan().statement(3);
        assert!(sql.contains("($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10), ($11, $12, $13, $14, $15)"));
    }

    #[test]
    fn test_identifier_excluded_from_set_list() {
        let sql = plan().statement(1);
        assert!(!sql.contains("DTLKEY1 = EXCLUDED.DTLKEY1"));
        assert!(sql.contains("ON CONFLICT (DTLKEY1)"));
    }

    #[test]
    fn test_coalesce_prefers_stored_quantity_remain() {
        let sql = plan().statement(2);
        assert!(sql.contains("qtyremain = COALESCE(Label_Data.qtyremain, EXCLUDED.qtyremain)"));
        // quantity-remain must not be overwritten unconditionally
        assert!(!sql.contains("qtyremain = EXCLUDED.qtyremain,"));
    }

    #[test]
    fn test_column_order_is_stable() {
        let sql = plan().statement(1);
        let insert_part = sql.split("VALUES").next().unwrap();
        let itemcode = insert_part.find("ITEMCODE1").unwrap();
        let qty = insert_part.find("QTY1").unwrap();
        let dtlkey = insert_part.find("DTLKEY1").unwrap();
        let docdate = insert_part.find("DOCDATE").unwrap();
        let remain = insert_part.find("qtyremain").unwrap();
        assert!(itemcode < qty && qty < dtlkey && dtlkey < docdate && docdate < remain);
    }

    #[test]
    fn test_params_per_row_counts_quantity_remain() {
        assert_eq!(plan().params_per_row(), 5);
    }
}
