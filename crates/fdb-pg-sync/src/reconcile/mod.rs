//! Reconciliation engine and run coordinator.
//!
//! The engine consumes the extracted row set, derives the identifier and
//! quantity for every row, and applies the rows to the destination in
//! batches, in row-set order. The first failure aborts the run; batches
//! already applied stay applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::columns::ColumnSpec;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::source::{FirebirdSource, RowSet};
use crate::target::{PgStore, ReconcileStore, ReconciledRow, UpsertPlan, MAX_BIND_PARAMS};
use crate::value::SqlValue;

/// Result of a completed sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Rows extracted from the source.
    pub rows_read: usize,

    /// Rows applied to the destination (inserted or updated).
    pub rows_applied: u64,

    /// Upsert statements issued.
    pub batches: usize,
}

impl SyncReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connection probe results for both sides.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.source_connected && self.target_connected
    }
}

/// Derive per-row reconciliation values from the extracted row set.
///
/// Every row must carry a non-null, non-empty identifier and a quantity
/// coercible to decimal; the first offending row aborts the run.
pub fn derive_rows(
    row_set: RowSet,
    identifier_column: &str,
    quantity_column: &str,
) -> Result<Vec<ReconciledRow>> {
    let identifier_idx = index_of(&row_set.columns, identifier_column).ok_or_else(|| {
        SyncError::Schema(format!(
            "identifier column '{}' missing from extracted row set",
            identifier_column
        ))
    })?;
    let quantity_idx = index_of(&row_set.columns, quantity_column).ok_or_else(|| {
        SyncError::Schema(format!(
            "quantity column '{}' missing from extracted row set",
            quantity_column
        ))
    })?;

    let mut rows = Vec::with_capacity(row_set.rows.len());

    for (row_index, values) in row_set.rows.into_iter().enumerate() {
        let identifier = &values[identifier_idx];
        let id_missing = match identifier {
            SqlValue::Null(_) => true,
            SqlValue::Text(s) => s.trim().is_empty(),
            _ => false,
        };
        if id_missing {
            return Err(SyncError::NullIdentifier {
                row_index,
                column: identifier_column.to_string(),
            });
        }

        let quantity = values[quantity_idx].to_decimal(quantity_column)?;

        rows.push(ReconciledRow { values, quantity });
    }

    Ok(rows)
}

fn index_of(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.eq_ignore_ascii_case(name))
}

/// Clamp the configured batch size so a single statement stays under the
/// destination's bound-parameter limit.
pub fn effective_batch_size(batch_size: usize, params_per_row: usize) -> usize {
    batch_size.min(MAX_BIND_PARAMS / params_per_row.max(1)).max(1)
}

/// Apply rows to the destination in batches, in row-set order.
/// Returns rows applied and statements issued.
pub async fn apply<S: ReconcileStore>(
    store: &S,
    plan: &UpsertPlan,
    rows: &[ReconciledRow],
    batch_size: usize,
) -> Result<(u64, usize)> {
    let batch_size = effective_batch_size(batch_size, plan.params_per_row());

    let mut applied = 0u64;
    let mut batches = 0usize;

    for chunk in rows.chunks(batch_size) {
        applied += store.upsert_batch(plan, chunk).await?;
        batches += 1;
    }

    Ok((applied, batches))
}

/// Run coordinator: connects both sides, validates the destination schema,
/// then extracts and reconciles.
pub struct Reconciler {
    config: Config,
    spec: ColumnSpec,
    source: FirebirdSource,
    store: PgStore,
}

impl Reconciler {
    /// Connect to source and destination and resolve the column spec.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let spec = ColumnSpec::from_tables(&config.sync.tables)?;
        let source = FirebirdSource::connect(&config.source).await?;
        let store = PgStore::connect(&config.target).await?;
        Ok(Self {
            config,
            spec,
            source,
            store,
        })
    }

    fn plan(&self) -> UpsertPlan {
        UpsertPlan {
            table: self.config.sync.table.clone(),
            columns: self.spec.effective_names(),
            identifier_column: self.config.sync.identifier_column.clone(),
            quantity_remain_column: self.config.sync.quantity_remain_column.clone(),
        }
    }

    /// Validate the declared projection against the destination table:
    /// every projected column plus quantity-remain must exist, and the
    /// identifier column must be uniquely constrained (the upsert depends
    /// on it; without one, concurrent writers could race in duplicates).
    async fn validate_destination(&self) -> Result<()> {
        let table = &self.config.sync.table;

        let existing = self.store.column_names(table).await?;
        if existing.is_empty() {
            return Err(SyncError::Schema(format!(
                "destination table '{}' does not exist",
                table
            )));
        }

        let mut missing = Vec::new();
        let mut expected = self.spec.effective_names();
        expected.push(self.config.sync.quantity_remain_column.clone());
        for name in &expected {
            if !existing.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                missing.push(name.clone());
            }
        }
        if !missing.is_empty() {
            return Err(SyncError::Schema(format!(
                "destination table '{}' is missing columns: {}",
                table,
                missing.join(", ")
            )));
        }

        let identifier = &self.config.sync.identifier_column;
        if !self.store.has_unique_identifier(table, identifier).await? {
            return Err(SyncError::Schema(format!(
                "identifier column '{}' on '{}' has no unique constraint or index",
                identifier, table
            )));
        }

        Ok(())
    }

    /// Validate configuration and destination schema without writing.
    pub async fn check(&self) -> Result<()> {
        self.validate_destination().await?;
        info!("Destination schema matches the declared projection");
        Ok(())
    }

    /// Execute a full sync run.
    pub async fn run(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        info!("Starting sync run: {}", run_id);

        info!("Phase 1: Validating destination schema");
        self.validate_destination().await?;

        info!("Phase 2: Extracting source rows");
        let row_set = self
            .source
            .extract(&self.config.sync, &self.spec)
            .await?;
        let rows_read = row_set.len();

        if row_set.is_empty() {
            warn!("Source row set is empty; nothing to reconcile");
        }

        info!("Phase 3: Reconciling {} rows", rows_read);
        let rows = derive_rows(
            row_set,
            &self.config.sync.identifier_column,
            &self.config.sync.quantity_column,
        )?;

        let plan = self.plan();
        let (rows_applied, batches) =
            apply(&self.store, &plan, &rows, self.config.sync.batch_size).await?;

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        info!(
            "Sync run {} completed: {} rows in {} batches ({:.2}s)",
            run_id, rows_applied, batches, duration_seconds
        );

        Ok(SyncReport {
            run_id,
            started_at,
            completed_at,
            duration_seconds,
            rows_read,
            rows_applied,
            batches,
        })
    }
}

/// Probe both connections independently and report latency.
pub async fn health_check(config: &Config) -> HealthReport {
    let start = Instant::now();
    let (source_connected, source_error) = match FirebirdSource::connect(&config.source).await {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    let source_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let (target_connected, target_error) = match PgStore::connect(&config.target).await {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };
    let target_latency_ms = start.elapsed().as_millis() as u64;

    HealthReport {
        source_connected,
        source_latency_ms,
        source_error,
        target_connected,
        target_latency_ms,
        target_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    use crate::value::{SqlNullType, SqlValue};

    /// In-memory stand-in for the destination, reproducing the upsert's
    /// insert-or-update and COALESCE behavior.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, StoredRecord>>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    #[derive(Debug, Clone)]
    struct StoredRecord {
        values: Vec<SqlValue>,
        qty_remain: Option<Decimal>,
    }

    impl MemoryStore {
        async fn seed(&self, plan: &UpsertPlan, values: Vec<SqlValue>, qty_remain: Option<Decimal>) {
            let key = record_key(plan, &values);
            self.records
                .lock()
                .await
                .insert(key, StoredRecord { values, qty_remain });
        }

        async fn get(&self, key: &SqlValue) -> Option<StoredRecord> {
            self.records.lock().await.get(&format!("{:?}", key)).cloned()
        }

        async fn len(&self) -> usize {
            self.records.lock().await.len()
        }
    }

    fn record_key(plan: &UpsertPlan, values: &[SqlValue]) -> String {
        let idx = plan
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&plan.identifier_column))
            .expect("identifier in plan");
        format!("{:?}", values[idx])
    }

    #[async_trait]
    impl ReconcileStore for MemoryStore {
        async fn upsert_batch(&self, plan: &UpsertPlan, rows: &[ReconciledRow]) -> Result<u64> {
            self.batch_sizes.lock().await.push(rows.len());
            let mut records = self.records.lock().await;
            for row in rows {
                let key = record_key(plan, &row.values);
                match records.get_mut(&key) {
                    Some(existing) => {
                        existing.values = row.values.clone();
                        existing.qty_remain = existing.qty_remain.or(Some(row.quantity));
                    }
                    None => {
                        records.insert(
                            key,
                            StoredRecord {
                                values: row.values.clone(),
                                qty_remain: Some(row.quantity),
                            },
                        );
                    }
                }
            }
            Ok(rows.len() as u64)
        }
    }

    fn test_plan() -> UpsertPlan {
        UpsertPlan {
            table: "Label_Data".to_string(),
            columns: vec![
                "DTLKEY1".to_string(),
                "QTY1".to_string(),
                "ITEMCODE1".to_string(),
            ],
            identifier_column: "DTLKEY1".to_string(),
            quantity_remain_column: "qtyremain".to_string(),
        }
    }

    fn row_set(rows: Vec<Vec<SqlValue>>) -> RowSet {
        RowSet {
            columns: vec![
                "DTLKEY1".to_string(),
                "QTY1".to_string(),
                "ITEMCODE1".to_string(),
            ],
            rows,
        }
    }

    fn source_row(key: &str, qty: i64, item: &str) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(key.to_string()),
            SqlValue::Decimal(Decimal::from(qty)),
            SqlValue::Text(item.to_string()),
        ]
    }

    #[tokio::test]
    async fn test_insert_seeds_quantity_remain() {
        let store = MemoryStore::default();
        let plan = test_plan();

        let rows = derive_rows(row_set(vec![source_row("100", 5, "A1")]), "DTLKEY1", "QTY1")
            .unwrap();
        let (applied, batches) = apply(&store, &plan, &rows, 500).await.unwrap();

        assert_eq!(applied, 1);
        assert_eq!(batches, 1);

        let record = store.get(&SqlValue::Text("100".into())).await.unwrap();
        assert_eq!(record.values, source_row("100", 5, "A1"));
        assert_eq!(record.qty_remain, Some(Decimal::from(5)));
    }

    #[tokio::test]
    async fn test_update_backfills_null_quantity_remain() {
        let store = MemoryStore::default();
        let plan = test_plan();
        store.seed(&plan, source_row("100", 9, "OLD"), None).await;

        let rows = derive_rows(row_set(vec![source_row("100", 5, "A1")]), "DTLKEY1", "QTY1")
            .unwrap();
        apply(&store, &plan, &rows, 500).await.unwrap();

        let record = store.get(&SqlValue::Text("100".into())).await.unwrap();
        assert_eq!(record.values, source_row("100", 5, "A1"));
        assert_eq!(record.qty_remain, Some(Decimal::from(5)));
    }

    #[tokio::test]
    async fn test_update_preserves_existing_quantity_remain() {
        let store = MemoryStore::default();
        let plan = test_plan();
        store
            .seed(&plan, source_row("100", 5, "A1"), Some(Decimal::from(5)))
            .await;

        // quantity drops to 3; the remaining balance must not move
        let rows = derive_rows(row_set(vec![source_row("100", 3, "A1")]), "DTLKEY1", "QTY1")
            .unwrap();
        apply(&store, &plan, &rows, 500).await.unwrap();

        let record = store.get(&SqlValue::Text("100".into())).await.unwrap();
        assert_eq!(record.values, source_row("100", 3, "A1"));
        assert_eq!(record.qty_remain, Some(Decimal::from(5)));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = MemoryStore::default();
        let plan = test_plan();

        let batch = vec![source_row("100", 5, "A1"), source_row("101", 2, "B2")];
        let rows = derive_rows(row_set(batch.clone()), "DTLKEY1", "QTY1").unwrap();
        apply(&store, &plan, &rows, 500).await.unwrap();

        let first_a = store.get(&SqlValue::Text("100".into())).await.unwrap();
        let first_b = store.get(&SqlValue::Text("101".into())).await.unwrap();

        let rows = derive_rows(row_set(batch), "DTLKEY1", "QTY1").unwrap();
        apply(&store, &plan, &rows, 500).await.unwrap();

        assert_eq!(store.len().await, 2);
        let second_a = store.get(&SqlValue::Text("100".into())).await.unwrap();
        let second_b = store.get(&SqlValue::Text("101".into())).await.unwrap();
        assert_eq!(first_a.values, second_a.values);
        assert_eq!(first_a.qty_remain, second_a.qty_remain);
        assert_eq!(first_b.values, second_b.values);
        assert_eq!(first_b.qty_remain, second_b.qty_remain);
    }

    #[tokio::test]
    async fn test_rows_split_into_batches_in_order() {
        let store = MemoryStore::default();
        let plan = test_plan();

        let batch: Vec<_> = (0..5)
            .map(|i| source_row(&format!("{}", 100 + i), i, "X"))
            .collect();
        let rows = derive_rows(row_set(batch), "DTLKEY1", "QTY1").unwrap();
        let (applied, batches) = apply(&store, &plan, &rows, 2).await.unwrap();

        assert_eq!(applied, 5);
        assert_eq!(batches, 3);
        assert_eq!(*store.batch_sizes.lock().await, vec![2, 2, 1]);
    }

    #[test]
    fn test_null_identifier_rejected() {
        let rows = vec![
            source_row("100", 5, "A1"),
            vec![
                SqlValue::Null(SqlNullType::Text),
                SqlValue::Decimal(Decimal::ONE),
                SqlValue::Text("B".into()),
            ],
        ];
        let err = derive_rows(row_set(rows), "DTLKEY1", "QTY1").unwrap_err();
        match err {
            SyncError::NullIdentifier { row_index, column } => {
                assert_eq!(row_index, 1);
                assert_eq!(column, "DTLKEY1");
            }
            other => panic!("expected NullIdentifier, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let rows = vec![vec![
            SqlValue::Text("   ".into()),
            SqlValue::Decimal(Decimal::ONE),
            SqlValue::Text("B".into()),
        ]];
        assert!(matches!(
            derive_rows(row_set(rows), "DTLKEY1", "QTY1").unwrap_err(),
            SyncError::NullIdentifier { row_index: 0, .. }
        ));
    }

    #[test]
    fn test_unreadable_quantity_aborts() {
        let rows = vec![vec![
            SqlValue::Text("100".into()),
            SqlValue::Text("not-a-qty".into()),
            SqlValue::Text("B".into()),
        ]];
        assert!(matches!(
            derive_rows(row_set(rows), "DTLKEY1", "QTY1").unwrap_err(),
            SyncError::Conversion { .. }
        ));
    }

    #[test]
    fn test_integer_identifier_accepted() {
        let rows = vec![vec![
            SqlValue::Int(100),
            SqlValue::Decimal(Decimal::from(5)),
            SqlValue::Text("A1".into()),
        ]];
        let derived = derive_rows(row_set(rows), "DTLKEY1", "QTY1").unwrap();
        assert_eq!(derived[0].quantity, Decimal::from(5));
    }

    #[test]
    fn test_effective_batch_size_clamps_to_param_limit() {
        // 4 columns + quantity-remain = 5 params per row
        assert_eq!(effective_batch_size(500, 5), 500);
        assert_eq!(effective_batch_size(1_000_000, 5), MAX_BIND_PARAMS / 5);
        assert_eq!(effective_batch_size(10, 0), 10);
        assert_eq!(effective_batch_size(0, 5), 1);
    }
}
