//! # fdb-pg-sync
//!
//! Firebird to PostgreSQL row reconciliation library.
//!
//! Extracts a column-ordered row set from a legacy Firebird database
//! (optionally an inner join of two tables on a shared key) and reconciles
//! it against a PostgreSQL table:
//!
//! - **Set-based upserts**: new identifiers insert, known identifiers update
//! - **Quantity-remain preservation**: the destination-only remaining
//!   quantity is seeded on insert and never overwritten once set
//! - **Typed column specs** validated against the destination schema before
//!   any write
//! - **Fully parameterized statements**: row data never appears in SQL text
//!
//! ## Example
//!
//! ```rust,no_run
//! use fdb_pg_sync::{Config, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fdb_pg_sync::SyncError> {
//!     let config = Config::load("config.yaml")?;
//!     let reconciler = Reconciler::new(config).await?;
//!     let report = reconciler.run().await?;
//!     println!("Applied {} rows", report.rows_applied);
//!     Ok(())
//! }
//! ```

pub mod columns;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod source;
pub mod target;
pub mod value;

// Re-exports for convenient access
pub use columns::{ColumnDef, ColumnSpec, ColumnType, TableSpec};
pub use config::{Config, SourceConfig, SyncConfig, TargetConfig};
pub use error::{Result, SyncError};
pub use reconcile::{health_check, HealthReport, Reconciler, SyncReport};
pub use source::{FirebirdSource, RowSet};
pub use target::{PgStore, ReconcileStore, ReconciledRow, UpsertPlan};
pub use value::{SqlNullType, SqlValue};
