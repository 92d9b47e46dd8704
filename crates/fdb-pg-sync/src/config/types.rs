//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::columns::TableSpec;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Firebird).
    pub source: SourceConfig,

    /// Destination database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Reconciliation behavior configuration.
    pub sync: SyncConfig,
}

/// Source database (Firebird via ODBC) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "firebird" for now).
    #[serde(default = "default_firebird")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3050).
    #[serde(default = "default_firebird_port")]
    pub port: u16,

    /// Path to the database file, e.g. `/data/ACC-0004.FDB`.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Connection charset (default: "UTF8").
    #[serde(default = "default_utf8")]
    pub charset: String,

    /// ODBC driver name (default: "Firebird/InterBase(r) driver").
    #[serde(default = "default_fb_driver")]
    pub driver: String,
}

/// Destination database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub max_connections: usize,
}

/// Reconciliation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source tables to project, in projection order. One table is a plain
    /// projection; two tables are inner-joined on `join_key`.
    pub tables: Vec<TableSpec>,

    /// Equality join column present in both source tables. Required when
    /// two tables are declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_key: Option<String>,

    /// Destination table name.
    pub table: String,

    /// Effective name of the column that uniquely keys a record between
    /// source and destination.
    pub identifier_column: String,

    /// Effective name of the numeric quantity column.
    pub quantity_column: String,

    /// Destination-only column seeded from the quantity on first insert
    /// and preserved afterwards unless currently NULL.
    #[serde(default = "default_qty_remain")]
    pub quantity_remain_column: String,

    /// Rows per upsert statement (default: 500). Clamped at run time so the
    /// bound parameter count stays under the PostgreSQL limit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

// Default value functions for serde

fn default_firebird() -> String {
    "firebird".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_firebird_port() -> u16 {
    3050
}

fn default_pg_port() -> u16 {
    5432
}

fn default_utf8() -> String {
    "UTF8".to_string()
}

fn default_fb_driver() -> String {
    "Firebird/InterBase(r) driver".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_qty_remain() -> String {
    "qtyremain".to_string()
}

fn default_batch_size() -> usize {
    500
}
