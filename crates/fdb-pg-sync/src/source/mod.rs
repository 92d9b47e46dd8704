//! Firebird source database operations via ODBC.
//!
//! The legacy source is reached through the Firebird ODBC driver. Rows are
//! fetched with buffered text cursors and converted to typed values using
//! the declared column spec. The source is read once per run: extraction
//! fully drains the row set before reconciliation begins.

use std::sync::Arc;

use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::columns::ColumnSpec;
use crate::config::{SourceConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::value::{convert_text, SqlValue};

/// Rows fetched per ODBC round trip.
const FETCH_BATCH_ROWS: usize = 1000;

/// Upper bound on a single text cell, in bytes.
const MAX_CELL_BYTES: usize = 65536;

/// The ordered, column-named result of one extraction query.
#[derive(Debug, Clone)]
pub struct RowSet {
    /// Effective column names, in projection order.
    pub columns: Vec<String>,

    /// Row values, one `Vec<SqlValue>` per row, in column order.
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Firebird source connection.
pub struct FirebirdSource {
    env: Arc<Environment>,
    connection_string: String,
    /// Serializes ODBC operations (the driver connection is not thread-safe).
    conn_mutex: Mutex<()>,
}

impl FirebirdSource {
    /// Open the ODBC environment and probe a connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SourceUnavailable`] if the ODBC environment
    /// cannot be created, the driver is missing, or the database cannot be
    /// reached.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            SyncError::SourceUnavailable(format!(
                "failed to create ODBC environment: {}. \
                 Make sure the Firebird ODBC driver is installed.",
                e
            ))
        })?;

        let connection_string = config.connection_string();

        debug!(
            "ODBC connection string (credentials hidden): Driver={{{}}};Dbname={}/{}:{};CharSet={};...",
            config.driver, config.host, config.port, config.database, config.charset
        );

        // Probe connection - scope so conn drops before env is moved
        {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| {
                    SyncError::SourceUnavailable(format!(
                        "failed to connect to Firebird via ODBC: {}",
                        e
                    ))
                })?;
            let _ = conn.execute("SELECT 1 FROM RDB$DATABASE", ());
        }

        info!(
            "Connected to Firebird via ODBC: {}:{}:{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            env: Arc::new(env),
            connection_string,
            conn_mutex: Mutex::new(()),
        })
    }

    /// Extract the full row set declared by the sync configuration.
    pub async fn extract(&self, sync: &SyncConfig, spec: &ColumnSpec) -> Result<RowSet> {
        let _lock = self.conn_mutex.lock().await;
        let sql = build_select(sync, spec);
        self.extract_sync(&sql, spec)
    }

    fn get_connection(&self) -> Result<odbc_api::Connection<'_>> {
        self.env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| {
                SyncError::SourceUnavailable(format!("ODBC connection failed: {}", e))
            })
    }

    fn extract_sync(&self, sql: &str, spec: &ColumnSpec) -> Result<RowSet> {
        let conn = self.get_connection()?;

        debug!("extraction query: {}", sql);

        let query_err = |message: String| SyncError::Query {
            message,
            sql: sql.to_string(),
        };

        let mut rows = Vec::new();

        if let Some(mut cursor) = conn
            .execute(sql, ())
            .map_err(|e| query_err(e.to_string()))?
        {
            let num_cols = cursor
                .num_result_cols()
                .map_err(|e| query_err(format!("failed to get column count: {}", e)))?
                as usize;

            if num_cols != spec.len() {
                return Err(query_err(format!(
                    "result has {} columns but the column spec declares {}",
                    num_cols,
                    spec.len()
                )));
            }

            let mut buffers =
                TextRowSet::for_cursor(FETCH_BATCH_ROWS, &mut cursor, Some(MAX_CELL_BYTES))
                    .map_err(|e| query_err(format!("failed to create row buffer: {}", e)))?;

            let mut row_cursor = cursor
                .bind_buffer(&mut buffers)
                .map_err(|e| query_err(format!("failed to bind buffer: {}", e)))?;

            while let Some(batch) = row_cursor
                .fetch()
                .map_err(|e| query_err(format!("failed to fetch rows: {}", e)))?
            {
                for row_idx in 0..batch.num_rows() {
                    let mut row = Vec::with_capacity(num_cols);
                    for col_idx in 0..num_cols {
                        let column = spec.column(col_idx);
                        let text = batch.at(col_idx, row_idx).map(String::from_utf8_lossy);
                        let value = convert_text(
                            text.as_deref(),
                            &column.effective_name,
                            column.column_type,
                        )?;
                        row.push(value);
                    }
                    rows.push(row);
                }
            }
        }

        info!("Extracted {} rows from source", rows.len());

        Ok(RowSet {
            columns: spec.effective_names(),
            rows,
        })
    }
}

/// Build the extraction SQL: a plain projection for one table, an inner
/// join on the key column for two. Aliased columns carry their effective
/// names so collisions across the joined tables cannot occur.
pub fn build_select(sync: &SyncConfig, spec: &ColumnSpec) -> String {
    let mut select_list = Vec::with_capacity(spec.len());

    if sync.tables.len() == 1 {
        for col in spec.iter() {
            if col.effective_name == col.source_name {
                select_list.push(col.source_name.clone());
            } else {
                select_list.push(format!("{} AS {}", col.source_name, col.effective_name));
            }
        }
        format!("SELECT {} FROM {}", select_list.join(", "), sync.tables[0].name)
    } else {
        for col in spec.iter() {
            let qualifier = if col.table_index == 0 { "t1" } else { "t2" };
            if col.effective_name == col.source_name {
                select_list.push(format!("{}.{}", qualifier, col.source_name));
            } else {
                select_list.push(format!(
                    "{}.{} AS {}",
                    qualifier, col.source_name, col.effective_name
                ));
            }
        }
        let key = sync.join_key.as_deref().unwrap_or_default();
        format!(
            "SELECT {} FROM {} t1 INNER JOIN {} t2 ON t1.{} = t2.{}",
            select_list.join(", "),
            sync.tables[0].name,
            sync.tables[1].name,
            key,
            key
        )
    }
}
