//! Error types for the reconciliation library.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source (Firebird) connection could not be established
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Destination (PostgreSQL) connection could not be established
    #[error("Destination unavailable: {0}")]
    TargetUnavailable(String),

    /// Source rejected the extraction query (bad table/column reference)
    #[error("Source query rejected: {message}\n  SQL: {sql}")]
    Query { message: String, sql: String },

    /// A cell could not be coerced to its declared column type
    #[error("Conversion failed for column {column}: cannot read {value:?} as {expected}")]
    Conversion {
        column: String,
        value: String,
        expected: String,
    },

    /// A row carries a null or empty identifier value
    #[error("Row {row_index} has a null or empty value in identifier column {column}")]
    NullIdentifier { row_index: usize, column: String },

    /// Destination schema does not match the declared column spec
    #[error("Destination schema mismatch: {0}")]
    Schema(String),

    /// Destination statement execution failed
    #[error("Write failed for table {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Destination database error outside the write path
    #[error("Destination database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Write error for a destination table
    pub fn write(table: impl Into<String>, source: tokio_postgres::Error) -> Self {
        SyncError::Write {
            table: table.into(),
            source,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Io(_) | SyncError::Yaml(_) | SyncError::Json(_) => 2,
            SyncError::SourceUnavailable(_) => 3,
            SyncError::TargetUnavailable(_) | SyncError::Pool { .. } => 4,
            SyncError::Query { .. } => 5,
            SyncError::Schema(_) => 6,
            SyncError::Conversion { .. } | SyncError::NullIdentifier { .. } => 7,
            SyncError::Write { .. } | SyncError::Target(_) => 8,
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
