//! Configuration validation.
//!
//! Table and column identifiers flow into SQL text, so everything that is
//! not a bound value is checked once here, before any connection is opened.

use super::Config;
use crate::columns::{is_safe_identifier, ColumnSpec};
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(SyncError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(SyncError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(SyncError::Config("source.user is required".into()));
    }
    if config.source.r#type != "firebird" {
        return Err(SyncError::Config(format!(
            "source.type must be 'firebird', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(SyncError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.max_connections == 0 {
        return Err(SyncError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Sync validation
    let sync = &config.sync;

    match sync.tables.len() {
        1 => {
            if sync.join_key.is_some() {
                return Err(SyncError::Config(
                    "sync.join_key is only valid with two source tables".into(),
                ));
            }
        }
        2 => {
            let key = sync.join_key.as_deref().unwrap_or("");
            if key.is_empty() {
                return Err(SyncError::Config(
                    "sync.join_key is required with two source tables".into(),
                ));
            }
            if !is_safe_identifier(key) {
                return Err(SyncError::Config(format!(
                    "sync.join_key '{}' is not a valid identifier",
                    key
                )));
            }
        }
        n => {
            return Err(SyncError::Config(format!(
                "sync.tables must declare one or two source tables, got {}",
                n
            )));
        }
    }

    for table in &sync.tables {
        if !is_safe_identifier(&table.name) {
            return Err(SyncError::Config(format!(
                "source table name '{}' is not a valid identifier",
                table.name
            )));
        }
        if table.columns.is_empty() {
            return Err(SyncError::Config(format!(
                "source table '{}' declares no columns",
                table.name
            )));
        }
        for col in &table.columns {
            if !is_safe_identifier(&col.name) {
                return Err(SyncError::Config(format!(
                    "column name '{}' in table '{}' is not a valid identifier",
                    col.name, table.name
                )));
            }
        }
        if let Some(suffix) = &table.alias_suffix {
            if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(SyncError::Config(format!(
                    "alias_suffix '{}' for table '{}' is not a valid identifier suffix",
                    suffix, table.name
                )));
            }
        }
    }

    if !is_safe_identifier(&sync.table) {
        return Err(SyncError::Config(format!(
            "destination table name '{}' is not a valid identifier",
            sync.table
        )));
    }
    if sync.batch_size == 0 {
        return Err(SyncError::Config("sync.batch_size must be at least 1".into()));
    }

    // Resolving the column spec surfaces duplicate effective names
    let spec = ColumnSpec::from_tables(&sync.tables)?;

    if spec.index_of(&sync.identifier_column).is_none() {
        return Err(SyncError::Config(format!(
            "sync.identifier_column '{}' is not a projected column",
            sync.identifier_column
        )));
    }

    let quantity_idx = spec.index_of(&sync.quantity_column).ok_or_else(|| {
        SyncError::Config(format!(
            "sync.quantity_column '{}' is not a projected column",
            sync.quantity_column
        ))
    })?;
    if !spec.column(quantity_idx).column_type.is_numeric() {
        return Err(SyncError::Config(format!(
            "sync.quantity_column '{}' must have a numeric declared type",
            sync.quantity_column
        )));
    }

    if !is_safe_identifier(&sync.quantity_remain_column) {
        return Err(SyncError::Config(format!(
            "sync.quantity_remain_column '{}' is not a valid identifier",
            sync.quantity_remain_column
        )));
    }
    if spec.index_of(&sync.quantity_remain_column).is_some() {
        return Err(SyncError::Config(format!(
            "sync.quantity_remain_column '{}' collides with a projected column; \
             it must exist only in the destination",
            sync.quantity_remain_column
        )));
    }

    Ok(())
}
