//! Typed column descriptors for the source-to-destination projection.
//!
//! The projection has no fixed schema; the caller declares an ordered list
//! of columns per source table, each with a declared type. The concatenated
//! order is significant: extraction SQL, row values, and upsert SQL all use
//! the same order.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Declared type of a source column, in Firebird terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Decimal => "decimal",
            ColumnType::Varchar => "varchar",
            ColumnType::Blob => "blob",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// True for types the quantity column may carry.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt
                | ColumnType::Integer
                | ColumnType::BigInt
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::Decimal
        )
    }
}

/// A single declared source column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as it exists in the source table.
    pub name: String,

    /// Declared type, used for cell coercion.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// One source table with its ordered column list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source table name.
    pub name: String,

    /// Ordered columns to project from this table.
    pub columns: Vec<ColumnDef>,

    /// Suffix appended to every projected column name from this table,
    /// used to avoid name collisions across joined tables
    /// (e.g. `DTLKEY` -> `DTLKEY1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_suffix: Option<String>,
}

/// One column of the resolved projection.
#[derive(Debug, Clone)]
pub struct SpecColumn {
    /// Index of the source table this column comes from.
    pub table_index: usize,

    /// Column name in the source table.
    pub source_name: String,

    /// Name the column carries after extraction — the alias if the table
    /// declares a suffix, the source name otherwise. This is the name the
    /// destination column must match exactly.
    pub effective_name: String,

    pub column_type: ColumnType,
}

/// The resolved, ordered projection across all source tables.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    columns: Vec<SpecColumn>,
}

impl ColumnSpec {
    /// Resolve the per-table column lists into one ordered spec.
    /// Fails if two columns end up with the same effective name.
    pub fn from_tables(tables: &[TableSpec]) -> Result<Self> {
        let mut columns = Vec::new();

        for (table_index, table) in tables.iter().enumerate() {
            for def in &table.columns {
                let effective_name = match &table.alias_suffix {
                    Some(suffix) => format!("{}{}", def.name, suffix),
                    None => def.name.clone(),
                };
                columns.push(SpecColumn {
                    table_index,
                    source_name: def.name.clone(),
                    effective_name,
                    column_type: def.column_type,
                });
            }
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|c| c.effective_name.eq_ignore_ascii_case(&col.effective_name))
            {
                return Err(SyncError::Config(format!(
                    "duplicate projected column name '{}' - use alias_suffix to disambiguate",
                    col.effective_name
                )));
            }
        }

        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpecColumn> {
        self.columns.iter()
    }

    /// Effective column names, in projection order.
    pub fn effective_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.effective_name.clone()).collect()
    }

    /// Position of a column by effective name (case-insensitive, matching
    /// how the destination resolves unquoted identifiers).
    pub fn index_of(&self, effective_name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.effective_name.eq_ignore_ascii_case(effective_name))
    }

    pub fn column(&self, index: usize) -> &SpecColumn {
        &self.columns[index]
    }
}

/// Identifier charset check applied once at config validation. Table and
/// column names flow into SQL text, so anything outside the conservative
/// charset is rejected up front instead of escaped per statement.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
