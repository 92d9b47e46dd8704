//! SQL value types for dynamic, schema-less row handling.
//!
//! Rows come out of the Firebird ODBC driver as text buffers; each cell is
//! coerced into a [`SqlValue`] according to the column type declared in the
//! sync configuration. Values bind into PostgreSQL statements as parameters
//! via the [`ToSql`] impl — row data is never interpolated into query text.

use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::columns::ColumnType;
use crate::error::{Result, SyncError};

/// Type hint for NULL values to ensure correct PostgreSQL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// True for the NULL variant regardless of type hint.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Coerce to a decimal quantity. Used for the quantity column, where a
    /// value that cannot be read as a number aborts the run.
    pub fn to_decimal(&self, column: &str) -> Result<Decimal> {
        let err = |value: String| SyncError::Conversion {
            column: column.to_string(),
            value,
            expected: "decimal".to_string(),
        };

        match self {
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::SmallInt(v) => Ok(Decimal::from(*v)),
            SqlValue::Int(v) => Ok(Decimal::from(*v)),
            SqlValue::BigInt(v) => Ok(Decimal::from(*v)),
            SqlValue::Float(v) => Decimal::try_from(*v).map_err(|_| err(v.to_string())),
            SqlValue::Double(v) => Decimal::try_from(*v).map_err(|_| err(v.to_string())),
            SqlValue::Text(s) => Decimal::from_str_exact(s.trim())
                .or_else(|_| s.trim().parse::<Decimal>())
                .map_err(|_| err(s.clone())),
            SqlValue::Null(_) => Err(err("NULL".to_string())),
            other => Err(err(format!("{:?}", other))),
        }
    }
}

/// The NULL hint matching a declared column type.
fn null_for(column_type: ColumnType) -> SqlNullType {
    match column_type {
        ColumnType::SmallInt => SqlNullType::I16,
        ColumnType::Integer => SqlNullType::I32,
        ColumnType::BigInt => SqlNullType::I64,
        ColumnType::Float => SqlNullType::F32,
        ColumnType::Double => SqlNullType::F64,
        ColumnType::Decimal => SqlNullType::Decimal,
        ColumnType::Varchar => SqlNullType::Text,
        ColumnType::Blob => SqlNullType::Bytes,
        ColumnType::Date => SqlNullType::Date,
        ColumnType::Time => SqlNullType::Time,
        ColumnType::Timestamp => SqlNullType::Timestamp,
    }
}

/// Convert a text cell from the ODBC driver to a [`SqlValue`] per the
/// declared column type. A non-null cell that does not parse is a fatal
/// [`SyncError::Conversion`].
pub fn convert_text(text: Option<&str>, column: &str, column_type: ColumnType) -> Result<SqlValue> {
    let Some(s) = text else {
        return Ok(SqlValue::Null(null_for(column_type)));
    };

    let err = || SyncError::Conversion {
        column: column.to_string(),
        value: s.to_string(),
        expected: column_type.as_str().to_string(),
    };

    match column_type {
        ColumnType::SmallInt => s.trim().parse::<i16>().map(SqlValue::SmallInt).map_err(|_| err()),
        ColumnType::Integer => s.trim().parse::<i32>().map(SqlValue::Int).map_err(|_| err()),
        ColumnType::BigInt => s.trim().parse::<i64>().map(SqlValue::BigInt).map_err(|_| err()),
        ColumnType::Float => s.trim().parse::<f32>().map(SqlValue::Float).map_err(|_| err()),
        ColumnType::Double => s.trim().parse::<f64>().map(SqlValue::Double).map_err(|_| err()),
        ColumnType::Decimal => Decimal::from_str_exact(s.trim())
            .or_else(|_| s.trim().parse::<Decimal>())
            .map(SqlValue::Decimal)
            .map_err(|_| err()),
        ColumnType::Varchar => Ok(SqlValue::Text(s.to_string())),
        ColumnType::Blob => Ok(SqlValue::Bytes(s.as_bytes().to_vec())),
        // Firebird ODBC returns temporals in ISO form, with or without
        // fractional seconds
        ColumnType::Date => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| err()),
        ColumnType::Time => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
            .map(SqlValue::Time)
            .map_err(|_| err()),
        ColumnType::Timestamp => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S"))
            .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f"))
            .map(SqlValue::Timestamp)
            .map_err(|_| err()),
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::SmallInt(v) => v.to_sql(ty, out),
            SqlValue::Int(v) => v.to_sql(ty, out),
            SqlValue::BigInt(v) => v.to_sql(ty, out),
            SqlValue::Float(v) => v.to_sql(ty, out),
            SqlValue::Double(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The destination column decides the wire type; each inner value
        // checks itself in to_sql
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_convert_null_carries_type_hint() {
        assert_eq!(
            convert_text(None, "QTY", ColumnType::Decimal).unwrap(),
            SqlValue::Null(SqlNullType::Decimal)
        );
        assert_eq!(
            convert_text(None, "ITEMCODE", ColumnType::Varchar).unwrap(),
            SqlValue::Null(SqlNullType::Text)
        );
        assert_eq!(
            convert_text(None, "DOCDATE", ColumnType::Date).unwrap(),
            SqlValue::Null(SqlNullType::Date)
        );
    }

    #[test]
    fn test_convert_integer_values() {
        assert_eq!(
            convert_text(Some("42"), "DTLKEY", ColumnType::Integer).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(
            convert_text(Some("-7"), "N", ColumnType::SmallInt).unwrap(),
            SqlValue::SmallInt(-7)
        );
        assert_eq!(
            convert_text(Some("9223372036854775807"), "K", ColumnType::BigInt).unwrap(),
            SqlValue::BigInt(i64::MAX)
        );
        // ODBC text buffers can carry padding
        assert_eq!(
            convert_text(Some(" 100 "), "DTLKEY", ColumnType::Integer).unwrap(),
            SqlValue::Int(100)
        );
    }

    #[test]
    fn test_convert_decimal_values() {
        let v = convert_text(Some("123.456"), "QTY", ColumnType::Decimal).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::from_str_exact("123.456").unwrap()));
    }

    #[test]
    fn test_convert_text_values() {
        assert_eq!(
            convert_text(Some("PART-A1"), "ITEMCODE", ColumnType::Varchar).unwrap(),
            SqlValue::Text("PART-A1".to_string())
        );
    }

    #[test]
    fn test_convert_date_values() {
        match convert_text(Some("2023-12-25"), "DOCDATE", ColumnType::Date).unwrap() {
            SqlValue::Date(d) => {
                assert_eq!(d.year(), 2023);
                assert_eq!(d.month(), 12);
                assert_eq!(d.day(), 25);
            }
            other => panic!("expected Date, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_timestamp_values() {
        match convert_text(Some("2023-12-25 10:30:45.500"), "CREATED", ColumnType::Timestamp)
            .unwrap()
        {
            SqlValue::Timestamp(ts) => {
                assert_eq!(ts.hour(), 10);
                assert_eq!(ts.minute(), 30);
            }
            other => panic!("expected Timestamp, got {:?}", other),
        }
        // ISO separator variant
        assert!(
            convert_text(Some("2023-12-25T10:30:45"), "CREATED", ColumnType::Timestamp).is_ok()
        );
    }

    #[test]
    fn test_convert_failure_is_fatal() {
        let err = convert_text(Some("not-a-number"), "QTY", ColumnType::Decimal).unwrap_err();
        match err {
            SyncError::Conversion { column, value, expected } => {
                assert_eq!(column, "QTY");
                assert_eq!(value, "not-a-number");
                assert_eq!(expected, "decimal");
            }
            other => panic!("expected Conversion, got {:?}", other),
        }

        assert!(convert_text(Some("2023-13-99"), "DOCDATE", ColumnType::Date).is_err());
        assert!(convert_text(Some("abc"), "DTLKEY", ColumnType::Integer).is_err());
    }

    #[test]
    fn test_to_decimal_coercions() {
        assert_eq!(
            SqlValue::Int(5).to_decimal("QTY").unwrap(),
            Decimal::from(5)
        );
        assert_eq!(
            SqlValue::Text("3.25".into()).to_decimal("QTY").unwrap(),
            Decimal::from_str_exact("3.25").unwrap()
        );
        assert!(SqlValue::Null(SqlNullType::Decimal).to_decimal("QTY").is_err());
        assert!(SqlValue::Text("garbage".into()).to_decimal("QTY").is_err());
    }
}
