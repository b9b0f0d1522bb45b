//! Conversion between tinyorm values and SQLite storage.
//!
//! SQLite has five storage classes; [`Value`] maps onto four of them.
//! Booleans are stored as integers 0/1 and timestamps as sortable
//! `YYYY-MM-DD HH:MM:SS.ffffff` text (UTC). Blob columns are not mapped.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use tinyorm_core::{ConversionError, Row, Value};

use crate::error::{Result, StoreError};

/// Timestamp layout written by this crate. Lexicographic order is
/// chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Layout of SQLite's `CURRENT_TIMESTAMP` default.
const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts a bound parameter into an owned SQLite value.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

/// Converts one result column into a [`Value`].
pub(crate) fn from_value_ref(column: &str, value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Real(r) => Ok(Value::Real(r)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| StoreError::DatabaseError(rusqlite::Error::Utf8Error(e))),
        ValueRef::Blob(_) => Err(StoreError::ConversionError(
            ConversionError::TypeMismatch {
                attribute: column.to_string(),
                expected: "SQL scalar",
                found: "blob".to_string(),
            },
        )),
    }
}

/// Reads a full result row using the statement's column names.
pub(crate) fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> Result<Row> {
    let mut out = Row::new();
    for (i, column) in columns.iter().enumerate() {
        let value = from_value_ref(column, row.get_ref(i)?)?;
        out.push(column.clone(), value);
    }
    Ok(out)
}

/// Formats a timestamp for storage.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp, accepting both this crate's layout and
/// SQLite's `CURRENT_TIMESTAMP` layout.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, SQLITE_TIMESTAMP_FORMAT))
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            StoreError::ConversionError(ConversionError::TypeMismatch {
                attribute: "applied_at".to_string(),
                expected: "timestamp",
                found: format!("'{s}' ({e})"),
            })
        })
}
