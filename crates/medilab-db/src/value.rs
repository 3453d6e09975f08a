//! # Column Values
//!
//! [`Value`] is the dynamically typed column value the repository moves
//! between entities and the store. Statements are rendered per entity type
//! at runtime, so parameters are bound through this enum rather than
//! through compile-time checked macros.
//!
//! Conventions follow the rest of the stack: UUIDs are stored as canonical
//! lowercase hyphenated TEXT, timestamps as RFC 3339 TEXT, booleans as
//! INTEGER 0/1.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow, SqliteValueRef};
use sqlx::{Decode, Row, Sqlite, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// A single SQLite column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

// =============================================================================
// Bind helpers
// =============================================================================

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;
pub(crate) type SqliteQueryAs<'q, T> = sqlx::query::QueryAs<'q, Sqlite, T, SqliteArguments<'q>>;
pub(crate) type SqliteQueryScalar<'q, O> =
    sqlx::query::QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>;

/// Binds a [`Value`] as the next parameter of a statement.
pub(crate) fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Blob(v) => query.bind(v.clone()),
    }
}

/// Binds a [`Value`] as the next parameter of a row-mapped statement.
pub(crate) fn bind_as<'q, T>(query: SqliteQueryAs<'q, T>, value: &Value) -> SqliteQueryAs<'q, T> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Blob(v) => query.bind(v.clone()),
    }
}

/// Binds a [`Value`] as the next parameter of a scalar statement.
pub(crate) fn bind_scalar<'q, O>(
    query: SqliteQueryScalar<'q, O>,
    value: &Value,
) -> SqliteQueryScalar<'q, O> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Blob(v) => query.bind(v.clone()),
    }
}

/// Reads one column of a fetched row as a [`Value`], using the value's own
/// storage class to pick the decoded type.
pub(crate) fn column_value(row: &SqliteRow, column: &str) -> DbResult<Value> {
    let raw = row.try_get_raw(column).map_err(DbError::from)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let storage_class = raw.type_info().name().to_string();
    let value = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(decode_column(raw, column)?),
        "REAL" => Value::Real(decode_column(raw, column)?),
        "BLOB" => Value::Blob(decode_column(raw, column)?),
        _ => Value::Text(decode_column(raw, column)?),
    };
    Ok(value)
}

fn decode_column<'r, V>(raw: SqliteValueRef<'r>, column: &str) -> DbResult<V>
where
    V: Decode<'r, Sqlite>,
{
    V::decode(raw).map_err(|e| DbError::Internal(format!("failed to decode column {column}: {e}")))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_become_integers() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert_eq!(Value::from(false), Value::Int(0));
    }

    #[test]
    fn uuids_become_canonical_text() {
        let id = Uuid::new_v4();
        assert_eq!(Value::from(id), Value::Text(id.to_string()));
    }

    #[test]
    fn timestamps_become_rfc3339_text() {
        use chrono::TimeZone;

        let at = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(
            Value::from(at),
            Value::Text("2026-03-10T09:00:00+00:00".to_string())
        );
    }

    #[test]
    fn options_flatten_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("code")), Value::Text("code".to_string()));
    }
}
