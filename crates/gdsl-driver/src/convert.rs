//! Mapping between gdsl values and SQLite storage classes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use gdsl_error::BackendError;
use gdsl_types::Value;
use rusqlite::types::Value as SqlValue;
use rusqlite::ErrorCode;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Bind a value in its closest SQLite storage class.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
        Value::Time(t) => SqlValue::Text(t.format(TIME_FORMAT).to_string()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Read a cell, using the declared column type to restore booleans and
/// temporal values SQLite stores as integers or text.
pub(crate) fn from_sql(raw: SqlValue, declared: Option<&str>) -> Value {
    let affinity = declared.map(str::to_ascii_uppercase).unwrap_or_default();
    match raw {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) if affinity.starts_with("BOOL") => Value::Boolean(i != 0),
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => temporal(&s, &affinity).unwrap_or(Value::Text(s)),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

fn temporal(text: &str, affinity: &str) -> Option<Value> {
    if affinity.starts_with("TIMESTAMP") || affinity.starts_with("DATETIME") {
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .map(Value::Timestamp)
    } else if affinity == "DATE" {
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .ok()
            .map(Value::Date)
    } else if affinity.starts_with("TIME") {
        NaiveTime::parse_from_str(text, TIME_FORMAT)
            .ok()
            .map(Value::Time)
    } else {
        None
    }
}

/// Classify a rusqlite failure.
pub(crate) fn backend_error(err: &rusqlite::Error) -> BackendError {
    let message = err.to_string();
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            let base = match failure.code {
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::SystemIoFailure
                | ErrorCode::FileLockingProtocolFailed
                | ErrorCode::OutOfMemory => BackendError::connectivity(message),
                _ => BackendError::statement(message),
            };
            base.with_code(failure.extended_code)
        }
        rusqlite::Error::SqlInputError { error, .. } => {
            BackendError::statement(message).with_code(error.extended_code)
        }
        rusqlite::Error::InvalidPath(_) => BackendError::connectivity(message),
        _ => BackendError::statement(message),
    }
}
