use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use gdsl_error::{GdslError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// A dynamically typed cell or parameter value.
///
/// Values keep the native type they were supplied with; binding a `Date` sends
/// a date to the driver, never its string rendering.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Float(f64),
    /// A UTF-8 text string.
    Text(String),
    /// A binary large object.
    Blob(Vec<u8>),
    /// A calendar date.
    Date(NaiveDate),
    /// A time of day.
    Time(NaiveTime),
    /// A date and time without zone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the value's type, used in mismatch diagnostics.
    pub const fn typeof_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Try to extract an integer value.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to extract a float value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract a text reference.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract a blob reference.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Render the value without SQL quoting, as a report cell would show it.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Blob(b) => hex(b),
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::Time(t) => t.to_string(),
            Self::Timestamp(ts) => ts.to_string(),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Blob(b) => write!(f, "X'{}'", hex(b)),
            Self::Date(d) => write!(f, "DATE '{}'", d.format(DATE_FORMAT)),
            Self::Time(t) => write!(f, "TIME '{t}'"),
            Self::Timestamp(ts) => write!(f, "TIMESTAMP '{ts}'"),
        }
    }
}

// --- Conversions into Value ---

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// --- Conversions out of Value ---

/// Extract a Rust value from a [`Value`].
pub trait FromValue: Sized {
    /// Try to convert a `Value` reference into `Self`.
    fn from_value(val: &Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, actual: &Value) -> Result<T> {
    Err(GdslError::type_mismatch(expected, actual.typeof_str()))
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Integer(n) => Ok(*n),
            Value::Boolean(b) => Ok(i64::from(*b)),
            other => mismatch("integer", other),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(val: &Value) -> Result<Self> {
                    let n = i64::from_value(val)?;
                    <$ty>::try_from(n).map_err(|_| {
                        GdslError::type_mismatch(stringify!($ty), format!("integer({n})"))
                    })
                }
            }
        )+
    };
}

narrow_integer!(i32, u32, u64, usize);

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Float(f) => Ok(*f),
            Value::Integer(n) => Ok(*n as f64),
            other => mismatch("real", other),
        }
    }
}

impl FromValue for bool {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Boolean(b) => Ok(*b),
            Value::Integer(n) => Ok(*n != 0),
            other => mismatch("boolean", other),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Text(s) => Ok(s.clone()),
            Value::Null | Value::Blob(_) => mismatch("text", val),
            other => Ok(other.to_plain_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => mismatch("blob", other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Date(d) => Ok(*d),
            Value::Timestamp(ts) => Ok(ts.date()),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .or_else(|_| parse_timestamp(s).map(|ts| ts.date()))
                .map_err(|_| GdslError::type_mismatch("date", format!("text({s})"))),
            other => mismatch("date", other),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Time(t) => Ok(*t),
            Value::Timestamp(ts) => Ok(ts.time()),
            Value::Text(s) => TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
                .ok_or_else(|| GdslError::type_mismatch("time", format!("text({s})"))),
            other => mismatch("time", other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Date(d) => Ok(d.and_time(NaiveTime::default())),
            Value::Text(s) => parse_timestamp(s)
                .map_err(|()| GdslError::type_mismatch("timestamp", format!("text({s})"))),
            other => mismatch("timestamp", other),
        }
    }
}

fn parse_timestamp(text: &str) -> std::result::Result<NaiveDateTime, ()> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text.trim(), fmt).ok())
        .ok_or(())
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(val: &Value) -> Result<Self> {
        if val.is_null() {
            Ok(None)
        } else {
            T::from_value(val).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_from_integer() {
        assert_eq!(i64::from_value(&Value::Integer(42)).unwrap(), 42);
    }

    #[test]
    fn i32_overflow() {
        assert!(i32::from_value(&Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn u64_negative_fails() {
        assert!(u64::from_value(&Value::Integer(-1)).is_err());
    }

    #[test]
    fn f64_from_integer_coercion() {
        let v = f64::from_value(&Value::Integer(42)).unwrap();
        assert!((v - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bool_from_integer() {
        assert!(bool::from_value(&Value::Integer(1)).unwrap());
        assert!(!bool::from_value(&Value::Integer(0)).unwrap());
    }

    #[test]
    fn string_from_number_renders_plainly() {
        assert_eq!(String::from_value(&Value::Integer(7)).unwrap(), "7");
        assert!(String::from_value(&Value::Null).is_err());
    }

    #[test]
    fn date_from_iso_text() {
        let d = NaiveDate::from_value(&Value::Text("2024-02-29".into())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn date_from_timestamp_text() {
        let d = NaiveDate::from_value(&Value::Text("2024-02-29 10:11:12".into())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn timestamp_from_text() {
        let ts = NaiveDateTime::from_value(&Value::Text("2023-01-02T03:04:05".into())).unwrap();
        assert_eq!(ts.to_string(), "2023-01-02 03:04:05");
    }

    #[test]
    fn time_from_bad_text_fails() {
        let err = NaiveTime::from_value(&Value::Text("noon".into())).unwrap_err();
        assert!(matches!(err, GdslError::TypeMismatch { .. }));
    }

    #[test]
    fn option_none_from_null() {
        let result = Option::<i64>::from_value(&Value::Null).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn option_conversion_into_value() {
        assert_eq!(Value::from(Some(3_i32)), Value::Integer(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Blob(vec![0xAB, 0x01]).to_string(), "X'AB01'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn plain_string_is_unquoted() {
        assert_eq!(Value::from("abc").to_plain_string(), "abc");
        assert_eq!(Value::Boolean(true).to_plain_string(), "true");
    }
}
