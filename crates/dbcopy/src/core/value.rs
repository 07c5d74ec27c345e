//! Database-agnostic value type.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single field value as read from or written to any dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,

    Bool(bool),

    /// Every integer width is widened to 64 bits.
    Int(i64),

    Float(f64),

    /// Exact numeric (DECIMAL/NUMERIC/NUMBER).
    Decimal(Decimal),

    Text(String),

    Bytes(Vec<u8>),

    Uuid(Uuid),

    Date(NaiveDate),

    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
}

impl Value {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text rendering used when a batch is coerced to text.
    ///
    /// NULL stays `None`; so does a floating NaN, which has no text form a
    /// database would accept.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) if v.is_nan() => None,
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => {
                let mut hex = String::with_capacity(b.len() * 2);
                for byte in b {
                    let _ = write!(hex, "{:02x}", byte);
                }
                Some(hex)
            }
            Value::Uuid(u) => Some(u.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(format_time(t)),
            Value::DateTime(dt) => Some(format_datetime(dt)),
            Value::DateTimeOffset(dt) => {
                Some(format!("{}{}", format_datetime(&dt.naive_local()), dt.format("%:z")))
            }
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS`, with microseconds only when present.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    format!("{} {}", dt.format("%Y-%m-%d"), format_time(&dt.time()))
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parse a timestamp in the forms [`format_datetime`] and ISO 8601
/// produce. A bare date reads as midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn format_time(t: &NaiveTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%H:%M:%S").to_string()
    } else {
        t.format("%H:%M:%S%.6f").to_string()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text_renders_temporal_values() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(Value::DateTime(dt).to_text().unwrap(), "2024-03-01 08:30:00");

        let with_micros = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(8, 30, 0, 250)
            .unwrap();
        assert_eq!(
            Value::DateTime(with_micros).to_text().unwrap(),
            "2024-03-01 08:30:00.000250"
        );
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
                .to_text()
                .unwrap(),
            "2024-03-01"
        );
    }

    #[test]
    fn test_to_text_null_and_nan() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Float(f64::NAN).to_text(), None);
        assert_eq!(Value::Float(2.5).to_text().unwrap(), "2.5");
        assert_eq!(Value::Bool(true).to_text().unwrap(), "1");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_text().unwrap(), "dead");
    }

    #[test]
    fn test_from_implementations() {
        assert_eq!(Value::from(7), Value::Int(7));
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
