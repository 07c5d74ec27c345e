//! Per-chunk value normalization between extract and load.
//!
//! Every value is rendered as text and transliterated to ASCII. Null
//! sentinels become real nulls. Destinations that bind native types get
//! integer, float, decimal and temporal columns parsed back from text.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use tracing::error;

use crate::core::value::parse_datetime;
use crate::core::{Dialect, RecordBatch, Value};
use crate::dialect::TypeFamily;
use crate::error::{CopyError, Result};

/// Interval renderings of TIME values carry a day count (`0 days 08:30:00`).
static TIME_DAY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+ days? ").expect("valid time prefix regex"));

const NULL_SENTINELS: [&str; 2] = ["nan", "NaT"];

/// Destination family of each column of a chunk.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    families: Vec<Option<TypeFamily>>,
    native: bool,
}

impl ChunkPlan {
    /// Plan for `columns` loading into `target`, given the column → DDL
    /// type map the destination was (or would be) created with.
    pub fn new(columns: &[String], type_map: &[(String, String)], target: &dyn Dialect) -> Self {
        let lookup: HashMap<String, &str> = type_map
            .iter()
            .map(|(name, ty)| (name.to_uppercase(), ty.as_str()))
            .collect();
        let families = columns
            .iter()
            .map(|c| lookup.get(&c.to_uppercase()).map(|ddl| ddl_family(target, ddl)))
            .collect();
        Self {
            families,
            native: target.requires_native_types(),
        }
    }

    /// Normalize a chunk in place.
    pub fn apply(&self, batch: &mut RecordBatch) -> Result<()> {
        let columns = batch.shared_columns();
        batch.map_values(|idx, value| {
            let family = self.families.get(idx).copied().flatten();
            let Some(text) = normalized_text(value, family) else {
                return Ok(Value::Null);
            };
            match family {
                Some(family) if self.native => parse_native(text, family).map_err(|msg| {
                    let column = columns.get(idx).map(String::as_str).unwrap_or("?");
                    error!("Cannot convert column {}: {}", column, msg);
                    CopyError::conversion(column, msg)
                }),
                _ => Ok(Value::Text(text)),
            }
        })
    }
}

/// Family of a DDL type string, qualifier or not.
fn ddl_family(target: &dyn Dialect, ddl: &str) -> TypeFamily {
    match target.family_of(ddl) {
        TypeFamily::Other => target.family_of(ddl.split('(').next().unwrap_or(ddl).trim()),
        family => family,
    }
}

/// Text form after transliteration; `None` for nulls and null sentinels.
fn normalized_text(value: Value, family: Option<TypeFamily>) -> Option<String> {
    let text = deunicode::deunicode(&value.to_text()?);
    if NULL_SENTINELS.contains(&text.as_str()) {
        return None;
    }
    if family == Some(TypeFamily::Time) {
        return Some(TIME_DAY_PREFIX.replace(&text, "").into_owned());
    }
    Some(text)
}

fn parse_native(text: String, family: TypeFamily) -> std::result::Result<Value, String> {
    let trimmed = text.trim();
    let parsed = match family {
        f if f.is_integer() => parse_integer(trimmed).map(Value::Int),
        TypeFamily::Real | TypeFamily::Double => trimmed.parse::<f64>().ok().map(Value::Float),
        TypeFamily::Decimal => Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
            .map(Value::Decimal),
        TypeFamily::Boolean => match trimmed.to_lowercase().as_str() {
            "1" | "true" | "t" | "y" => Some(Value::Bool(true)),
            "0" | "false" | "f" | "n" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeFamily::Date => parse_datetime(trimmed)
            .map(|dt| dt.date())
            .or_else(|| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok())
            .map(Value::Date),
        TypeFamily::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .ok()
            .map(Value::Time),
        TypeFamily::Timestamp => parse_datetime(trimmed).map(Value::DateTime),
        TypeFamily::TimestampTz => DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z")
            .ok()
            .map(Value::DateTimeOffset)
            .or_else(|| parse_datetime(trimmed).map(Value::DateTime)),
        TypeFamily::Uuid => trimmed.parse().ok().map(Value::Uuid),
        TypeFamily::Binary | TypeFamily::Blob => decode_hex(trimmed).map(Value::Bytes),
        _ => return Ok(Value::Text(text)),
    };
    parsed.ok_or_else(|| format!("'{}' is not a valid {:?}", trimmed, family))
}

/// Integers may arrive as `12` or `12.0`.
fn parse_integer(text: &str) -> Option<i64> {
    text.parse::<i64>().ok().or_else(|| {
        let f = text.parse::<f64>().ok()?;
        (f.fract() == 0.0 && f.abs() < 9.2e18).then_some(f as i64)
    })
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{MssqlDialect, PostgresDialect};
    use crate::testing::batch;

    fn type_map() -> Vec<(String, String)> {
        vec![
            ("ID".into(), "BIGINT".into()),
            ("NAME".into(), "VARCHAR(40)".into()),
            ("PRICE".into(), "DECIMAL(10, 2)".into()),
            ("RATIO".into(), "FLOAT".into()),
            ("SHIFT".into(), "TIME".into()),
            ("CREATED".into(), "DATETIME2(6)".into()),
        ]
    }

    fn chunk() -> RecordBatch {
        batch(
            &["ID", "NAME", "PRICE", "RATIO", "SHIFT", "CREATED"],
            vec![
                vec![
                    Value::Decimal(Decimal::new(7, 0)),
                    Value::from("Peña Müller"),
                    Value::Decimal(Decimal::new(1250, 2)),
                    Value::Float(f64::NAN),
                    Value::from("0 days 08:30:00"),
                    Value::from("2024-03-01 10:15:00"),
                ],
                vec![
                    Value::Null,
                    Value::from("nan"),
                    Value::from("NaT"),
                    Value::Float(0.5),
                    Value::Null,
                    Value::from("NaT"),
                ],
            ],
        )
    }

    #[test]
    fn test_text_destination_gets_clean_text() {
        let mut b = chunk();
        ChunkPlan::new(b.columns(), &type_map(), &PostgresDialect).apply(&mut b).unwrap();
        assert_eq!(
            b.rows()[0],
            vec![
                Value::from("7"),
                Value::from("Pena Muller"),
                Value::from("12.50"),
                Value::Null,
                Value::from("08:30:00"),
                Value::from("2024-03-01 10:15:00"),
            ]
        );
        assert!(b.rows()[1].iter().enumerate().all(|(i, v)| i == 3 || v.is_null()));
    }

    #[test]
    fn test_native_destination_recoerces_columns() {
        let mut b = chunk();
        ChunkPlan::new(b.columns(), &type_map(), &MssqlDialect).apply(&mut b).unwrap();
        let row = &b.rows()[0];
        assert_eq!(row[0], Value::Int(7));
        assert_eq!(row[1], Value::from("Pena Muller"));
        assert_eq!(row[2], Value::Decimal(Decimal::new(1250, 2)));
        assert_eq!(row[3], Value::Null);
        assert_eq!(
            row[4],
            Value::Time(NaiveTime::from_hms_opt(8, 30, 0).unwrap())
        );
        assert_eq!(
            row[5],
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(10, 15, 0)
                    .unwrap()
            )
        );
        assert_eq!(b.rows()[1][3], Value::Float(0.5));
    }

    #[test]
    fn test_unparseable_native_value_is_conversion_error() {
        let mut b = batch(&["ID"], vec![vec![Value::from("abc")]]);
        let err = ChunkPlan::new(b.columns(), &type_map(), &MssqlDialect)
            .apply(&mut b)
            .unwrap_err();
        assert!(matches!(err, CopyError::TypeConversion { ref column, .. } if column == "ID"));
    }

    #[test]
    fn test_time_prefix_variants() {
        assert_eq!(
            normalized_text(Value::from("1 day 00:00:05"), Some(TypeFamily::Time)).unwrap(),
            "00:00:05"
        );
        assert_eq!(
            normalized_text(Value::from("12 days 23:59:59"), Some(TypeFamily::Time)).unwrap(),
            "23:59:59"
        );
        // only TIME columns are touched
        assert_eq!(
            normalized_text(Value::from("0 days left"), None).unwrap(),
            "0 days left"
        );
    }

    #[test]
    fn test_integer_and_hex_parsing() {
        assert_eq!(parse_integer("12.0"), Some(12));
        assert_eq!(parse_integer("12.5"), None);
        assert_eq!(decode_hex("dead"), Some(vec![0xde, 0xad]));
        assert_eq!(decode_hex("abc"), None);
    }
}
