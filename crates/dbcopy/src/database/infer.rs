//! Column types inferred from the data of a batch, for tables that have
//! no catalog to translate from.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use tracing::debug;

use crate::core::{Dialect, RecordBatch, Value};
use crate::dialect::TypeFamily;
use crate::error::Result;

use super::Database;

/// Narrowest text column created for inferred text.
const MIN_TEXT_WIDTH: usize = 100;

/// Widest bounded text before falling back to the unbounded type.
const MAX_TEXT_WIDTH: usize = 4000;

/// What the non-null values of one column have in common.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Observed {
    Empty,
    Bool,
    Int,
    Float,
    Decimal { scale: u32, digits: u32 },
    Date,
    DateTime { has_time: bool },
    DateTimeOffset,
    Time,
    Uuid,
    Bytes,
    Text,
}

fn observe(value: &Value) -> Observed {
    match value {
        Value::Null => Observed::Empty,
        Value::Bool(_) => Observed::Bool,
        Value::Int(_) => Observed::Int,
        Value::Float(f) if f.is_nan() => Observed::Empty,
        Value::Float(_) => Observed::Float,
        Value::Decimal(d) => Observed::Decimal {
            scale: d.scale(),
            digits: integer_digits(d),
        },
        Value::Date(_) => Observed::Date,
        Value::DateTime(dt) => Observed::DateTime {
            has_time: dt.time() != NaiveTime::MIN,
        },
        Value::DateTimeOffset(_) => Observed::DateTimeOffset,
        Value::Time(_) => Observed::Time,
        Value::Uuid(_) => Observed::Uuid,
        Value::Bytes(_) => Observed::Bytes,
        Value::Text(_) => Observed::Text,
    }
}

fn integer_digits(d: &Decimal) -> u32 {
    let whole = d.abs().trunc();
    if whole.is_zero() {
        1
    } else {
        whole.to_string().len() as u32
    }
}

/// Join two observations of the same column. Unrelated kinds become text.
fn merge(a: Observed, b: Observed) -> Observed {
    match (a, b) {
        (Observed::Empty, x) | (x, Observed::Empty) => x,
        (x, y) if x == y => x,
        (Observed::Int, Observed::Float) | (Observed::Float, Observed::Int) => Observed::Float,
        (Observed::Decimal { scale, digits }, Observed::Int)
        | (Observed::Int, Observed::Decimal { scale, digits }) => Observed::Decimal {
            scale,
            digits: digits.max(19),
        },
        (
            Observed::Decimal { scale: s1, digits: d1 },
            Observed::Decimal { scale: s2, digits: d2 },
        ) => Observed::Decimal {
            scale: s1.max(s2),
            digits: d1.max(d2),
        },
        (Observed::Decimal { .. }, Observed::Float) | (Observed::Float, Observed::Decimal { .. }) => {
            Observed::Float
        }
        (Observed::Date, Observed::DateTime { has_time })
        | (Observed::DateTime { has_time }, Observed::Date) => Observed::DateTime { has_time },
        (Observed::DateTime { has_time: a }, Observed::DateTime { has_time: b }) => {
            Observed::DateTime { has_time: a || b }
        }
        _ => Observed::Text,
    }
}

fn decimal_type(dialect: &dyn Dialect, scale: u32, digits: u32) -> String {
    let name = dialect.type_name(TypeFamily::Decimal);
    let precision = (digits + scale).clamp(18, 38);
    format!("{}({}, {})", name, precision, scale.min(precision))
}

fn text_type(dialect: &dyn Dialect, longest: usize) -> String {
    let width = MIN_TEXT_WIDTH.max(longest * 2);
    if width > MAX_TEXT_WIDTH {
        dialect.type_name(TypeFamily::Text).to_string()
    } else {
        dialect.text_type(width)
    }
}

/// Infer an ordered column→DDL type map from the values of a batch.
///
/// Text columns get twice their longest value, at least
/// 100 characters. Datetimes become a timestamp only when
/// some value carries a time of day, else a date.
pub fn infer_column_types(dialect: &dyn Dialect, batch: &RecordBatch) -> Vec<(String, String)> {
    batch
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells = batch.rows().iter().filter_map(|row| row.get(i));
            let observed = cells.clone().map(observe).fold(Observed::Empty, merge);
            let ty = match observed {
                Observed::Bool => dialect.type_name(TypeFamily::Boolean).to_string(),
                Observed::Int => dialect.type_name(TypeFamily::BigInt).to_string(),
                Observed::Float => dialect.type_name(TypeFamily::Double).to_string(),
                Observed::Decimal { scale, digits } => decimal_type(dialect, scale, digits),
                Observed::Date | Observed::DateTime { has_time: false } => {
                    dialect.type_name(TypeFamily::Date).to_string()
                }
                Observed::DateTime { has_time: true } => {
                    dialect.type_name(TypeFamily::Timestamp).to_string()
                }
                Observed::DateTimeOffset => dialect.type_name(TypeFamily::TimestampTz).to_string(),
                Observed::Time => dialect.type_name(TypeFamily::Time).to_string(),
                Observed::Uuid => dialect.type_name(TypeFamily::Uuid).to_string(),
                Observed::Bytes => dialect.type_name(TypeFamily::Blob).to_string(),
                Observed::Text | Observed::Empty => {
                    let longest = cells
                        .filter_map(Value::to_text)
                        .map(|s| s.chars().count())
                        .max()
                        .unwrap_or(0);
                    text_type(dialect, longest)
                }
            };
            (name.clone(), ty)
        })
        .collect()
}

impl Database {
    /// Column types for `batch` in this database's dialect.
    pub fn infer_table_types(&self, batch: &RecordBatch) -> Vec<(String, String)> {
        infer_column_types(self.dialect(), batch)
    }

    /// Create `table` with columns inferred from `batch` and return the
    /// type map used.
    pub async fn create_table_from_batch(
        &self,
        table: &str,
        batch: &RecordBatch,
    ) -> Result<Vec<(String, String)>> {
        let types = self.infer_table_types(batch);
        debug!("Inferred {} column types for {}", types.len(), table);
        self.create_table(table, &types, None).await?;
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbKind;
    use crate::drivers::DialectImpl;
    use crate::testing::{batch, scripted, Event};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn types_for(kind: DbKind, rows: &RecordBatch) -> Vec<(String, String)> {
        infer_column_types(&DialectImpl::for_kind(kind), rows)
    }

    #[test]
    fn test_text_width_is_double_longest_with_floor() {
        let long = "x".repeat(80);
        let rows = batch(
            &["SHORT", "LONG"],
            vec![
                vec![Value::from("ab"), Value::from(long.as_str())],
                vec![Value::Null, Value::from("y")],
            ],
        );
        assert_eq!(
            types_for(DbKind::Oracle, &rows),
            vec![
                ("SHORT".to_string(), "VARCHAR2(100 CHAR)".to_string()),
                ("LONG".to_string(), "VARCHAR2(160 CHAR)".to_string()),
            ]
        );
        assert_eq!(types_for(DbKind::Postgres, &rows)[1].1, "VARCHAR(160)");
    }

    #[test]
    fn test_very_long_text_is_unbounded() {
        let rows = batch(&["BODY"], vec![vec![Value::from("z".repeat(2500).as_str())]]);
        assert_eq!(types_for(DbKind::Oracle, &rows)[0].1, "CLOB");
    }

    #[test]
    fn test_datetimes_without_time_of_day_are_dates() {
        let midnight = day(1).and_hms_opt(0, 0, 0).unwrap();
        let afternoon = day(2).and_hms_opt(15, 30, 0).unwrap();
        let rows = batch(
            &["BOOKED", "UPDATED"],
            vec![
                vec![Value::DateTime(midnight), Value::DateTime(midnight)],
                vec![Value::Date(day(3)), Value::DateTime(afternoon)],
                vec![Value::Null, Value::Null],
            ],
        );
        let types = types_for(DbKind::Oracle, &rows);
        assert_eq!(types[0].1, "DATE");
        assert_eq!(types[1].1, "TIMESTAMP(6)");
    }

    #[test]
    fn test_numbers_and_mixed_columns() {
        let rows = batch(
            &["QTY", "PRICE", "AMOUNT", "FLAG", "MIXED", "EMPTY"],
            vec![
                vec![
                    Value::Int(3),
                    Value::Int(1),
                    Value::Decimal(Decimal::new(12345, 2)),
                    Value::Bool(true),
                    Value::Int(1),
                    Value::Null,
                ],
                vec![
                    Value::Int(4),
                    Value::Float(2.5),
                    Value::Decimal(Decimal::new(7, 1)),
                    Value::Bool(false),
                    Value::from("one"),
                    Value::Null,
                ],
            ],
        );
        let types = types_for(DbKind::Postgres, &rows);
        assert_eq!(types[0].1, "BIGINT");
        assert_eq!(types[1].1, "DOUBLE PRECISION");
        assert_eq!(types[2].1, "NUMERIC(18, 2)");
        assert_eq!(types[3].1, "BOOLEAN");
        assert_eq!(types[4].1, "VARCHAR(100)");
        assert_eq!(types[5].1, "VARCHAR(100)");
    }

    #[tokio::test]
    async fn test_create_table_from_batch_issues_ddl() {
        let (db, script) = scripted(DbKind::Oracle);
        let rows = batch(&["ID", "NAME"], vec![vec![Value::Int(1), Value::from("ana")]]);
        let types = db.create_table_from_batch("STG.PEOPLE", &rows).await.unwrap();
        assert_eq!(types[0], ("ID".to_string(), "NUMBER(19)".to_string()));
        assert_eq!(
            script.events()[1],
            Event::Execute(
                "CREATE TABLE STG.PEOPLE (\n    \"ID\" NUMBER(19),\n    \"NAME\" VARCHAR2(100 CHAR)\n)"
                    .into()
            )
        );
        assert_eq!(script.count(&Event::Commit), 1);
    }
}
