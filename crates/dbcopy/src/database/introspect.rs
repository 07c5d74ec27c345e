//! Catalog introspection normalized to the canonical column shape.

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::core::{ColumnDescriptor, Dialect, Params, RecordBatch, Value, CANONICAL_COLUMNS};
use crate::error::{CopyError, Result};

use super::Database;

/// Split `schema.table` on the last dot.
pub(crate) fn split_table_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Catalog numbers arrive as integers, decimals or text depending on the
/// driver.
fn catalog_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Int(v) => Some(*v),
        Value::Bool(v) => Some(i64::from(*v)),
        Value::Decimal(d) => d.to_i64(),
        Value::Float(f) => Some(*f as i64),
        Value::Text(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn catalog_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        other => other.to_text().map(|s| s.trim().to_string()),
    }
}

/// Parse a canonical nine-column result into descriptors.
pub(crate) fn descriptors(batch: &RecordBatch) -> Result<Vec<ColumnDescriptor>> {
    let mut positions = [0usize; 9];
    for (slot, name) in positions.iter_mut().zip(CANONICAL_COLUMNS) {
        *slot = batch.column_index(name).ok_or_else(|| {
            CopyError::query(format!("catalog result has no {} column", name))
        })?;
    }
    let [table, column, data_type, length, precision, scale, nullable, pk, incremental] =
        positions;

    let columns = batch
        .rows()
        .iter()
        .map(|row| ColumnDescriptor {
            table: catalog_text(row.get(table)).unwrap_or_default(),
            column: catalog_text(row.get(column)).unwrap_or_default(),
            native_type: catalog_text(row.get(data_type)).unwrap_or_default(),
            // MSSQL reports (max) lengths as -1
            length: catalog_int(row.get(length)).filter(|n| *n >= 0),
            precision: catalog_int(row.get(precision)),
            scale: catalog_int(row.get(scale)),
            nullable: catalog_int(row.get(nullable)).unwrap_or(1) != 0,
            is_primary_key: catalog_int(row.get(pk)).unwrap_or(0) != 0,
            is_identity: catalog_int(row.get(incremental)).unwrap_or(0) != 0,
        })
        .collect();
    Ok(columns)
}

impl Database {
    /// Base tables of a schema as TABLE_SCHEMA, TABLE_NAME.
    pub async fn schema_tables(&self, schema: &str) -> Result<RecordBatch> {
        self.get(&self.dialect().tables_query(schema), Params::None)
            .await
    }

    /// Canonical column metadata, for one table or the whole schema.
    pub async fn schema_columns(&self, schema: Option<&str>, table: Option<&str>) -> Result<RecordBatch> {
        self.get(&self.dialect().columns_query(schema, table), Params::None)
            .await
    }

    /// Column descriptors of a table, in ordinal order. `name` may be
    /// schema-qualified.
    pub async fn describe_table(&self, name: &str) -> Result<Vec<ColumnDescriptor>> {
        let (schema, table) = split_table_name(name);
        let batch = self.schema_columns(schema, Some(table)).await?;
        let columns = descriptors(&batch)?;
        debug!("{} has {} columns", name, columns.len());
        Ok(columns)
    }

    /// Case-insensitive existence check against the catalog's table list.
    pub async fn exist_table(&self, name: &str) -> Result<bool> {
        let (schema, _) = split_table_name(name);
        let names = self
            .get(&self.dialect().table_names_query(schema), Params::None)
            .await?;
        Ok(names
            .rows()
            .iter()
            .filter_map(|row| catalog_text(row.first()))
            .any(|t| t.eq_ignore_ascii_case(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbKind;
    use crate::testing::{batch, scripted, Response};

    fn catalog_rows() -> RecordBatch {
        batch(
            &CANONICAL_COLUMNS,
            vec![
                vec![
                    Value::from("SALES"),
                    Value::from("ID"),
                    Value::from("NUMBER"),
                    Value::Int(22),
                    Value::Int(10),
                    Value::Int(0),
                    Value::Int(0),
                    Value::Int(1),
                    Value::Int(1),
                ],
                vec![
                    Value::from("SALES"),
                    Value::from("NOTE"),
                    Value::from("nvarchar"),
                    Value::from("-1"),
                    Value::Null,
                    Value::Null,
                    Value::from("1"),
                    Value::from("0"),
                    Value::from("0"),
                ],
            ],
        )
    }

    #[test]
    fn test_descriptors_normalize_driver_shapes() {
        let cols = descriptors(&catalog_rows()).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].precision, Some(10));
        assert_eq!(cols[0].scale, Some(0));
        assert!(cols[0].is_primary_key && cols[0].is_identity && !cols[0].nullable);
        assert_eq!(cols[1].length, None);
        assert!(cols[1].nullable);
    }

    #[test]
    fn test_descriptors_need_canonical_columns() {
        let bad = batch(&["TABLE_NAME"], vec![]);
        assert!(descriptors(&bad).is_err());
    }

    #[test]
    fn test_split_table_name() {
        assert_eq!(split_table_name("dbo.Sales"), (Some("dbo"), "Sales"));
        assert_eq!(split_table_name("Sales"), (None, "Sales"));
    }

    #[tokio::test]
    async fn test_describe_table_queries_catalog() {
        let (db, script) = scripted(DbKind::Oracle);
        script.on("all_tab_cols", Response::Rows(catalog_rows()));
        let cols = db.describe_table("DWH.SALES").await.unwrap();
        assert_eq!(cols[0].column, "ID");
        let sql = &script.statements()[0];
        assert!(sql.contains("UPPER('DWH')"));
        assert!(sql.contains("UPPER('SALES')"));
    }

    #[tokio::test]
    async fn test_exist_table_is_case_insensitive() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on(
            "information_schema.tables",
            Response::Rows(batch(
                &["name"],
                vec![vec![Value::from("public.orders")], vec![Value::from("public.items")]],
            )),
        );
        assert!(db.exist_table("PUBLIC.ORDERS").await.unwrap());
        assert!(!db.exist_table("public.missing").await.unwrap());
    }
}
