//! Firebird SQL dialect (Strategy pattern).
//!
//! Firebird has no schemas; a schema argument is accepted and ignored.
//! Catalog queries read the `RDB$` system tables and decode field type codes
//! into SQL type names.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault, ProcedureCall};
use crate::dialect::TypeFamily;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Column unknown\s*-?\s*(?:[^\s.]+\.)?([^\s.]+)").expect("valid column-unknown regex")
});

const BARE_TYPES: &[&str] = &[
    "BOOLEAN",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "FLOAT",
    "DOUBLE PRECISION",
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMP WITH TIME ZONE",
    "BLOB",
    "BLOB SUB_TYPE TEXT",
];

const FIELD_TYPE_NAME: &str = "CASE F.RDB$FIELD_TYPE \
    WHEN 7 THEN CASE WHEN F.RDB$FIELD_SUB_TYPE > 0 OR F.RDB$FIELD_SCALE < 0 THEN 'NUMERIC' ELSE 'SMALLINT' END \
    WHEN 8 THEN CASE WHEN F.RDB$FIELD_SUB_TYPE > 0 OR F.RDB$FIELD_SCALE < 0 THEN 'NUMERIC' ELSE 'INTEGER' END \
    WHEN 16 THEN CASE WHEN F.RDB$FIELD_SUB_TYPE > 0 OR F.RDB$FIELD_SCALE < 0 THEN 'NUMERIC' ELSE 'BIGINT' END \
    WHEN 10 THEN 'FLOAT' \
    WHEN 27 THEN 'DOUBLE PRECISION' \
    WHEN 12 THEN 'DATE' \
    WHEN 13 THEN 'TIME' \
    WHEN 35 THEN 'TIMESTAMP' \
    WHEN 14 THEN 'CHAR' \
    WHEN 37 THEN 'VARCHAR' \
    WHEN 23 THEN 'BOOLEAN' \
    WHEN 261 THEN CASE WHEN F.RDB$FIELD_SUB_TYPE = 1 THEN 'BLOB SUB_TYPE TEXT' ELSE 'BLOB' END \
    ELSE 'UNKNOWN' END";

/// Firebird dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct FirebirdDialect;

impl FirebirdDialect {
    /// Create a new Firebird dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for FirebirdDialect {
    fn kind(&self) -> DbKind {
        DbKind::Firebird
    }

    fn tables_query(&self, _schema: &str) -> String {
        "SELECT CAST(NULL AS VARCHAR(63)) AS TABLE_SCHEMA, TRIM(R.RDB$RELATION_NAME) AS TABLE_NAME \
         FROM RDB$RELATIONS R \
         WHERE COALESCE(R.RDB$SYSTEM_FLAG, 0) = 0 AND R.RDB$VIEW_BLR IS NULL \
         ORDER BY R.RDB$RELATION_NAME"
            .to_string()
    }

    fn table_names_query(&self, _schema: Option<&str>) -> String {
        "SELECT TRIM(R.RDB$RELATION_NAME) FROM RDB$RELATIONS R \
         WHERE COALESCE(R.RDB$SYSTEM_FLAG, 0) = 0 AND R.RDB$VIEW_BLR IS NULL"
            .to_string()
    }

    fn columns_query(&self, _schema: Option<&str>, table: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT TRIM(RF.RDB$RELATION_NAME) AS TABLE_NAME, \
             TRIM(RF.RDB$FIELD_NAME) AS COLUMN_NAME, \
             {} AS DATA_TYPE, \
             F.RDB$CHARACTER_LENGTH AS DATA_LENGTH, \
             F.RDB$FIELD_PRECISION AS DATA_PRECISION, \
             -F.RDB$FIELD_SCALE AS DATA_SCALE, \
             CASE WHEN RF.RDB$NULL_FLAG = 1 THEN 0 ELSE 1 END AS NULLABLE, \
             CASE WHEN EXISTS (\
                SELECT 1 FROM RDB$RELATION_CONSTRAINTS RC \
                JOIN RDB$INDEX_SEGMENTS S ON S.RDB$INDEX_NAME = RC.RDB$INDEX_NAME \
                WHERE RC.RDB$RELATION_NAME = RF.RDB$RELATION_NAME \
                  AND RC.RDB$CONSTRAINT_TYPE = 'PRIMARY KEY' \
                  AND S.RDB$FIELD_NAME = RF.RDB$FIELD_NAME\
             ) THEN 1 ELSE 0 END AS PK, \
             CASE WHEN RF.RDB$IDENTITY_TYPE IS NOT NULL THEN 1 ELSE 0 END AS INCREMENTAL \
             FROM RDB$RELATION_FIELDS RF \
             JOIN RDB$FIELDS F ON F.RDB$FIELD_NAME = RF.RDB$FIELD_SOURCE \
             JOIN RDB$RELATIONS R ON R.RDB$RELATION_NAME = RF.RDB$RELATION_NAME \
             WHERE COALESCE(R.RDB$SYSTEM_FLAG, 0) = 0",
            FIELD_TYPE_NAME
        );
        if let Some(t) = table {
            sql.push_str(&format!(
                " AND UPPER(TRIM(RF.RDB$RELATION_NAME)) = UPPER('{}')",
                self.escape_literal(t)
            ));
        }
        sql.push_str(" ORDER BY RF.RDB$RELATION_NAME, RF.RDB$FIELD_POSITION");
        sql
    }

    fn family_of(&self, native_type: &str) -> TypeFamily {
        match native_type.trim().to_uppercase().as_str() {
            "BOOLEAN" => TypeFamily::Boolean,
            "SMALLINT" => TypeFamily::SmallInt,
            "INTEGER" => TypeFamily::Integer,
            "BIGINT" => TypeFamily::BigInt,
            "NUMERIC" | "DECIMAL" => TypeFamily::Decimal,
            "FLOAT" => TypeFamily::Real,
            "DOUBLE PRECISION" => TypeFamily::Double,
            "CHAR" => TypeFamily::Char,
            "VARCHAR" => TypeFamily::Varchar,
            "BLOB SUB_TYPE TEXT" => TypeFamily::Text,
            "DATE" => TypeFamily::Date,
            "TIME" => TypeFamily::Time,
            "TIMESTAMP" => TypeFamily::Timestamp,
            "BLOB" => TypeFamily::Blob,
            _ => TypeFamily::Other,
        }
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        match family {
            TypeFamily::Boolean => "BOOLEAN",
            TypeFamily::TinyInt | TypeFamily::SmallInt => "SMALLINT",
            TypeFamily::Integer => "INTEGER",
            TypeFamily::BigInt => "BIGINT",
            TypeFamily::Decimal => "DECIMAL",
            TypeFamily::Real => "FLOAT",
            TypeFamily::Double => "DOUBLE PRECISION",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR",
            TypeFamily::Text | TypeFamily::Other => "BLOB SUB_TYPE TEXT",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
            TypeFamily::Timestamp => "TIMESTAMP",
            TypeFamily::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            TypeFamily::Binary | TypeFamily::Blob => "BLOB",
            TypeFamily::Uuid => "CHAR(36)",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn run_timestamp_type(&self) -> &'static str {
        "TIMESTAMP"
    }

    // Firebird has no TRUNCATE.
    fn truncate_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", table)
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        let placeholders = vec!["?"; param_count].join(", ");
        let sql = if param_count == 0 {
            format!("EXECUTE PROCEDURE {}", name)
        } else {
            format!("EXECUTE PROCEDURE {} {}", name, placeholders)
        };
        ProcedureCall {
            sql,
            returns_rows: false,
        }
    }

    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE VARCHAR({})",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn diagnose(&self, message: &str) -> Option<LoadFault> {
        MISSING_COLUMN_RE
            .captures(message)
            .map(|c| LoadFault::MissingColumn(c[1].to_string()))
    }
}
