//! IBM DB2 SQL dialect (Strategy pattern).
//!
//! DB2 is reached through ODBC. Catalog queries read `SYSCAT`.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault};
use crate::dialect::TypeFamily;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"SQL0206N\s+"(?:[^"]*\.)?([^".]+)" is not valid"#).expect("valid SQL0206N regex")
});

const BARE_TYPES: &[&str] = &[
    "BOOLEAN",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "REAL",
    "DOUBLE",
    "CLOB",
    "BLOB",
    "DATE",
    "TIME",
    "TIMESTAMP",
];

/// DB2 dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct Db2Dialect;

impl Db2Dialect {
    /// Create a new DB2 dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn schema_expr(&self, schema: Option<&str>) -> String {
        match schema {
            Some(s) => format!("UPPER('{}')", self.escape_literal(s)),
            None => "CURRENT SCHEMA".to_string(),
        }
    }
}

impl Dialect for Db2Dialect {
    fn kind(&self) -> DbKind {
        DbKind::Db2
    }

    fn tables_query(&self, schema: &str) -> String {
        format!(
            "SELECT TRIM(TABSCHEMA) AS TABLE_SCHEMA, TABNAME AS TABLE_NAME FROM SYSCAT.TABLES \
             WHERE TYPE = 'T' AND TABSCHEMA = {} ORDER BY TABNAME",
            self.schema_expr(Some(schema))
        )
    }

    fn table_names_query(&self, schema: Option<&str>) -> String {
        match schema {
            Some(_) => format!(
                "SELECT TRIM(TABSCHEMA) || '.' || TABNAME FROM SYSCAT.TABLES \
                 WHERE TYPE = 'T' AND TABSCHEMA = {}",
                self.schema_expr(schema)
            ),
            None => "SELECT TABNAME FROM SYSCAT.TABLES WHERE TYPE = 'T' AND TABSCHEMA = CURRENT SCHEMA"
                .to_string(),
        }
    }

    fn columns_query(&self, schema: Option<&str>, table: Option<&str>) -> String {
        let mut sql = format!(
            "SELECT C.TABNAME AS TABLE_NAME, C.COLNAME AS COLUMN_NAME, C.TYPENAME AS DATA_TYPE, \
             CASE WHEN C.TYPENAME IN ('DECIMAL', 'NUMERIC', 'DECFLOAT') THEN NULL ELSE C.LENGTH END AS DATA_LENGTH, \
             CASE WHEN C.TYPENAME IN ('DECIMAL', 'NUMERIC') THEN C.LENGTH ELSE NULL END AS DATA_PRECISION, \
             CASE WHEN C.TYPENAME IN ('DECIMAL', 'NUMERIC') THEN C.SCALE ELSE NULL END AS DATA_SCALE, \
             CASE WHEN C.NULLS = 'Y' THEN 1 ELSE 0 END AS NULLABLE, \
             CASE WHEN C.KEYSEQ IS NOT NULL THEN 1 ELSE 0 END AS PK, \
             CASE WHEN C.IDENTITY = 'Y' THEN 1 ELSE 0 END AS INCREMENTAL \
             FROM SYSCAT.COLUMNS C WHERE C.TABSCHEMA = {}",
            self.schema_expr(schema)
        );
        if let Some(t) = table {
            sql.push_str(&format!(
                " AND UPPER(C.TABNAME) = UPPER('{}')",
                self.escape_literal(t)
            ));
        }
        sql.push_str(" ORDER BY C.TABNAME, C.COLNO");
        sql
    }

    fn family_of(&self, native_type: &str) -> TypeFamily {
        match native_type.trim().to_uppercase().as_str() {
            "BOOLEAN" => TypeFamily::Boolean,
            "SMALLINT" => TypeFamily::SmallInt,
            "INTEGER" | "INT" => TypeFamily::Integer,
            "BIGINT" => TypeFamily::BigInt,
            "DECIMAL" | "NUMERIC" | "DECFLOAT" => TypeFamily::Decimal,
            "REAL" => TypeFamily::Real,
            "DOUBLE" | "FLOAT" => TypeFamily::Double,
            "CHARACTER" | "CHAR" | "GRAPHIC" => TypeFamily::Char,
            "VARCHAR" | "VARGRAPHIC" => TypeFamily::Varchar,
            "CLOB" | "DBCLOB" | "LONG VARCHAR" | "XML" => TypeFamily::Text,
            "DATE" => TypeFamily::Date,
            "TIME" => TypeFamily::Time,
            "TIMESTAMP" => TypeFamily::Timestamp,
            "BINARY" | "VARBINARY" => TypeFamily::Binary,
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
            TypeFamily::Real => "REAL",
            TypeFamily::Double => "DOUBLE",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR",
            TypeFamily::Text | TypeFamily::Other => "CLOB",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
            TypeFamily::Timestamp | TypeFamily::TimestampTz => "TIMESTAMP",
            TypeFamily::Binary => "VARBINARY",
            TypeFamily::Blob => "BLOB",
            TypeFamily::Uuid => "CHAR(36)",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {} IMMEDIATE", table)
    }

    fn add_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} VARCHAR({})",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DATA TYPE VARCHAR({})",
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
