//! Oracle SQL dialect (Strategy pattern).
//!
//! Oracle is reached through ODBC, so placeholders are `?`. Catalog queries
//! read `ALL_TAB_COLS` and the constraint views.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault, ProcedureCall};
use crate::dialect::TypeFamily;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ORA-00904: (?:"[^"]*"\.)*"([^"]+)""#).expect("valid ORA-00904 regex")
});

static TOO_LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ORA-12899:[^\n]*"([^"]+)""#).expect("valid ORA-12899 regex")
});

const BARE_TYPES: &[&str] = &[
    "DATE",
    "BINARY_FLOAT",
    "BINARY_DOUBLE",
    "CLOB",
    "NCLOB",
    "BLOB",
    "LONG",
    "FLOAT",
];

/// Oracle dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Create a new Oracle dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for OracleDialect {
    fn kind(&self) -> DbKind {
        DbKind::Oracle
    }

    fn tables_query(&self, schema: &str) -> String {
        format!(
            "SELECT OWNER AS TABLE_SCHEMA, TABLE_NAME FROM ALL_TABLES \
             WHERE OWNER = UPPER('{}') ORDER BY TABLE_NAME",
            self.escape_literal(schema)
        )
    }

    fn table_names_query(&self, schema: Option<&str>) -> String {
        match schema {
            Some(s) => format!(
                "SELECT OWNER || '.' || TABLE_NAME FROM ALL_TABLES WHERE OWNER = UPPER('{}')",
                self.escape_literal(s)
            ),
            None => "SELECT TABLE_NAME FROM USER_TABLES".to_string(),
        }
    }

    fn columns_query(&self, schema: Option<&str>, table: Option<&str>) -> String {
        let owner = match schema {
            Some(s) => format!("UPPER('{}')", self.escape_literal(s)),
            None => "USER".to_string(),
        };
        let mut sql = format!(
            "SELECT A.TABLE_NAME, A.COLUMN_NAME, A.DATA_TYPE, A.DATA_LENGTH, \
             A.DATA_PRECISION, A.DATA_SCALE, \
             CASE WHEN A.NULLABLE = 'Y' THEN 1 ELSE 0 END AS NULLABLE, \
             CASE WHEN ACC.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS PK, \
             CASE WHEN A.IDENTITY_COLUMN = 'YES' THEN 1 ELSE 0 END AS INCREMENTAL \
             FROM ALL_TAB_COLS A \
             LEFT JOIN ALL_CONSTRAINTS AC \
               ON A.OWNER = AC.OWNER AND A.TABLE_NAME = AC.TABLE_NAME AND AC.CONSTRAINT_TYPE = 'P' \
             LEFT JOIN ALL_CONS_COLUMNS ACC \
               ON AC.OWNER = ACC.OWNER AND AC.TABLE_NAME = ACC.TABLE_NAME \
              AND AC.CONSTRAINT_NAME = ACC.CONSTRAINT_NAME AND A.COLUMN_NAME = ACC.COLUMN_NAME \
             WHERE A.OWNER = {} AND A.HIDDEN_COLUMN = 'NO'",
            owner
        );
        if let Some(t) = table {
            sql.push_str(&format!(
                " AND UPPER(A.TABLE_NAME) = UPPER('{}')",
                self.escape_literal(t)
            ));
        }
        sql.push_str(" ORDER BY A.TABLE_NAME, A.COLUMN_ID");
        sql
    }

    fn family_of(&self, native_type: &str) -> TypeFamily {
        let upper = native_type.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "VARCHAR2" | "NVARCHAR2" | "VARCHAR" => TypeFamily::Varchar,
            "CHAR" | "NCHAR" => TypeFamily::Char,
            "CLOB" | "NCLOB" | "LONG" | "XMLTYPE" => TypeFamily::Text,
            "NUMBER" | "DECIMAL" | "NUMERIC" | "INTEGER" => TypeFamily::Decimal,
            "FLOAT" | "BINARY_DOUBLE" => TypeFamily::Double,
            "BINARY_FLOAT" => TypeFamily::Real,
            // Oracle DATE carries a time of day.
            "DATE" => TypeFamily::Timestamp,
            "TIMESTAMP" if upper.contains("TIME ZONE") => TypeFamily::TimestampTz,
            "TIMESTAMP" => TypeFamily::Timestamp,
            "RAW" => TypeFamily::Binary,
            "BLOB" | "LONG RAW" => TypeFamily::Blob,
            _ => TypeFamily::Other,
        }
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        match family {
            TypeFamily::Boolean => "NUMBER(1)",
            TypeFamily::TinyInt => "NUMBER(3)",
            TypeFamily::SmallInt => "NUMBER(5)",
            TypeFamily::Integer => "NUMBER(10)",
            TypeFamily::BigInt => "NUMBER(19)",
            TypeFamily::Decimal => "NUMBER",
            TypeFamily::Real => "BINARY_FLOAT",
            TypeFamily::Double => "BINARY_DOUBLE",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR2",
            TypeFamily::Text | TypeFamily::Other => "CLOB",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "VARCHAR2(50)",
            TypeFamily::Timestamp => "TIMESTAMP(6)",
            TypeFamily::TimestampTz => "TIMESTAMP(6) WITH TIME ZONE",
            TypeFamily::Binary => "RAW",
            TypeFamily::Blob => "BLOB",
            TypeFamily::Uuid => "VARCHAR2(36)",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn requires_native_types(&self) -> bool {
        true
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        let placeholders = vec!["?"; param_count].join(", ");
        ProcedureCall {
            sql: format!("{{CALL {}({})}}", name, placeholders),
            returns_rows: false,
        }
    }

    fn text_type(&self, width: usize) -> String {
        format!("VARCHAR2({} CHAR)", width)
    }

    fn add_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ADD ({} VARCHAR2({} CHAR))",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} MODIFY ({} VARCHAR2({} CHAR))",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn diagnose(&self, message: &str) -> Option<LoadFault> {
        if let Some(c) = MISSING_COLUMN_RE.captures(message) {
            return Some(LoadFault::MissingColumn(c[1].to_string()));
        }
        TOO_LONG_RE
            .captures(message)
            .map(|c| LoadFault::ValueTooLong(c[1].to_string()))
    }
}
