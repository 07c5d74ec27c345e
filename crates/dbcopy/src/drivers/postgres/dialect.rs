//! PostgreSQL SQL dialect (Strategy pattern).

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault, ProcedureCall};
use crate::dialect::TypeFamily;
use crate::drivers::common::catalog::InformationSchema;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"column "([^"]+)" of relation "[^"]+" does not exist"#)
        .expect("valid missing-column regex")
});

const BARE_TYPES: &[&str] = &[
    "BOOLEAN",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "REAL",
    "DOUBLE PRECISION",
    "TEXT",
    "DATE",
    "TIME",
    "TIMESTAMP",
    "TIMESTAMPTZ",
    "BYTEA",
    "UUID",
    "JSON",
    "JSONB",
];

const CATALOG: InformationSchema<'static> = InformationSchema {
    current_schema: "current_schema()",
    identity_expr: "CASE WHEN cols.is_identity = 'YES' OR cols.column_default LIKE 'nextval(%' THEN 1 ELSE 0 END",
    qualified_name_expr: "t.table_schema || '.' || t.table_name",
};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn tables_query(&self, schema: &str) -> String {
        CATALOG.tables_query(self, schema)
    }

    fn table_names_query(&self, schema: Option<&str>) -> String {
        CATALOG.table_names_query(self, schema)
    }

    fn columns_query(&self, schema: Option<&str>, table: Option<&str>) -> String {
        CATALOG.columns_query(self, schema, table)
    }

    fn family_of(&self, native_type: &str) -> TypeFamily {
        match native_type.trim().to_lowercase().as_str() {
            "boolean" | "bool" => TypeFamily::Boolean,
            "smallint" | "int2" => TypeFamily::SmallInt,
            "integer" | "int" | "int4" | "serial" => TypeFamily::Integer,
            "bigint" | "int8" | "bigserial" => TypeFamily::BigInt,
            "numeric" | "decimal" | "money" => TypeFamily::Decimal,
            "real" | "float4" => TypeFamily::Real,
            "double precision" | "float8" => TypeFamily::Double,
            "character" | "char" | "bpchar" => TypeFamily::Char,
            "character varying" | "varchar" => TypeFamily::Varchar,
            "text" | "json" | "jsonb" | "xml" | "citext" => TypeFamily::Text,
            "date" => TypeFamily::Date,
            "time without time zone" | "time with time zone" | "time" | "interval" => {
                TypeFamily::Time
            }
            "timestamp without time zone" | "timestamp" => TypeFamily::Timestamp,
            "timestamp with time zone" | "timestamptz" => TypeFamily::TimestampTz,
            "bytea" => TypeFamily::Blob,
            "uuid" => TypeFamily::Uuid,
            _ => TypeFamily::Other,
        }
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        match family {
            TypeFamily::Boolean => "BOOLEAN",
            TypeFamily::TinyInt | TypeFamily::SmallInt => "SMALLINT",
            TypeFamily::Integer => "INTEGER",
            TypeFamily::BigInt => "BIGINT",
            TypeFamily::Decimal => "NUMERIC",
            TypeFamily::Real => "REAL",
            TypeFamily::Double => "DOUBLE PRECISION",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR",
            TypeFamily::Text | TypeFamily::Other => "TEXT",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
            TypeFamily::Timestamp => "TIMESTAMP",
            TypeFamily::TimestampTz => "TIMESTAMPTZ",
            TypeFamily::Binary | TypeFamily::Blob => "BYTEA",
            TypeFamily::Uuid => "UUID",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        let params: Vec<String> = (1..=param_count).map(|i| self.param_placeholder(i)).collect();
        ProcedureCall {
            sql: format!("SELECT * FROM {}({})", name, params.join(", ")),
            returns_rows: true,
        }
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
            "ALTER TABLE {} ALTER COLUMN {} TYPE VARCHAR({})",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn diagnose(&self, message: &str) -> Option<LoadFault> {
        // "value too long for type character varying(n)" never names the
        // column, so only the missing-column case is recognized here.
        MISSING_COLUMN_RE
            .captures(message)
            .map(|c| LoadFault::MissingColumn(c[1].to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("my\"table"), "\"my\"\"table\"");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.param_placeholder(10), "$10");
    }

    #[test]
    fn test_procedure_call_wraps_select() {
        let call = PostgresDialect::new().procedure_call("next_invoice", 1);
        assert_eq!(call.sql, "SELECT * FROM next_invoice($1)");
        assert!(call.returns_rows);
    }

    #[test]
    fn test_diagnose_missing_column() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.diagnose(r#"column "region" of relation "orders" does not exist"#),
            Some(LoadFault::MissingColumn("region".into()))
        );
        assert_eq!(
            dialect.diagnose("value too long for type character varying(10)"),
            None
        );
    }

    #[test]
    fn test_table_names_query_qualifies_with_schema() {
        let sql = PostgresDialect::new().table_names_query(Some("sales"));
        assert!(sql.starts_with("SELECT t.table_schema || '.' || t.table_name"));
        assert!(sql.ends_with("t.table_schema = 'sales'"));
    }
}
