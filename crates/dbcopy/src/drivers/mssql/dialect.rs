//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides MSSQL-specific SQL syntax for identifier quoting, catalog
//! queries, type names and parameter placeholders.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault, ProcedureCall};
use crate::dialect::TypeFamily;
use crate::drivers::common::catalog::InformationSchema;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Invalid column name '([^']+)'").expect("valid invalid-column regex")
});

static TRUNCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"would be truncated in table '[^']*', column '([^']+)'")
        .expect("valid truncation regex")
});

const BARE_TYPES: &[&str] = &[
    "DATE",
    "DATETIME",
    "DATETIME2",
    "SMALLDATETIME",
    "DATETIMEOFFSET",
    "FLOAT",
    "REAL",
    "BIT",
    "TINYINT",
    "SMALLINT",
    "INT",
    "BIGINT",
    "MONEY",
    "TIME",
    "TEXT",
    "NTEXT",
    "IMAGE",
    "XML",
    "UNIQUEIDENTIFIER",
];

const CATALOG: InformationSchema<'static> = InformationSchema {
    current_schema: "SCHEMA_NAME()",
    identity_expr: "COLUMNPROPERTY(OBJECT_ID(QUOTENAME(cols.table_schema) + '.' + QUOTENAME(cols.table_name)), cols.column_name, 'IsIdentity')",
    qualified_name_expr: "CONCAT(t.table_schema, '.', t.table_name)",
};

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DbKind {
        DbKind::Mssql
    }

    fn quote_ident(&self, name: &str) -> String {
        // Closing brackets inside a name are doubled
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
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
            "bit" => TypeFamily::Boolean,
            "tinyint" => TypeFamily::TinyInt,
            "smallint" => TypeFamily::SmallInt,
            "int" => TypeFamily::Integer,
            "bigint" => TypeFamily::BigInt,
            "decimal" | "numeric" | "money" | "smallmoney" => TypeFamily::Decimal,
            "real" => TypeFamily::Real,
            "float" => TypeFamily::Double,
            "char" | "nchar" => TypeFamily::Char,
            "varchar" | "nvarchar" => TypeFamily::Varchar,
            "text" | "ntext" | "xml" => TypeFamily::Text,
            "date" => TypeFamily::Date,
            "time" => TypeFamily::Time,
            "datetime" | "datetime2" | "smalldatetime" => TypeFamily::Timestamp,
            "datetimeoffset" => TypeFamily::TimestampTz,
            "binary" | "varbinary" => TypeFamily::Binary,
            "image" => TypeFamily::Blob,
            "uniqueidentifier" => TypeFamily::Uuid,
            _ => TypeFamily::Other,
        }
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        match family {
            TypeFamily::Boolean => "BIT",
            TypeFamily::TinyInt => "TINYINT",
            TypeFamily::SmallInt => "SMALLINT",
            TypeFamily::Integer => "INT",
            TypeFamily::BigInt => "BIGINT",
            TypeFamily::Decimal => "DECIMAL",
            TypeFamily::Real => "REAL",
            TypeFamily::Double => "FLOAT",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR",
            TypeFamily::Text | TypeFamily::Other => "VARCHAR(max)",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
            TypeFamily::Timestamp => "DATETIME2",
            TypeFamily::TimestampTz => "DATETIMEOFFSET",
            TypeFamily::Binary => "VARBINARY",
            TypeFamily::Blob => "VARBINARY(max)",
            TypeFamily::Uuid => "UNIQUEIDENTIFIER",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn supports_max_length(&self) -> bool {
        true
    }

    fn run_timestamp_type(&self) -> &'static str {
        "DATETIME2(6)"
    }

    fn requires_native_types(&self) -> bool {
        true
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        let params: Vec<String> = (1..=param_count).map(|i| self.param_placeholder(i)).collect();
        let sql = if params.is_empty() {
            format!("EXEC {}", name)
        } else {
            format!("EXEC {} {}", name, params.join(", "))
        };
        ProcedureCall {
            sql,
            returns_rows: false,
        }
    }

    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} VARCHAR({})",
            table,
            self.quote_ident(column),
            width
        )
    }

    fn diagnose(&self, message: &str) -> Option<LoadFault> {
        if let Some(c) = MISSING_COLUMN_RE.captures(message) {
            return Some(LoadFault::MissingColumn(c[1].to_string()));
        }
        TRUNCATED_RE
            .captures(message)
            .map(|c| LoadFault::ValueTooLong(c[1].to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.quote_ident("name"), "[name]");
        assert_eq!(dialect.quote_ident("table]name"), "[table]]name]");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.param_placeholder(1), "@P1");
        assert_eq!(dialect.param_placeholder(10), "@P10");
    }

    #[test]
    fn test_procedure_call_uses_exec() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.procedure_call("dbo.refresh", 2).sql, "EXEC dbo.refresh @P1, @P2");
        assert_eq!(dialect.procedure_call("dbo.refresh", 0).sql, "EXEC dbo.refresh");
    }

    #[test]
    fn test_diagnose() {
        let dialect = MssqlDialect::new();
        assert_eq!(
            dialect.diagnose("Invalid column name 'Region'."),
            Some(LoadFault::MissingColumn("Region".into()))
        );
        let truncated = "String or binary data would be truncated in table 'Sales.dbo.Orders', column 'Notes'. Truncated value: 'abc'.";
        assert_eq!(
            dialect.diagnose(truncated),
            Some(LoadFault::ValueTooLong("Notes".into()))
        );
        assert_eq!(dialect.diagnose("Login failed for user 'sa'."), None);
    }

    #[test]
    fn test_columns_query_uses_canonical_aliases() {
        let sql = MssqlDialect::new().columns_query(None, Some("Orders"));
        assert!(sql.contains("AS [DATA_PRECISION]"));
        assert!(sql.contains("cols.table_schema = SCHEMA_NAME()"));
        assert!(sql.contains("UPPER('Orders')"));
    }
}
