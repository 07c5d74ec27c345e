//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific SQL syntax for identifier quoting, catalog
//! queries, type names and parameter placeholders.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DbKind;
use crate::core::{Dialect, LoadFault};
use crate::dialect::TypeFamily;
use crate::drivers::common::catalog::InformationSchema;

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Unknown column '(?:[^'.]*\.)?([^'.]+)'").expect("valid unknown-column regex")
});

static TOO_LONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Data too long for column '([^']+)'").expect("valid data-too-long regex")
});

const BARE_TYPES: &[&str] = &[
    "DATE",
    "FLOAT",
    "DOUBLE",
    "TINYINT",
    "TINYINT UNSIGNED",
    "SMALLINT",
    "MEDIUMINT",
    "INT",
    "BIGINT",
    "YEAR",
    "TIME",
    "DATETIME",
    "TIMESTAMP",
    "TINYTEXT",
    "TEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "TINYBLOB",
    "BLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "JSON",
];

const CATALOG: InformationSchema<'static> = InformationSchema {
    current_schema: "DATABASE()",
    identity_expr: "CASE WHEN cols.extra LIKE '%auto_increment%' THEN 1 ELSE 0 END",
    qualified_name_expr: "CONCAT(t.table_schema, '.', t.table_name)",
};

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DbKind {
        DbKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> String {
        // MySQL uses backticks; embedded backticks are doubled
        format!("`{}`", name.replace('`', "``"))
    }

    fn escape_literal(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "''")
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
        let lower = native_type.trim().to_lowercase();
        let base = lower.split(['(', ' ']).next().unwrap_or("");
        match base {
            "bit" | "bool" | "boolean" => TypeFamily::Boolean,
            "tinyint" => TypeFamily::TinyInt,
            "smallint" | "year" => TypeFamily::SmallInt,
            "mediumint" | "int" | "integer" => TypeFamily::Integer,
            "bigint" => TypeFamily::BigInt,
            "decimal" | "numeric" => TypeFamily::Decimal,
            "float" => TypeFamily::Real,
            "double" | "real" => TypeFamily::Double,
            "char" => TypeFamily::Char,
            "varchar" => TypeFamily::Varchar,
            "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" | "json" => {
                TypeFamily::Text
            }
            "date" => TypeFamily::Date,
            "time" => TypeFamily::Time,
            "datetime" | "timestamp" => TypeFamily::Timestamp,
            "binary" | "varbinary" => TypeFamily::Binary,
            "tinyblob" | "blob" | "mediumblob" | "longblob" => TypeFamily::Blob,
            _ => TypeFamily::Other,
        }
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        match family {
            TypeFamily::Boolean => "TINYINT(1)",
            TypeFamily::TinyInt => "TINYINT",
            TypeFamily::SmallInt => "SMALLINT",
            TypeFamily::Integer => "INT",
            TypeFamily::BigInt => "BIGINT",
            TypeFamily::Decimal => "DECIMAL",
            TypeFamily::Real => "FLOAT",
            TypeFamily::Double => "DOUBLE",
            TypeFamily::Char => "CHAR",
            TypeFamily::Varchar => "VARCHAR",
            TypeFamily::Text | TypeFamily::Other => "LONGTEXT",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
            TypeFamily::Timestamp | TypeFamily::TimestampTz => "DATETIME(6)",
            TypeFamily::Binary => "VARBINARY",
            TypeFamily::Blob => "LONGBLOB",
            TypeFamily::Uuid => "CHAR(36)",
        }
    }

    fn bare_types(&self) -> &'static [&'static str] {
        BARE_TYPES
    }

    fn run_timestamp_type(&self) -> &'static str {
        "DATETIME(6)"
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
            "ALTER TABLE {} MODIFY COLUMN {} VARCHAR({})",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("name"), "`name`");
        assert_eq!(dialect.quote_ident("table`name"), "`table``name`");
    }

    #[test]
    fn test_param_placeholder() {
        assert_eq!(MysqlDialect::new().param_placeholder(3), "?");
    }

    #[test]
    fn test_family_of_strips_display_width() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.family_of("int(11)"), TypeFamily::Integer);
        assert_eq!(dialect.family_of("tinyint unsigned"), TypeFamily::TinyInt);
        assert_eq!(dialect.family_of("longtext"), TypeFamily::Text);
    }

    #[test]
    fn test_diagnose() {
        let dialect = MysqlDialect::new();
        assert_eq!(
            dialect.diagnose("Unknown column 'region' in 'field list'"),
            Some(LoadFault::MissingColumn("region".into()))
        );
        assert_eq!(
            dialect.diagnose("Unknown column 'o.region' in 'where clause'"),
            Some(LoadFault::MissingColumn("region".into()))
        );
        assert_eq!(
            dialect.diagnose("Data too long for column 'notes' at row 1"),
            Some(LoadFault::ValueTooLong("notes".into()))
        );
    }

    #[test]
    fn test_repair_statements() {
        let dialect = MysqlDialect::new();
        assert_eq!(
            dialect.widen_text_column_sql("orders", "notes", 340),
            "ALTER TABLE orders MODIFY COLUMN `notes` VARCHAR(340)"
        );
    }
}
