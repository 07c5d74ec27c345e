//! Catalog SQL shared by the `information_schema` dialects.

use crate::core::{Dialect, CANONICAL_COLUMNS};

/// How a dialect fills the parts of the canonical column query that
/// `information_schema` leaves engine-specific.
pub(crate) struct InformationSchema<'a> {
    /// Expression for the current schema when none is given.
    pub current_schema: &'a str,
    /// Expression yielding 1 for identity/auto-increment columns.
    pub identity_expr: &'a str,
    /// `CONCAT` or `||`-style join of schema and table name.
    pub qualified_name_expr: &'a str,
}

impl InformationSchema<'_> {
    fn schema_filter(&self, dialect: &dyn Dialect, schema: Option<&str>) -> String {
        match schema {
            Some(s) => format!("'{}'", dialect.escape_literal(s)),
            None => self.current_schema.to_string(),
        }
    }

    pub fn tables_query(&self, dialect: &dyn Dialect, schema: &str) -> String {
        format!(
            "SELECT t.table_schema AS {}, t.table_name AS {} \
             FROM information_schema.tables t \
             WHERE t.table_type = 'BASE TABLE' AND t.table_schema = '{}' \
             ORDER BY t.table_name",
            dialect.quote_ident("TABLE_SCHEMA"),
            dialect.quote_ident("TABLE_NAME"),
            dialect.escape_literal(schema)
        )
    }

    pub fn table_names_query(&self, dialect: &dyn Dialect, schema: Option<&str>) -> String {
        match schema {
            Some(s) => format!(
                "SELECT {} FROM information_schema.tables t WHERE t.table_schema = '{}'",
                self.qualified_name_expr,
                dialect.escape_literal(s)
            ),
            None => format!(
                "SELECT t.table_name FROM information_schema.tables t WHERE t.table_schema = {}",
                self.current_schema
            ),
        }
    }

    pub fn columns_query(
        &self,
        dialect: &dyn Dialect,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> String {
        let alias = |i: usize| dialect.quote_ident(CANONICAL_COLUMNS[i]);
        let mut sql = format!(
            "SELECT cols.table_name AS {}, \
             cols.column_name AS {}, \
             cols.data_type AS {}, \
             cols.character_maximum_length AS {}, \
             cols.numeric_precision AS {}, \
             cols.numeric_scale AS {}, \
             CASE WHEN cols.is_nullable = 'YES' THEN 1 ELSE 0 END AS {}, \
             CASE WHEN EXISTS (\
                SELECT 1 FROM information_schema.table_constraints tc \
                JOIN information_schema.key_column_usage kcu \
                  ON tc.constraint_name = kcu.constraint_name \
                 AND tc.table_schema = kcu.table_schema \
                 AND tc.table_name = kcu.table_name \
                WHERE tc.constraint_type = 'PRIMARY KEY' \
                  AND kcu.table_schema = cols.table_schema \
                  AND kcu.table_name = cols.table_name \
                  AND kcu.column_name = cols.column_name\
             ) THEN 1 ELSE 0 END AS {}, \
             {} AS {} \
             FROM information_schema.columns cols \
             WHERE cols.table_schema = {}",
            alias(0),
            alias(1),
            alias(2),
            alias(3),
            alias(4),
            alias(5),
            alias(6),
            alias(7),
            self.identity_expr,
            alias(8),
            self.schema_filter(dialect, schema)
        );
        if let Some(t) = table {
            sql.push_str(&format!(
                " AND UPPER(cols.table_name) = UPPER('{}')",
                dialect.escape_literal(t)
            ));
        }
        sql.push_str(" ORDER BY cols.table_name, cols.ordinal_position");
        sql
    }
}
