//! Core traits for dialect-agnostic database access.
//!
//! - [`Dialect`]: SQL syntax and type vocabulary of one database engine
//! - [`Connector`]: opens a [`Session`] for a connection profile
//! - [`Session`]: one live connection with an open transaction
//! - [`RowCursor`]: a server-side result set fetched in bounded chunks
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` is selected once per factory and drives every
//!   dialect-specific statement
//! - **Abstract Factory**: `Connector` produces sessions without callers
//!   knowing the driver behind them

use async_trait::async_trait;

use crate::config::{ConnectionProfile, DbKind};
use crate::dialect::TypeFamily;
use crate::error::Result;

use super::batch::RecordBatch;
use super::value::Value;

/// A recognized destination-schema mismatch reported by a failed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFault {
    /// The destination table has no such column.
    MissingColumn(String),
    /// A value is longer than the destination column allows.
    ValueTooLong(String),
}

/// How a stored procedure is invoked in a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureCall {
    pub sql: String,
    /// Results come back as a row set (wrapped SELECT) rather than through
    /// output parameters.
    pub returns_rows: bool,
}

/// SQL dialect strategy for a database engine.
///
/// Table names are passed through as given (optionally `schema.table`);
/// column names are always quoted.
pub trait Dialect: Send + Sync {
    /// Which backend this dialect speaks for.
    fn kind(&self) -> DbKind;

    /// Get the dialect name.
    fn name(&self) -> &str {
        self.kind().label()
    }

    /// Quote an identifier for this dialect.
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Parameter placeholder for a 1-based position.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Escape a value embedded in a string literal.
    fn escape_literal(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    // ===== Catalog =====

    /// Base tables of a schema as (TABLE_SCHEMA, TABLE_NAME).
    fn tables_query(&self, schema: &str) -> String;

    /// One-column list of table names. With a schema, names come back
    /// schema-qualified (`SCHEMA.TABLE`) and limited to that schema.
    fn table_names_query(&self, schema: Option<&str>) -> String;

    /// Canonical nine-column metadata query (see [`CANONICAL_COLUMNS`]).
    ///
    /// [`CANONICAL_COLUMNS`]: crate::core::CANONICAL_COLUMNS
    fn columns_query(&self, schema: Option<&str>, table: Option<&str>) -> String;

    // ===== Type vocabulary =====

    /// Classify a native type name as reported by this dialect's catalog.
    fn family_of(&self, native_type: &str) -> TypeFamily;

    /// DDL type name this dialect uses for a family.
    fn type_name(&self, family: TypeFamily) -> &'static str;

    /// Types that never take a `(...)` qualifier.
    fn bare_types(&self) -> &'static [&'static str];

    /// Whether `VARCHAR(max)`-style unbounded qualifiers exist.
    fn supports_max_length(&self) -> bool {
        false
    }

    /// Type of the synthetic run-timestamp column.
    fn run_timestamp_type(&self) -> &'static str {
        "TIMESTAMP(6)"
    }

    /// Whether loads must carry native values instead of text.
    fn requires_native_types(&self) -> bool {
        false
    }

    // ===== Statements =====

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", table)
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        let placeholders: Vec<String> =
            (1..=param_count).map(|i| self.param_placeholder(i)).collect();
        ProcedureCall {
            sql: format!("CALL {}({})", name, placeholders.join(", ")),
            returns_rows: false,
        }
    }

    /// Bounded text type of `width` characters.
    fn text_type(&self, width: usize) -> String {
        format!("{}({})", self.type_name(TypeFamily::Varchar), width)
    }

    /// Add a text column of `width` characters.
    fn add_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        format!(
            "ALTER TABLE {} ADD {} VARCHAR({})",
            table,
            self.quote_ident(column),
            width
        )
    }

    /// Widen an existing text column to `width` characters.
    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String;

    // ===== Load errors =====

    /// Recognize a schema-mismatch error text.
    fn diagnose(&self, message: &str) -> Option<LoadFault>;
}

/// Opens live sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Session>>;
}

/// One live connection.
///
/// Statements run inside a transaction that is only made durable by
/// [`commit`](Session::commit). Values are already positional; named
/// markers are rewritten before they reach a session.
#[async_trait]
pub trait Session: Send {
    /// Run a statement, returning the affected row count when known.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run a query and read the whole result.
    ///
    /// `fetch_hint` is the number of rows requested per network round trip
    /// where the driver lets us choose.
    async fn query(&mut self, sql: &str, params: &[Value], fetch_hint: usize)
        -> Result<RecordBatch>;

    /// Run one statement for every row, as a prepared batch.
    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64>;

    /// Native bulk-copy path. `Ok(None)` means the dialect has none and the
    /// caller should fall back to [`execute_many`](Session::execute_many).
    async fn bulk_load(&mut self, _table: &str, _batch: &RecordBatch) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Turn this session into a cursor over `sql`. The cursor owns the
    /// connection from here on.
    async fn into_cursor(
        self: Box<Self>,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>>;
}

/// A result set read in bounded chunks.
///
/// Dropping a cursor releases its connection.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch up to `max_rows` rows. An empty batch means the result set is
    /// exhausted.
    async fn fetch(&mut self, max_rows: usize) -> Result<RecordBatch>;

    /// Close the result set and its connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;

    impl Dialect for Minimal {
        fn kind(&self) -> DbKind {
            DbKind::Db2
        }
        fn tables_query(&self, _schema: &str) -> String {
            String::new()
        }
        fn table_names_query(&self, _schema: Option<&str>) -> String {
            String::new()
        }
        fn columns_query(&self, _schema: Option<&str>, _table: Option<&str>) -> String {
            String::new()
        }
        fn family_of(&self, _native_type: &str) -> TypeFamily {
            TypeFamily::Other
        }
        fn type_name(&self, _family: TypeFamily) -> &'static str {
            "CLOB"
        }
        fn bare_types(&self) -> &'static [&'static str] {
            &[]
        }
        fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
            format!("ALTER TABLE {} ALTER {} {}", table, column, width)
        }
        fn diagnose(&self, _message: &str) -> Option<LoadFault> {
            None
        }
    }

    #[test]
    fn test_default_quote_doubles_embedded_quotes() {
        assert_eq!(Minimal.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_default_procedure_call() {
        let call = Minimal.procedure_call("refresh_stats", 2);
        assert_eq!(call.sql, "CALL refresh_stats(?, ?)");
        assert!(!call.returns_rows);
    }

    #[test]
    fn test_default_name_is_label() {
        assert_eq!(Minimal.name(), "DB2");
        assert_eq!(Minimal.truncate_sql("S.T"), "TRUNCATE TABLE S.T");
    }
}
