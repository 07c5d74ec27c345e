//! Database driver implementations.
//!
//! Each driver module provides:
//! - a `Dialect`: SQL syntax and type vocabulary for the engine
//! - a live session (`Connector`/`Session`/`RowCursor`) where a native
//!   Rust client exists
//!
//! - [`mssql`]: Microsoft SQL Server via tiberius
//! - [`postgres`]: PostgreSQL via tokio-postgres
//! - [`mysql`]: MySQL/MariaDB via sqlx
//! - [`oracle`], [`db2`], [`firebird`]: through ODBC (`odbc` feature)
//! - [`common`]: catalog SQL and cursor plumbing shared by the drivers
//!
//! # Dispatch
//!
//! [`DialectImpl`] is the enum selected once per [`Database`](crate::Database)
//! and matched on for every dialect call.

use async_trait::async_trait;

pub mod common;
pub mod db2;
pub mod firebird;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;

pub use db2::Db2Dialect;
pub use firebird::FirebirdDialect;
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

use crate::config::{ConnectionProfile, DbKind};
use crate::core::{Connector, Dialect, LoadFault, ProcedureCall, Session};
use crate::dialect::TypeFamily;
use crate::error::Result;

/// Enum-based static dispatch for dialects.
///
/// Note: manual impl; every variant delegates to its strategy.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Oracle(OracleDialect),
    Mssql(MssqlDialect),
    Db2(Db2Dialect),
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    Firebird(FirebirdDialect),
}

macro_rules! delegate {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Oracle($d) => $call,
            DialectImpl::Mssql($d) => $call,
            DialectImpl::Db2($d) => $call,
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Postgres($d) => $call,
            DialectImpl::Firebird($d) => $call,
        }
    };
}

impl DialectImpl {
    /// The dialect strategy for a backend.
    pub fn for_kind(kind: DbKind) -> Self {
        match kind {
            DbKind::Oracle => DialectImpl::Oracle(OracleDialect::new()),
            DbKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
            DbKind::Db2 => DialectImpl::Db2(Db2Dialect::new()),
            DbKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DbKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            DbKind::Firebird => DialectImpl::Firebird(FirebirdDialect::new()),
        }
    }

    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(Self::for_kind(db_type.parse()?))
    }
}

impl Dialect for DialectImpl {
    fn kind(&self) -> DbKind {
        delegate!(self, d => d.kind())
    }

    fn name(&self) -> &str {
        delegate!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        delegate!(self, d => d.quote_ident(name))
    }

    fn param_placeholder(&self, index: usize) -> String {
        delegate!(self, d => d.param_placeholder(index))
    }

    fn escape_literal(&self, value: &str) -> String {
        delegate!(self, d => d.escape_literal(value))
    }

    fn tables_query(&self, schema: &str) -> String {
        delegate!(self, d => d.tables_query(schema))
    }

    fn table_names_query(&self, schema: Option<&str>) -> String {
        delegate!(self, d => d.table_names_query(schema))
    }

    fn columns_query(&self, schema: Option<&str>, table: Option<&str>) -> String {
        delegate!(self, d => d.columns_query(schema, table))
    }

    fn family_of(&self, native_type: &str) -> TypeFamily {
        delegate!(self, d => d.family_of(native_type))
    }

    fn type_name(&self, family: TypeFamily) -> &'static str {
        delegate!(self, d => d.type_name(family))
    }

    fn bare_types(&self) -> &'static [&'static str] {
        delegate!(self, d => d.bare_types())
    }

    fn supports_max_length(&self) -> bool {
        delegate!(self, d => d.supports_max_length())
    }

    fn run_timestamp_type(&self) -> &'static str {
        delegate!(self, d => d.run_timestamp_type())
    }

    fn requires_native_types(&self) -> bool {
        delegate!(self, d => d.requires_native_types())
    }

    fn truncate_sql(&self, table: &str) -> String {
        delegate!(self, d => d.truncate_sql(table))
    }

    fn procedure_call(&self, name: &str, param_count: usize) -> ProcedureCall {
        delegate!(self, d => d.procedure_call(name, param_count))
    }

    fn text_type(&self, width: usize) -> String {
        delegate!(self, d => d.text_type(width))
    }

    fn add_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        delegate!(self, d => d.add_text_column_sql(table, column, width))
    }

    fn widen_text_column_sql(&self, table: &str, column: &str, width: usize) -> String {
        delegate!(self, d => d.widen_text_column_sql(table, column, width))
    }

    fn diagnose(&self, message: &str) -> Option<LoadFault> {
        delegate!(self, d => d.diagnose(message))
    }
}

/// Connector backed by the native client of each dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Session>> {
        match profile.kind {
            DbKind::Postgres => Ok(Box::new(postgres::PgSession::connect(profile).await?)),
            DbKind::Mysql => Ok(Box::new(mysql::MysqlSession::connect(profile).await?)),
            DbKind::Mssql => Ok(Box::new(mssql::MssqlSession::connect(profile).await?)),
            DbKind::Oracle | DbKind::Db2 | DbKind::Firebird => connect_odbc(profile).await,
        }
    }
}

#[cfg(feature = "odbc")]
async fn connect_odbc(profile: &ConnectionProfile) -> Result<Box<dyn Session>> {
    Ok(Box::new(common::odbc::OdbcSession::connect(profile).await?))
}

#[cfg(not(feature = "odbc"))]
async fn connect_odbc(profile: &ConnectionProfile) -> Result<Box<dyn Session>> {
    Err(crate::error::CopyError::Config(format!(
        "{} connections need the `odbc` feature",
        profile.kind
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        let mssql = DialectImpl::from_db_type("mssql").unwrap();
        assert_eq!(mssql.name(), "Microsoft");

        let postgres = DialectImpl::from_db_type("PostgreSQL").unwrap();
        assert_eq!(postgres.kind(), DbKind::Postgres);

        assert!(DialectImpl::from_db_type("sqlserver").is_ok());
        assert!(DialectImpl::from_db_type("DB2").is_ok());
        assert!(DialectImpl::from_db_type("unknown").is_err());
    }

    #[test]
    fn test_for_kind_round_trips_every_dialect() {
        for kind in DbKind::ALL {
            assert_eq!(DialectImpl::for_kind(kind).kind(), kind);
        }
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::for_kind(DbKind::Mssql);
        assert_eq!(dialect.quote_ident("table"), "[table]");
        assert_eq!(dialect.param_placeholder(1), "@P1");

        let dialect = DialectImpl::for_kind(DbKind::Mysql);
        assert_eq!(dialect.quote_ident("table"), "`table`");
        assert_eq!(dialect.param_placeholder(1), "?");
    }

    #[cfg(not(feature = "odbc"))]
    #[tokio::test]
    async fn test_odbc_dialects_need_feature() {
        let err = NativeConnector
            .connect(&ConnectionProfile::new(DbKind::Oracle))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("odbc"));
    }
}
