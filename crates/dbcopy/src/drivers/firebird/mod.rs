//! Firebird driver (ODBC sessions).

mod dialect;

pub use dialect::FirebirdDialect;
