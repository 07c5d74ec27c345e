//! Utilities shared across database drivers.
//!
//! - [`catalog`]: `information_schema` queries in the canonical shape
//! - [`cursor`]: request/response cursor over a worker-owned connection
//! - `odbc`: ODBC sessions for Oracle, DB2 and Firebird (`odbc` feature)

pub(crate) mod catalog;
pub(crate) mod cursor;
#[cfg(feature = "odbc")]
pub(crate) mod odbc;
