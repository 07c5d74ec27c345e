//! Oracle driver.
//!
//! Sessions go through [`common::odbc`](super::common) when the `odbc`
//! feature is enabled.

mod dialect;

pub use dialect::OracleDialect;
