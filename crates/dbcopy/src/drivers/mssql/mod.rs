//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlSession`]: tiberius session with TDS bulk insert

mod dialect;
mod session;

pub use dialect::MssqlDialect;
pub use session::MssqlSession;
