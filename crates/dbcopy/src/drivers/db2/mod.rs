//! IBM DB2 driver (ODBC sessions).

mod dialect;

pub use dialect::Db2Dialect;
