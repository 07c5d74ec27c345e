//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy for MySQL
//! - [`MysqlSession`]: sqlx session

mod dialect;
mod session;

pub use dialect::MysqlDialect;
pub use session::MysqlSession;
