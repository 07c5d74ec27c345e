//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgSession`]: tokio-postgres session with `COPY` bulk load

mod dialect;
mod session;

pub use dialect::PostgresDialect;
pub use session::PgSession;
