//! # dbcopy
//!
//! Multi-dialect database access and cross-database table replication.
//!
//! One API over Oracle, SQL Server, DB2, MySQL, PostgreSQL and Firebird:
//!
//! - **Statements and queries** with commit-on-success, rollback-on-failure
//!   and a connection closed on every path
//! - **Chunked streaming** of large result sets in bounded memory
//! - **Catalog introspection** normalized to one column shape
//! - **Type translation** from one dialect's column types to another's DDL
//! - **Table replication** with optional create, truncate or filtered
//!   delete, and a run timestamp column
//! - **Self-healing loads** that add missing columns and widen narrow ones
//! - **Stored queries** read from SQL files with `{name}` parameters
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbcopy::{
//!     ConnectionConfigurator, Database, MapStore, ProfileFields, ReplicationJob,
//!     TableReplicator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MapStore::from_yaml(&std::fs::read_to_string("connections.yaml")?)?;
//!     let none = ProfileFields::default();
//!     let source = Database::new(ConnectionConfigurator::resolve(&store, "dwh", &none)?);
//!     let target = Database::new(ConnectionConfigurator::resolve(&store, "mart", &none)?);
//!
//!     let job = ReplicationJob::new("DWH.SALES", "dbo.SALES").append_timestamp(true);
//!     let report = TableReplicator::new(&source, &target).run(&job).await?;
//!     println!("Copied {} rows", report.rows);
//!     Ok(())
//! }
//! ```
//!
//! Oracle, DB2 and Firebird sessions need the `odbc` feature.

pub mod config;
pub mod core;
pub mod database;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod replicate;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{
    ConnectionConfigurator, ConnectionProfile, ConnectionStore, DbKind, EngineSettings, LogConfig,
    MapStore, ProfileFields,
};
pub use crate::core::{
    ColumnDescriptor, Connector, Dialect, Params, Record, RecordBatch, RowCursor, Session, Value,
};
pub use database::{infer_column_types, ChunkStream, Database};
pub use dialect::{LengthSpec, TypeFamily, TypeTranslator};
pub use drivers::DialectImpl;
pub use error::{CopyError, Result};
pub use replicate::{
    LoadReport, Repair, ReplicationJob, ReplicationReport, ResilientBulkLoader, TableReplicator,
};
