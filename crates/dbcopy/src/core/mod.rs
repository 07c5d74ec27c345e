//! Core abstractions shared by every dialect.
//!
//! - [`traits`]: `Dialect`, `Connector`, `Session`, `RowCursor`
//! - [`value`]: the `Value` enum rows are made of
//! - [`batch`]: `RecordBatch`, the unit of fetch and load
//! - [`params`]: statement arguments and named-marker rewriting
//! - [`schema`]: `ColumnDescriptor` as normalized from catalogs

pub mod batch;
pub mod params;
pub mod schema;
pub mod traits;
pub mod value;

pub use batch::{Record, RecordBatch};
pub use params::Params;
pub use schema::{ColumnDescriptor, CANONICAL_COLUMNS};
pub use traits::{Connector, Dialect, LoadFault, ProcedureCall, RowCursor, Session};
pub use value::Value;
