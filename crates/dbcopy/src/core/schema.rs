//! Column metadata as normalized from every dialect's catalog.

use serde::{Deserialize, Serialize};

/// Column canonical names, in the order every catalog query returns them.
pub const CANONICAL_COLUMNS: [&str; 9] = [
    "TABLE_NAME",
    "COLUMN_NAME",
    "DATA_TYPE",
    "DATA_LENGTH",
    "DATA_PRECISION",
    "DATA_SCALE",
    "NULLABLE",
    "PK",
    "INCREMENTAL",
];

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table: String,
    pub column: String,
    /// Type name exactly as the source catalog reports it.
    pub native_type: String,
    /// Character/byte length; `None` when the catalog reports none or an
    /// unbounded length (e.g. MSSQL's `-1`).
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
}

impl ColumnDescriptor {
    /// Minimal descriptor, mostly useful for tests and hand-built type maps.
    pub fn new(column: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            column: column.into(),
            native_type: native_type.into(),
            length: None,
            precision: None,
            scale: None,
            nullable: true,
            is_primary_key: false,
            is_identity: false,
        }
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_numeric(mut self, precision: Option<i64>, scale: Option<i64>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}
