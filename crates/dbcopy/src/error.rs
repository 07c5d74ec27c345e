//! Error types for the access and replication library.

use thiserror::Error;

use crate::config::DbKind;

/// Main error type for database access and replication.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (unknown dialect, missing connection fields, bad YAML shape)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening or keeping a connection failed
    #[error("Connection error ({kind}): {message}")]
    Connection { kind: DbKind, message: String },

    /// A statement was rejected by the server or failed mid-flight
    #[error("Query error: {0}")]
    Query(String),

    /// Destination schema does not accept the loaded record
    #[error("Schema mismatch on {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    /// A text value could not be coerced back to its native type
    #[error("Type conversion failed for column {column}: {message}")]
    TypeConversion { column: String, message: String },

    /// Bulk load of a batch failed
    #[error("Bulk load failed for table {table}: {message}")]
    BulkLoad { table: String, message: String },

    /// The self-healing loader gave up
    #[error("Could not upload to {table} after {attempts} attempts")]
    ExhaustedRetry {
        table: String,
        attempts: usize,
        #[source]
        last: Box<CopyError>,
    },

    /// Destination table could not be created; never retried
    #[error("Failed to create table {table}")]
    TableCreation {
        table: String,
        #[source]
        source: Box<CopyError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CopyError {
    /// Create a Connection error for a dialect
    pub fn connection(kind: DbKind, message: impl std::fmt::Display) -> Self {
        CopyError::Connection {
            kind,
            message: message.to_string(),
        }
    }

    /// Create a Query error
    pub fn query(message: impl std::fmt::Display) -> Self {
        CopyError::Query(message.to_string())
    }

    /// Create a BulkLoad error
    pub fn bulk_load(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::BulkLoad {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a TypeConversion error
    pub fn conversion(column: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::TypeConversion {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// Text the server reported, used to diagnose load failures.
    ///
    /// Wrapping variants delegate to the error they wrap so that the
    /// original server message is what gets matched.
    pub fn server_message(&self) -> String {
        match self {
            CopyError::Query(message) => message.clone(),
            CopyError::Connection { message, .. }
            | CopyError::SchemaMismatch { message, .. }
            | CopyError::BulkLoad { message, .. } => message.clone(),
            CopyError::ExhaustedRetry { last, .. } => last.server_message(),
            CopyError::TableCreation { source, .. } => source.server_message(),
            other => other.to_string(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for access and replication operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_retry_names_table_and_attempts() {
        let err = CopyError::ExhaustedRetry {
            table: "SALES".into(),
            attempts: 10,
            last: Box::new(CopyError::query("ORA-01017")),
        };
        assert_eq!(err.to_string(), "Could not upload to SALES after 10 attempts");
        assert_eq!(err.server_message(), "ORA-01017");
    }

    #[test]
    fn test_format_detailed_walks_chain() {
        let err = CopyError::TableCreation {
            table: "T1".into(),
            source: Box::new(CopyError::query("permission denied")),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Failed to create table T1"));
        assert!(detailed.contains("1: Query error: permission denied"));
    }

    #[test]
    fn test_connection_error_display() {
        let err = CopyError::connection(DbKind::Postgres, "refused");
        assert_eq!(err.to_string(), "Connection error (PostgreSQL): refused");
    }
}
