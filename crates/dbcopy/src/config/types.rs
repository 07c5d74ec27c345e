//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DbKind {
    Oracle,
    Mssql,
    Db2,
    Mysql,
    Postgres,
    Firebird,
}

impl DbKind {
    /// All dialects, in a stable order.
    pub const ALL: [DbKind; 6] = [
        DbKind::Oracle,
        DbKind::Mssql,
        DbKind::Db2,
        DbKind::Mysql,
        DbKind::Postgres,
        DbKind::Firebird,
    ];

    /// Well-known listener port used when a profile leaves it unset.
    pub fn default_port(self) -> u16 {
        match self {
            DbKind::Oracle => 1521,
            DbKind::Mssql => 1422,
            DbKind::Db2 => 50001,
            DbKind::Mysql => 3306,
            DbKind::Postgres => 5432,
            DbKind::Firebird => 3050,
        }
    }

    /// Label used in connection stores.
    pub fn label(self) -> &'static str {
        match self {
            DbKind::Oracle => "Oracle",
            DbKind::Mssql => "Microsoft",
            DbKind::Db2 => "DB2",
            DbKind::Mysql => "MySQL",
            DbKind::Postgres => "PostgreSQL",
            DbKind::Firebird => "Firebird",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DbKind {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "oracle" | "ora" => Ok(DbKind::Oracle),
            "microsoft" | "mssql" | "sqlserver" | "sql_server" => Ok(DbKind::Mssql),
            "db2" | "ibm_db2" => Ok(DbKind::Db2),
            "mysql" | "mariadb" => Ok(DbKind::Mysql),
            "postgresql" | "postgres" | "pg" => Ok(DbKind::Postgres),
            "firebird" | "fdb" => Ok(DbKind::Firebird),
            other => Err(CopyError::Config(format!(
                "Unknown database type: '{}'. Supported types: Oracle, Microsoft, DB2, MySQL, PostgreSQL, Firebird",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DbKind {
    type Error = CopyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DbKind> for String {
    fn from(kind: DbKind) -> Self {
        kind.label().to_string()
    }
}

/// Raw connection fields as held by a store or given as overrides.
///
/// Every field is optional; merging happens in
/// [`ConnectionConfigurator`](super::ConnectionConfigurator).
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, alias = "type")]
    pub kind: Option<DbKind>,

    #[serde(default, alias = "username")]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default, alias = "server")]
    pub host: Option<String>,

    /// Database name, or service name for Oracle.
    #[serde(default, alias = "service_name")]
    pub database: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// ODBC driver name for dialects reached through ODBC.
    #[serde(default)]
    pub driver: Option<String>,
}

impl ProfileFields {
    /// Overlay `other` onto `self`: any value present in `other` wins.
    pub fn overlay(mut self, other: &ProfileFields) -> Self {
        if other.kind.is_some() {
            self.kind = other.kind;
        }
        if other.user.is_some() {
            self.user.clone_from(&other.user);
        }
        if other.password.is_some() {
            self.password.clone_from(&other.password);
        }
        if other.host.is_some() {
            self.host.clone_from(&other.host);
        }
        if other.database.is_some() {
            self.database.clone_from(&other.database);
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.driver.is_some() {
            self.driver.clone_from(&other.driver);
        }
        self
    }
}

impl fmt::Debug for ProfileFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileFields")
            .field("kind", &self.kind)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("driver", &self.driver)
            .finish()
    }
}

/// A resolved connection profile.
///
/// Resolution is tolerant: fields may still be missing here and are only
/// required when a connector asks for them.
#[derive(Clone, PartialEq)]
pub struct ConnectionProfile {
    pub kind: DbKind,
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub driver: Option<String>,
}

impl ConnectionProfile {
    /// Profile for `kind` with the dialect's default port and nothing else.
    pub fn new(kind: DbKind) -> Self {
        Self {
            kind,
            host: None,
            port: kind.default_port(),
            user: None,
            password: None,
            database: None,
            driver: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Host, or a configuration error naming the missing field.
    pub fn require_host(&self) -> Result<&str> {
        self.require(&self.host, "host")
    }

    pub fn require_user(&self) -> Result<&str> {
        self.require(&self.user, "user")
    }

    /// Password; an absent password is treated as empty.
    pub fn password_or_empty(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    pub fn require_database(&self) -> Result<&str> {
        self.require(&self.database, "database")
    }

    fn require<'a>(&self, value: &'a Option<String>, field: &str) -> Result<&'a str> {
        value.as_deref().filter(|v| !v.is_empty()).ok_or_else(|| {
            CopyError::Config(format!(
                "{} connection profile has no {}",
                self.kind, field
            ))
        })
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Logging destination and level, applied by [`crate::logging::init`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log file; stderr when unset.
    #[serde(default)]
    pub path: Option<std::path::PathBuf>,

    /// Filter directive (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: default_log_level(),
        }
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Rows per replication chunk (default: 100000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Fetch-size hint for full result reads (default: 100000).
    #[serde(default = "default_fetch_hint")]
    pub fetch_hint: usize,

    /// Attempts made by the self-healing loader (default: 10).
    #[serde(default = "default_max_load_attempts")]
    pub max_load_attempts: usize,

    /// Width of text columns added by schema repair (default: 300).
    #[serde(default = "default_repair_text_width")]
    pub repair_text_width: usize,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            fetch_hint: default_fetch_hint(),
            max_load_attempts: default_max_load_attempts(),
            repair_text_width: default_repair_text_width(),
            log: LogConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    100_000
}

fn default_fetch_hint() -> usize {
    100_000
}

fn default_max_load_attempts() -> usize {
    10
}

fn default_repair_text_width() -> usize {
    300
}
