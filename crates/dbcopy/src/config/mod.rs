//! Connection profile resolution and engine settings.

mod types;

pub use types::*;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{CopyError, Result};

/// Keyed source of raw connection fields.
///
/// The store is an external collaborator: credentials usually live in a file
/// or secret manager the host application reads.
pub trait ConnectionStore: Send + Sync {
    /// Raw fields stored under `key`, if any.
    fn lookup(&self, key: &str) -> Option<ProfileFields>;

    /// Port to use for `kind` when a profile leaves it unset.
    fn default_port(&self, kind: DbKind) -> Option<u16> {
        Some(kind.default_port())
    }
}

/// In-memory connection store.
#[derive(Debug, Clone, Default)]
pub struct MapStore {
    profiles: HashMap<String, ProfileFields>,
    ports: HashMap<DbKind, u16>,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a keyed YAML document of profiles.
    ///
    /// ```yaml
    /// warehouse:
    ///   kind: Oracle
    ///   host: ora.internal
    ///   user: etl
    ///   password: secret
    ///   service_name: DWH
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let profiles: HashMap<String, ProfileFields> = serde_yaml::from_str(yaml)?;
        Ok(Self {
            profiles,
            ports: HashMap::new(),
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, fields: ProfileFields) -> &mut Self {
        self.profiles.insert(key.into(), fields);
        self
    }

    /// Override the default port for a dialect.
    pub fn set_default_port(&mut self, kind: DbKind, port: u16) -> &mut Self {
        self.ports.insert(kind, port);
        self
    }
}

impl ConnectionStore for MapStore {
    fn lookup(&self, key: &str) -> Option<ProfileFields> {
        self.profiles.get(key).cloned()
    }

    fn default_port(&self, kind: DbKind) -> Option<u16> {
        Some(
            self.ports
                .get(&kind)
                .copied()
                .unwrap_or_else(|| kind.default_port()),
        )
    }
}

/// Resolves connection profiles from a store plus explicit overrides.
pub struct ConnectionConfigurator;

impl ConnectionConfigurator {
    /// Resolve the profile stored under `key`.
    ///
    /// Explicit `overrides` take precedence; stored values fill the rest.
    /// A missing port is filled from the store's (or the dialect's) default.
    /// Other missing fields are left empty and only fail at connect time.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::Config`] only when no dialect can be determined,
    /// since nothing downstream can be selected without one.
    pub fn resolve(
        store: &dyn ConnectionStore,
        key: &str,
        overrides: &ProfileFields,
    ) -> Result<ConnectionProfile> {
        let stored = store.lookup(key).unwrap_or_default();
        let merged = stored.overlay(overrides);
        debug!("Resolved connection fields for '{}': {:?}", key, merged);

        let kind = merged.kind.ok_or_else(|| {
            CopyError::Config(format!("connection '{}' has no database type", key))
        })?;
        let port = merged
            .port
            .or_else(|| store.default_port(kind))
            .unwrap_or_else(|| kind.default_port());

        Ok(ConnectionProfile {
            kind,
            host: merged.host,
            port,
            user: merged.user,
            password: merged.password,
            database: merged.database,
            driver: merged.driver,
        })
    }
}

impl EngineSettings {
    /// Load settings from a YAML file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: EngineSettings = serde_yaml::from_str(yaml)?;
        if settings.chunk_size == 0 {
            return Err(CopyError::Config("chunk_size must be at least 1".into()));
        }
        if settings.max_load_attempts == 0 {
            return Err(CopyError::Config(
                "max_load_attempts must be at least 1".into(),
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"
warehouse:
  kind: Oracle
  host: ora.internal
  user: etl
  password: secret
  service_name: DWH
reporting:
  type: Microsoft
  host: sql01
  port: 1433
  user: report
  password: hunter2
  database: Sales
"#;

    #[test]
    fn test_absent_port_resolves_to_dialect_default() {
        let expected = [
            (DbKind::Oracle, 1521),
            (DbKind::Postgres, 5432),
            (DbKind::Mysql, 3306),
            (DbKind::Mssql, 1422),
            (DbKind::Db2, 50001),
            (DbKind::Firebird, 3050),
        ];
        for (kind, port) in expected {
            let mut store = MapStore::new();
            store.insert(
                "db",
                ProfileFields {
                    kind: Some(kind),
                    host: Some("localhost".into()),
                    ..Default::default()
                },
            );
            let profile =
                ConnectionConfigurator::resolve(&store, "db", &ProfileFields::default()).unwrap();
            assert_eq!(profile.port, port, "default port for {}", kind);
        }
    }

    #[test]
    fn test_store_from_yaml_reads_labels_and_aliases() {
        let store = MapStore::from_yaml(STORE).unwrap();
        let ora = store.lookup("warehouse").unwrap();
        assert_eq!(ora.kind, Some(DbKind::Oracle));
        assert_eq!(ora.database.as_deref(), Some("DWH"));

        let ms = store.lookup("reporting").unwrap();
        assert_eq!(ms.kind, Some(DbKind::Mssql));
        assert_eq!(ms.port, Some(1433));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let store = MapStore::from_yaml(STORE).unwrap();
        let overrides = ProfileFields {
            host: Some("ora-standby.internal".into()),
            port: Some(1600),
            ..Default::default()
        };
        let profile = ConnectionConfigurator::resolve(&store, "warehouse", &overrides).unwrap();
        assert_eq!(profile.host.as_deref(), Some("ora-standby.internal"));
        assert_eq!(profile.port, 1600);
        assert_eq!(profile.user.as_deref(), Some("etl"));
    }

    #[test]
    fn test_resolution_is_tolerant_of_missing_fields() {
        let store = MapStore::new();
        let overrides = ProfileFields {
            kind: Some(DbKind::Postgres),
            ..Default::default()
        };
        let profile = ConnectionConfigurator::resolve(&store, "unknown", &overrides).unwrap();
        assert_eq!(profile.port, 5432);
        assert!(profile.host.is_none());
        assert!(matches!(profile.require_host(), Err(CopyError::Config(_))));
    }

    #[test]
    fn test_store_default_port_override() {
        let mut store = MapStore::new();
        store
            .insert(
                "ms",
                ProfileFields {
                    kind: Some(DbKind::Mssql),
                    ..Default::default()
                },
            )
            .set_default_port(DbKind::Mssql, 1433);
        let profile =
            ConnectionConfigurator::resolve(&store, "ms", &ProfileFields::default()).unwrap();
        assert_eq!(profile.port, 1433);
    }

    #[test]
    fn test_missing_kind_is_config_error() {
        let store = MapStore::new();
        let err = ConnectionConfigurator::resolve(&store, "nothing", &ProfileFields::default())
            .unwrap_err();
        assert!(matches!(err, CopyError::Config(_)));
    }

    #[test]
    fn test_profile_debug_redacts_password() {
        let profile = ConnectionProfile::new(DbKind::Mysql)
            .with_host("db")
            .with_credentials("root", "super_secret_password_123");
        let debug_output = format!("{:?}", profile);
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_kind_parses_labels() {
        assert_eq!("Microsoft".parse::<DbKind>().unwrap(), DbKind::Mssql);
        assert_eq!("PostgreSQL".parse::<DbKind>().unwrap(), DbKind::Postgres);
        assert_eq!("db2".parse::<DbKind>().unwrap(), DbKind::Db2);
        assert!("sybase".parse::<DbKind>().is_err());
    }

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::from_yaml("chunk_size: 5000\n").unwrap();
        assert_eq!(settings.chunk_size, 5000);
        assert_eq!(settings.fetch_hint, 100_000);
        assert_eq!(settings.max_load_attempts, 10);
        assert_eq!(settings.repair_text_width, 300);
        assert_eq!(settings.log.level, "info");
        assert!(EngineSettings::from_yaml("chunk_size: 0\n").is_err());
    }
}
