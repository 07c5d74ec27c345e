//! Connection factory: one uniform operation set over every dialect.
//!
//! Each operation opens exactly one session, runs, commits on success and
//! closes. On failure the session is rolled back and closed and the
//! original error is returned unchanged.

mod files;
mod infer;
mod introspect;
mod stream;

pub use infer::infer_column_types;
pub use stream::ChunkStream;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ConnectionProfile, DbKind, EngineSettings};
use crate::core::{Connector, Dialect, Params, RecordBatch, Session, Value};
use crate::drivers::{DialectImpl, NativeConnector};
use crate::error::{CopyError, Result};

/// A database reachable through one connection profile.
#[derive(Clone)]
pub struct Database {
    profile: ConnectionProfile,
    dialect: DialectImpl,
    connector: Arc<dyn Connector>,
    settings: EngineSettings,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("profile", &self.profile)
            .field("dialect", &self.dialect.name())
            .finish()
    }
}

impl Database {
    /// Database using the built-in driver for the profile's dialect.
    pub fn new(profile: ConnectionProfile) -> Self {
        Self::with_connector(profile, Arc::new(NativeConnector))
    }

    /// Database whose sessions come from `connector`.
    pub fn with_connector(profile: ConnectionProfile, connector: Arc<dyn Connector>) -> Self {
        let dialect = DialectImpl::for_kind(profile.kind);
        Self {
            profile,
            dialect,
            connector,
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn kind(&self) -> DbKind {
        self.profile.kind
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    async fn open(&self) -> Result<Box<dyn Session>> {
        self.connector.connect(&self.profile).await
    }

    fn bind(&self, sql: &str, params: &Params) -> Result<(String, Vec<Value>)> {
        params.bind(sql, |i| self.dialect.param_placeholder(i))
    }

    /// Commit and close on success; roll back and close on failure.
    async fn finish<T>(&self, mut session: Box<dyn Session>, result: Result<T>) -> Result<T> {
        let result = match result {
            Ok(value) => session.commit().await.map(|_| value),
            Err(e) => Err(e),
        };
        if result.is_err() {
            if let Err(e) = session.rollback().await {
                warn!("Rollback on {} failed: {}", self.kind(), e);
            }
        }
        if let Err(e) = session.close().await {
            warn!("Closing {} connection failed: {}", self.kind(), e);
        }
        result
    }

    /// Run a statement and commit.
    pub async fn execute(&self, sql: &str, params: Params) -> Result<u64> {
        let (sql, values) = self.bind(sql, &params)?;
        let mut session = self.open().await?;
        let result = session.execute(&sql, &values).await;
        self.finish(session, result).await
    }

    /// Run a query and return every row.
    pub async fn get(&self, sql: &str, params: Params) -> Result<RecordBatch> {
        let (sql, values) = self.bind(sql, &params)?;
        let mut session = self.open().await?;
        let result = session
            .query(&sql, &values, self.settings.fetch_hint)
            .await;
        self.finish(session, result).await
    }

    /// Run a statement and commit, returning its rows if it produced any
    /// (e.g. `INSERT ... RETURNING`).
    pub async fn insert_one(&self, sql: &str, params: Params) -> Result<Option<RecordBatch>> {
        let (sql, values) = self.bind(sql, &params)?;
        let mut session = self.open().await?;
        let result = session.query(&sql, &values, 1).await;
        let batch = self.finish(session, result).await?;
        Ok((!batch.columns().is_empty()).then_some(batch))
    }

    /// Run one statement per row as a prepared batch, in one transaction.
    pub async fn execute_many(&self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let mut session = self.open().await?;
        let result = session.execute_many(sql, rows).await;
        self.finish(session, result).await
    }

    /// Call a stored procedure and commit.
    ///
    /// Dialects that call procedures through a wrapped `SELECT` return the
    /// first scalar of the result; the others return `None`.
    pub async fn call_stored_procedure(&self, name: &str, params: &[Value]) -> Result<Option<Value>> {
        let call = self.dialect.procedure_call(name, params.len());
        debug!("Calling procedure: {}", call.sql);
        let mut session = self.open().await?;
        let result = if call.returns_rows {
            session
                .query(&call.sql, params, 1)
                .await
                .map(|batch| batch.scalar().cloned())
        } else {
            session.execute(&call.sql, params).await.map(|_| None)
        };
        self.finish(session, result).await
    }

    /// Remove rows: `DELETE ... WHERE filter` when given, else truncate.
    pub async fn delete_rows(&self, table: &str, filter: Option<&str>) -> Result<u64> {
        let sql = match filter {
            Some(filter) => format!("DELETE FROM {} WHERE {}", table, filter),
            None => self.dialect.truncate_sql(table),
        };
        let affected = self.execute(&sql, Params::None).await?;
        match filter {
            Some(filter) => info!("Deleted rows from {} where {}", table, filter),
            None => info!("Truncated {}", table),
        }
        Ok(affected)
    }

    /// Build the `CREATE TABLE` statement for an ordered column→type map.
    ///
    /// With `subset`, only those columns (matched case-insensitively) are
    /// created.
    pub fn create_table_sql(
        &self,
        table: &str,
        type_map: &[(String, String)],
        subset: Option<&[String]>,
    ) -> String {
        let columns: Vec<String> = type_map
            .iter()
            .filter(|(name, _)| {
                subset.map_or(true, |s| s.iter().any(|c| c.eq_ignore_ascii_case(name)))
            })
            .map(|(name, ty)| format!("{} {}", self.dialect.quote_ident(name), ty))
            .collect();
        format!("CREATE TABLE {} (\n    {}\n)", table, columns.join(",\n    "))
    }

    /// Create a table. Failure is terminal and reported as
    /// [`CopyError::TableCreation`].
    pub async fn create_table(
        &self,
        table: &str,
        type_map: &[(String, String)],
        subset: Option<&[String]>,
    ) -> Result<()> {
        let sql = self.create_table_sql(table, type_map, subset);
        debug!("Creating table: {}", sql);
        match self.execute(&sql, Params::None).await {
            Ok(_) => {
                info!("Created table {}", table);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create table {}: {}", table, e);
                Err(CopyError::TableCreation {
                    table: table.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// `INSERT` with one placeholder per batch column.
    pub fn insert_sql(&self, table: &str, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.dialect.quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len())
            .map(|i| self.dialect.param_placeholder(i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        )
    }

    /// Load a batch with the dialect's fastest path and commit.
    ///
    /// Native bulk copy where the session has one, else a prepared
    /// `INSERT` executed for every row.
    pub async fn upload_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut session = self.open().await?;
        let result = match session.bulk_load(table, batch).await {
            Ok(Some(n)) => Ok(n),
            Ok(None) => {
                let sql = self.insert_sql(table, batch.columns());
                session.execute_many(&sql, batch.rows()).await
            }
            Err(e) => Err(e),
        };
        self.finish(session, result).await
    }

    /// Stream a query in chunks of at most `chunk_size` rows.
    ///
    /// The stream owns one connection until it is exhausted, closed, or
    /// dropped.
    pub async fn stream(&self, sql: &str, params: Params, chunk_size: usize) -> Result<ChunkStream> {
        let (sql, values) = self.bind(sql, &params)?;
        let chunk_size = chunk_size.max(1);
        let session = self.open().await?;
        let cursor = session.into_cursor(&sql, &values, chunk_size).await?;
        debug!("Streaming from {} in chunks of {}", self.kind(), chunk_size);
        Ok(ChunkStream::new(cursor, chunk_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{batch, scripted, Event, Response};

    #[tokio::test]
    async fn test_execute_commits_and_closes() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("update", Response::Affected(3));
        let n = db
            .execute("UPDATE t SET a = :a", Params::named([("a", 1i64)]))
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            script.events(),
            vec![
                Event::Connect,
                Event::Execute("UPDATE t SET a = $1".into()),
                Event::Commit,
                Event::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_rolls_back_closes_and_keeps_error() {
        let (db, script) = scripted(DbKind::Oracle);
        script.on("insert", Response::Fail("ORA-00001: unique constraint".into()));
        let err = db
            .execute("INSERT INTO t VALUES (1)", Params::None)
            .await
            .unwrap_err();
        assert_eq!(err.server_message(), "ORA-00001: unique constraint");
        assert_eq!(script.count(&Event::Rollback), 1);
        assert_eq!(script.count(&Event::Close), 1);
        assert_eq!(script.count(&Event::Commit), 0);
    }

    #[tokio::test]
    async fn test_get_returns_rows() {
        let (db, script) = scripted(DbKind::Mysql);
        script.on(
            "select",
            Response::Rows(batch(&["ID"], vec![vec![Value::Int(1)], vec![Value::Int(2)]])),
        );
        let rows = db.get("SELECT ID FROM t", Params::None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(script.count(&Event::Close), 1);
    }

    #[tokio::test]
    async fn test_insert_one_returns_rows_only_when_present() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("returning", Response::Rows(batch(&["id"], vec![vec![Value::Int(9)]])));
        let returned = db
            .insert_one("INSERT INTO t (a) VALUES (1) RETURNING id", Params::None)
            .await
            .unwrap();
        assert_eq!(returned.unwrap().scalar(), Some(&Value::Int(9)));

        let none = db
            .insert_one("INSERT INTO t (a) VALUES (1)", Params::None)
            .await
            .unwrap();
        assert!(none.is_none());
        assert_eq!(script.count(&Event::Commit), 2);
    }

    #[tokio::test]
    async fn test_stored_procedure_scalar_and_commit() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("refresh_totals", Response::Rows(batch(&["r"], vec![vec![Value::Int(42)]])));
        let value = db
            .call_stored_procedure("refresh_totals", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(value, Some(Value::Int(42)));
        assert_eq!(script.count(&Event::Commit), 1);

        let (db, script) = scripted(DbKind::Oracle);
        let value = db.call_stored_procedure("refresh_totals", &[]).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(script.count(&Event::Commit), 1);
    }

    #[tokio::test]
    async fn test_delete_rows_filter_or_truncate() {
        let (db, script) = scripted(DbKind::Db2);
        db.delete_rows("S.T", Some("REGION = 'N'")).await.unwrap();
        db.delete_rows("S.T", None).await.unwrap();
        assert_eq!(
            script.statements(),
            vec![
                "DELETE FROM S.T WHERE REGION = 'N'".to_string(),
                "TRUNCATE TABLE S.T IMMEDIATE".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_table_failure_is_terminal_error() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("create table", Response::Fail("permission denied".into()));
        let map = vec![("ID".to_string(), "INTEGER".to_string())];
        let err = db.create_table("t", &map, None).await.unwrap_err();
        assert!(matches!(err, CopyError::TableCreation { .. }));
        assert_eq!(err.server_message(), "permission denied");
    }

    #[test]
    fn test_create_table_sql_with_subset() {
        let (db, _) = scripted(DbKind::Postgres);
        let map = vec![
            ("ID".to_string(), "INTEGER".to_string()),
            ("NAME".to_string(), "VARCHAR(40)".to_string()),
            ("NOTES".to_string(), "TEXT".to_string()),
        ];
        let subset = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            db.create_table_sql("public.t", &map, Some(&subset)),
            "CREATE TABLE public.t (\n    \"ID\" INTEGER,\n    \"NAME\" VARCHAR(40)\n)"
        );
    }

    #[tokio::test]
    async fn test_upload_batch_falls_back_to_insert() {
        let (db, script) = scripted(DbKind::Mssql);
        let rows = batch(&["A", "B"], vec![vec![Value::Int(1), Value::from("x")]; 3]);
        let n = db.upload_batch("dbo.T", &rows).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            script.events()[1],
            Event::ExecuteMany("INSERT INTO dbo.T ([A], [B]) VALUES (@P1, @P2)".into(), 3)
        );
    }
}
