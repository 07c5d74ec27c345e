//! ODBC session for Oracle, DB2 and Firebird.
//!
//! odbc-api is blocking, so every call runs on the blocking pool with the
//! connection moved in and handed back. Parameters are bound as text and
//! result columns come back as text; the server converts both ways, so
//! Oracle sessions pin their NLS date formats to the ISO text we send.

use std::collections::VecDeque;
use std::sync::OnceLock;

use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::parameter::VarCharBox;
use odbc_api::{ConnectionOptions, Cursor, Environment, IntoParameter, ResultSetMetadata};
use tracing::{debug, info, warn};

use crate::config::{ConnectionProfile, DbKind};
use crate::core::{RecordBatch, RowCursor, Session, Value};
use crate::error::{CopyError, Result};

use super::cursor::{self, ChannelCursor};

type Connection = odbc_api::Connection<'static>;

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// Longest text value fetched per cell.
const MAX_TEXT_BYTES: usize = 8192;

/// Rows per ODBC fetch buffer.
const MAX_BUFFER_ROWS: usize = 10_000;

fn environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new()
        .map_err(|e| CopyError::Config(format!("ODBC environment unavailable: {}", e)))?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

fn default_driver(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Oracle => "Oracle",
        DbKind::Db2 => "IBM DB2 ODBC DRIVER",
        DbKind::Firebird => "Firebird",
        DbKind::Mssql => "ODBC Driver 18 for SQL Server",
        DbKind::Mysql => "MySQL ODBC 8.0 Unicode Driver",
        DbKind::Postgres => "PostgreSQL Unicode",
    }
}

/// Build the ODBC connection string for a profile.
pub(crate) fn connection_string(profile: &ConnectionProfile) -> Result<String> {
    let driver = profile
        .driver
        .as_deref()
        .unwrap_or_else(|| default_driver(profile.kind));
    let host = profile.require_host()?;
    let database = profile.require_database()?;
    let user = profile.require_user()?;
    let password = profile.password_or_empty();
    let port = profile.port;

    let target = match profile.kind {
        DbKind::Oracle => format!("DBQ={}:{}/{}", host, port, database),
        DbKind::Db2 => format!(
            "DATABASE={};HOSTNAME={};PORT={};PROTOCOL=TCPIP",
            database, host, port
        ),
        DbKind::Firebird => format!("DBNAME={}/{}:{}", host, port, database),
        _ => format!("SERVER={};PORT={};DATABASE={}", host, port, database),
    };
    Ok(format!(
        "DRIVER={{{}}};{};UID={};PWD={};",
        driver, target, user, password
    ))
}

/// Statements run once per new connection, before any user statement.
///
/// Text parameters for DATE and TIMESTAMP columns are converted with the
/// session NLS formats, which default to a locale pattern like `DD-MON-RR`.
pub(crate) fn session_setup(kind: DbKind) -> &'static [&'static str] {
    match kind {
        DbKind::Oracle => &[
            "ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD HH24:MI:SS'",
            "ALTER SESSION SET NLS_TIMESTAMP_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6'",
            "ALTER SESSION SET NLS_NUMERIC_CHARACTERS = '.,'",
        ],
        _ => &[],
    }
}

/// Render a bound value in the text shape the session setup expects.
///
/// Oracle DATE has no fractional seconds, so a whole-second timestamp is
/// sent without them and fits both DATE and TIMESTAMP columns.
fn param_text(kind: DbKind, value: &Value) -> Option<String> {
    match (kind, value) {
        (DbKind::Oracle, Value::Date(d)) => Some(d.format("%Y-%m-%d 00:00:00").to_string()),
        (DbKind::Oracle, Value::DateTime(dt)) => Some(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        _ => value.to_text(),
    }
}

fn odbc_error(e: odbc_api::Error) -> CopyError {
    CopyError::query(e)
}

fn text_params(kind: DbKind, values: &[Value]) -> Vec<VarCharBox> {
    values
        .iter()
        .map(|v| param_text(kind, v).into_parameter())
        .collect()
}

/// Decode one fetched cell. A cell filling the whole buffer was cut short.
fn decode_cell(bytes: &[u8], limit: usize) -> (Value, bool) {
    let text = String::from_utf8_lossy(bytes).into_owned();
    (Value::Text(text), bytes.len() >= limit)
}

/// Run `f` on the blocking pool with the connection and hand it back.
async fn with_connection<T, F>(kind: DbKind, conn: Connection, f: F) -> Result<(Connection, Result<T>)>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = conn;
        let result = f(&mut conn);
        (conn, result)
    })
    .await
    .map_err(|e| CopyError::connection(kind, format!("ODBC worker: {}", e)))
}

/// One ODBC connection with autocommit off.
pub struct OdbcSession {
    kind: DbKind,
    conn: Option<Connection>,
}

impl OdbcSession {
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self> {
        let kind = profile.kind;
        let conn_str = connection_string(profile)?;
        let env = environment()?;

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = env
                .connect_with_connection_string(&conn_str, ConnectionOptions::default())
                .map_err(|e| CopyError::connection(kind, e))?;
            conn.set_autocommit(false)
                .map_err(|e| CopyError::connection(kind, e))?;
            for sql in session_setup(kind) {
                conn.execute(sql, ())
                    .map_err(|e| CopyError::connection(kind, e))?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| CopyError::connection(kind, format!("ODBC worker: {}", e)))??;

        info!(
            "Connected to {} via ODBC: {}:{}",
            kind,
            profile.host.as_deref().unwrap_or_default(),
            profile.port
        );
        Ok(Self {
            kind,
            conn: Some(conn),
        })
    }

    /// Run a blocking operation against the connection.
    async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| CopyError::connection(self.kind, "connection lost by an earlier failure"))?;
        let (conn, result) = with_connection(self.kind, conn, f).await?;
        self.conn = Some(conn);
        result
    }
}

#[async_trait]
impl Session for OdbcSession {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = sql.to_string();
        let params = text_params(self.kind, params);
        self.run(move |conn| {
            let mut stmt = conn.preallocate().map_err(odbc_error)?;
            stmt.execute(&sql, params.as_slice()).map_err(odbc_error)?;
            let count = stmt.row_count().map_err(odbc_error)?;
            Ok(count.unwrap_or(0) as u64)
        })
        .await
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<RecordBatch> {
        let sql = sql.to_string();
        let params = text_params(self.kind, params);
        self.run(move |conn| {
            let cursor = conn.execute(&sql, params.as_slice()).map_err(odbc_error)?;
            match cursor {
                Some(cursor) => {
                    let mut reader = TextReader::new(cursor, fetch_hint)?;
                    let rows = reader.next_rows(usize::MAX)?;
                    Ok(RecordBatch::new(reader.columns, rows))
                }
                None => Ok(RecordBatch::default()),
            }
        })
        .await
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let sql = sql.to_string();
        let kind = self.kind;
        let rows: Vec<Vec<VarCharBox>> = rows.iter().map(|r| text_params(kind, r)).collect();
        self.run(move |conn| {
            let mut prepared = conn.prepare(&sql).map_err(odbc_error)?;
            for row in &rows {
                prepared.execute(row.as_slice()).map_err(odbc_error)?;
            }
            Ok(rows.len() as u64)
        })
        .await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run(|conn| conn.commit().map_err(odbc_error)).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run(|conn| conn.rollback().map_err(odbc_error)).await
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let kind = self.kind;
        if let Some(conn) = self.conn.take() {
            tokio::task::spawn_blocking(move || {
                let _ = conn.rollback();
                drop(conn);
            })
            .await
            .map_err(|e| CopyError::connection(kind, format!("ODBC worker: {}", e)))?;
        }
        debug!("{} ODBC connection closed", kind);
        Ok(())
    }

    async fn into_cursor(
        mut self: Box<Self>,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let kind = self.kind;
        let conn = self
            .conn
            .take()
            .ok_or_else(|| CopyError::connection(kind, "connection lost by an earlier failure"))?;
        let sql = sql.to_string();
        let params = text_params(self.kind, params);
        let (tx, mut rx) = cursor::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        let handle = tokio::task::spawn_blocking(move || {
            let opened = conn
                .execute(&sql, params.as_slice())
                .map_err(odbc_error)
                .and_then(|cursor| match cursor {
                    Some(cursor) => TextReader::new(cursor, fetch_hint),
                    None => Err(CopyError::query("statement returned no result set")),
                });
            let mut reader = match opened {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            while let Some((max_rows, reply)) = rx.blocking_recv() {
                let result = reader
                    .next_rows(max_rows)
                    .map(|rows| RecordBatch::new(reader.columns.clone(), rows));
                let _ = reply.send(result);
            }
            drop(reader);
            let _ = conn.rollback();
        });

        ready_rx
            .await
            .map_err(|_| CopyError::connection(kind, "cursor worker stopped"))??;
        Ok(Box::new(ChannelCursor::new(kind, tx, handle)))
    }
}

/// Text buffer reader over an open ODBC cursor.
///
/// ODBC fills whole buffers; rows beyond a request wait in `pending`.
/// Buffers are sized from each column's declared length, capped at
/// [`MAX_TEXT_BYTES`].
struct TextReader<C: Cursor> {
    columns: Vec<String>,
    rows: odbc_api::BlockCursor<C, TextRowSet>,
    pending: VecDeque<Vec<Value>>,
    exhausted: bool,
    truncated: Vec<bool>,
}

impl<C: Cursor> TextReader<C> {
    fn new(mut cursor: C, fetch_hint: usize) -> Result<Self> {
        let columns = cursor
            .column_names()
            .map_err(odbc_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(odbc_error)?;
        let capacity = fetch_hint.clamp(1, MAX_BUFFER_ROWS);
        let buffer = TextRowSet::for_cursor(capacity, &mut cursor, Some(MAX_TEXT_BYTES))
            .map_err(odbc_error)?;
        let rows = cursor.bind_buffer(buffer).map_err(odbc_error)?;
        let truncated = vec![false; columns.len()];
        Ok(Self {
            columns,
            rows,
            pending: VecDeque::new(),
            exhausted: false,
            truncated,
        })
    }

    fn next_rows(&mut self, max_rows: usize) -> Result<Vec<Vec<Value>>> {
        while self.pending.len() < max_rows && !self.exhausted {
            match self.rows.fetch().map_err(odbc_error)? {
                Some(batch) => {
                    for row in 0..batch.num_rows() {
                        let mut values = Vec::with_capacity(batch.num_cols());
                        for col in 0..batch.num_cols() {
                            let value = match batch.at(col, row) {
                                Some(bytes) => {
                                    let (value, cut) = decode_cell(bytes, MAX_TEXT_BYTES);
                                    if cut && !self.truncated[col] {
                                        self.truncated[col] = true;
                                        warn!(
                                            "Column {} has values longer than {} bytes; they are truncated",
                                            self.columns[col], MAX_TEXT_BYTES
                                        );
                                    }
                                    value
                                }
                                None => Value::Null,
                            };
                            values.push(value);
                        }
                        self.pending.push_back(values);
                    }
                }
                None => self.exhausted = true,
            }
        }
        let take = max_rows.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}
