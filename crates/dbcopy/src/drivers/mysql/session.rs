//! MySQL session over a single sqlx connection.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::config::{ConnectionProfile, DbKind};
use crate::core::{RecordBatch, RowCursor, Session, Value};
use crate::drivers::common::cursor::{self, ChannelCursor};
use crate::error::{CopyError, Result};

/// One MySQL connection.
pub struct MysqlSession {
    conn: MySqlConnection,
    in_transaction: bool,
}

impl MysqlSession {
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(profile.require_host()?)
            .port(profile.port)
            .database(profile.require_database()?)
            .username(profile.require_user()?)
            .password(profile.password_or_empty());

        let conn = options
            .connect()
            .await
            .map_err(|e| CopyError::connection(DbKind::Mysql, mysql_message(&e)))?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            profile.host.as_deref().unwrap_or_default(),
            profile.port,
            profile.database.as_deref().unwrap_or_default()
        );

        Ok(Self {
            conn,
            in_transaction: false,
        })
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            (&mut self.conn)
                .execute("START TRANSACTION")
                .await
                .map_err(mysql_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end(&mut self, statement: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            (&mut self.conn)
                .execute(statement)
                .await
                .map_err(mysql_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MysqlSession {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin().await?;
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await
            .map_err(mysql_error)?;
        Ok(result.rows_affected())
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        _fetch_hint: usize,
    ) -> Result<RecordBatch> {
        self.begin().await?;
        let stmt = (&mut self.conn).prepare(sql).await.map_err(mysql_error)?;
        let columns = column_names(stmt.columns());
        let rows = bind_all(stmt.query(), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(mysql_error)?;
        let rows = rows.iter().map(row_to_values).collect();
        Ok(RecordBatch::new(columns, rows))
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        self.begin().await?;
        let mut affected = 0;
        for row in rows {
            // sqlx caches the prepared statement per connection
            affected += bind_all(sqlx::query(sql), row)
                .execute(&mut self.conn)
                .await
                .map_err(mysql_error)?
                .rows_affected();
        }
        Ok(affected)
    }

    async fn commit(&mut self) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end("ROLLBACK").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| CopyError::connection(DbKind::Mysql, mysql_message(&e)))
    }

    async fn into_cursor(
        self: Box<Self>,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let MysqlSession { mut conn, .. } = *self;
        let sql = sql.to_string();
        let params = params.to_vec();
        let (tx, mut rx) = cursor::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        let handle = tokio::spawn(async move {
            let columns = match (&mut conn).prepare(&sql).await {
                Ok(stmt) => column_names(stmt.columns()),
                Err(e) => {
                    let _ = ready_tx.send(Err(mysql_error(e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            debug!("MySQL row stream open (fetch hint {})", fetch_hint);

            {
                let mut stream = bind_all(sqlx::query(&sql), &params).fetch(&mut conn);
                while let Some((max_rows, reply)) = rx.recv().await {
                    let mut rows = Vec::new();
                    let mut failed = None;
                    while rows.len() < max_rows {
                        match stream.try_next().await {
                            Ok(Some(row)) => rows.push(row_to_values(&row)),
                            Ok(None) => break,
                            Err(e) => {
                                failed = Some(mysql_error(e));
                                break;
                            }
                        }
                    }
                    let result = match failed {
                        Some(e) => Err(e),
                        None => Ok(RecordBatch::new(columns.clone(), rows)),
                    };
                    let _ = reply.send(result);
                }
            }
            let _ = conn.close().await;
        });

        ready_rx
            .await
            .map_err(|_| CopyError::connection(DbKind::Mysql, "cursor worker stopped"))??;
        Ok(Box::new(ChannelCursor::new(DbKind::Mysql, tx, handle)))
    }
}

fn mysql_message(e: &sqlx::Error) -> String {
    match e.as_database_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

fn mysql_error(e: sqlx::Error) -> CopyError {
    CopyError::query(mysql_message(&e))
}

fn column_names(columns: &[sqlx::mysql::MySqlColumn]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for value in params {
        query = match value.clone() {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::Decimal(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Bytes(v) => query.bind(v),
            Value::Uuid(v) => query.bind(v.to_string()),
            Value::Date(v) => query.bind(v),
            Value::Time(v) => query.bind(v),
            Value::DateTime(v) => query.bind(v),
            Value::DateTimeOffset(v) => query.bind(v.naive_utc()),
        };
    }
    query
}

/// Convert a MySQL row to values, by the column's reported type.
fn row_to_values(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let is_null: bool = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
            if is_null {
                return Value::Null;
            }
            let data_type = col.type_info().name().to_lowercase();
            let converted = match data_type.as_str() {
                "boolean" | "bool" => row.try_get::<bool, _>(i).map(Value::Bool),
                "tinyint" => row.try_get::<i8, _>(i).map(|v| Value::Int(v.into())),
                "smallint" => row.try_get::<i16, _>(i).map(|v| Value::Int(v.into())),
                "mediumint" | "int" | "integer" => {
                    row.try_get::<i32, _>(i).map(|v| Value::Int(v.into()))
                }
                "bigint" => row.try_get::<i64, _>(i).map(Value::Int),
                t if t.ends_with("unsigned") => row.try_get::<u64, _>(i).map(|v| {
                    i64::try_from(v)
                        .map(Value::Int)
                        .unwrap_or_else(|_| Value::Decimal(v.into()))
                }),
                "float" => row.try_get::<f32, _>(i).map(|v| Value::Float(v.into())),
                "double" | "real" => row.try_get::<f64, _>(i).map(Value::Float),
                "decimal" | "numeric" => row.try_get::<rust_decimal::Decimal, _>(i).map(Value::Decimal),
                "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                    row.try_get::<Vec<u8>, _>(i).map(Value::Bytes)
                }
                "date" => row.try_get::<chrono::NaiveDate, _>(i).map(Value::Date),
                "time" => row.try_get::<chrono::NaiveTime, _>(i).map(Value::Time),
                "datetime" | "timestamp" => {
                    row.try_get::<chrono::NaiveDateTime, _>(i).map(Value::DateTime)
                }
                _ => row.try_get::<String, _>(i).map(Value::Text),
            };
            settle_cell(
                col.name(),
                &data_type,
                converted,
                || row.try_get_unchecked::<String, _>(i),
                || row.try_get_unchecked::<Vec<u8>, _>(i),
            )
        })
        .collect()
}

/// Undecodable values (zero dates, odd charsets) fall back to their text
/// form, then to raw bytes. Only a cell neither can read becomes NULL.
fn settle_cell<E: std::fmt::Display>(
    column: &str,
    data_type: &str,
    converted: std::result::Result<Value, E>,
    text: impl FnOnce() -> std::result::Result<String, E>,
    bytes: impl FnOnce() -> std::result::Result<Vec<u8>, E>,
) -> Value {
    let err = match converted {
        Ok(value) => return value,
        Err(e) => e,
    };
    if let Ok(t) = text() {
        return Value::Text(t);
    }
    match bytes() {
        Ok(b) => Value::Bytes(b),
        Err(_) => {
            warn!(
                "Column {} ({}) could not be decoded, read as NULL: {}",
                column, data_type, err
            );
            Value::Null
        }
    }
}
