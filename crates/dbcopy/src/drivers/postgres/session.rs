//! PostgreSQL session over tokio-postgres.
//!
//! A transaction is opened lazily by the first statement. Bulk loads use
//! text-format `COPY ... FROM STDIN`; cursors bind a portal and page
//! through it with `query_portal`.

use std::str::FromStr;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, NaiveTime};
use futures::SinkExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, Statement};
use tracing::{debug, info};

use crate::config::{ConnectionProfile, DbKind};
use crate::core::value::parse_datetime;
use crate::core::{Dialect, RecordBatch, RowCursor, Session, Value};
use crate::drivers::common::cursor::{self, ChannelCursor};
use crate::error::{CopyError, Result};

use super::PostgresDialect;

/// One PostgreSQL connection.
pub struct PgSession {
    client: Client,
    connection: JoinHandle<()>,
    in_transaction: bool,
}

impl PgSession {
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(profile.require_host()?);
        pg_config.port(profile.port);
        pg_config.dbname(profile.require_database()?);
        pg_config.user(profile.require_user()?);
        pg_config.password(profile.password_or_empty());

        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| CopyError::connection(DbKind::Postgres, e))?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection ended: {}", e);
            }
        });

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            profile.host.as_deref().unwrap_or_default(),
            profile.port,
            profile.database.as_deref().unwrap_or_default()
        );

        Ok(Self {
            client,
            connection,
            in_transaction: false,
        })
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await.map_err(pg_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end(&mut self, statement: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.batch_execute(statement).await.map_err(pg_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin().await?;
        self.client
            .execute(sql, &param_refs(params))
            .await
            .map_err(pg_error)
    }

    // Results arrive in one round trip; the fetch hint does not apply.
    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        _fetch_hint: usize,
    ) -> Result<RecordBatch> {
        self.begin().await?;
        let stmt = self.client.prepare(sql).await.map_err(pg_error)?;
        let rows = self
            .client
            .query(&stmt, &param_refs(params))
            .await
            .map_err(pg_error)?;
        rows_to_batch(&stmt, &rows)
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        self.begin().await?;
        let stmt = self.client.prepare(sql).await.map_err(pg_error)?;
        let mut affected = 0;
        for row in rows {
            affected += self
                .client
                .execute(&stmt, &param_refs(row))
                .await
                .map_err(pg_error)?;
        }
        Ok(affected)
    }

    async fn bulk_load(&mut self, table: &str, batch: &RecordBatch) -> Result<Option<u64>> {
        if batch.is_empty() {
            return Ok(Some(0));
        }
        self.begin().await?;

        let dialect = PostgresDialect::new();
        let col_list: Vec<String> = batch.columns().iter().map(|c| dialect.quote_ident(c)).collect();
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            table,
            col_list.join(", ")
        );

        let sink = self
            .client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| CopyError::bulk_load(table, pg_message(&e)))?;

        let mut buf = BytesMut::with_capacity(batch.len() * 128);
        for row in batch.rows() {
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    buf.put_u8(b'\t');
                }
                buf.put_slice(copy_text(value).as_bytes());
            }
            buf.put_u8(b'\n');
        }

        let data: Bytes = buf.freeze();
        tokio::pin!(sink);
        sink.send(data)
            .await
            .map_err(|e| CopyError::bulk_load(table, pg_message(&e)))?;
        let copied = sink
            .finish()
            .await
            .map_err(|e| CopyError::bulk_load(table, pg_message(&e)))?;

        debug!("COPY {} rows into {}", copied, table);
        Ok(Some(copied))
    }

    async fn commit(&mut self) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end("ROLLBACK").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PgSession {
            client, connection, ..
        } = *self;
        drop(client);
        connection
            .await
            .map_err(|e| CopyError::connection(DbKind::Postgres, e))?;
        Ok(())
    }

    async fn into_cursor(
        self: Box<Self>,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>> {
        if self.in_transaction {
            return Err(CopyError::query(
                "cannot open a cursor on a session with an open transaction",
            ));
        }
        let PgSession {
            mut client,
            connection,
            ..
        } = *self;
        let sql = sql.to_string();
        let params = params.to_vec();
        let (tx, mut rx) = cursor::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        let handle = tokio::spawn(async move {
            let transaction = match client.transaction().await {
                Ok(t) => t,
                Err(e) => {
                    let _ = ready_tx.send(Err(pg_error(e)));
                    return;
                }
            };
            let stmt = match transaction.prepare(&sql).await {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(pg_error(e)));
                    return;
                }
            };
            let portal = match transaction.bind(&stmt, &param_refs(&params)).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = ready_tx.send(Err(pg_error(e)));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            debug!("PostgreSQL portal open (fetch hint {})", fetch_hint);

            while let Some((max_rows, reply)) = rx.recv().await {
                let limit = i32::try_from(max_rows).unwrap_or(i32::MAX);
                let result = transaction
                    .query_portal(&portal, limit)
                    .await
                    .map_err(pg_error)
                    .and_then(|rows| rows_to_batch(&stmt, &rows));
                let _ = reply.send(result);
            }

            // Read-only cursor: nothing to keep.
            drop(portal);
            let _ = transaction.rollback().await;
            drop(client);
            let _ = connection.await;
        });

        ready_rx
            .await
            .map_err(|_| CopyError::connection(DbKind::Postgres, "cursor worker stopped"))??;
        Ok(Box::new(ChannelCursor::new(DbKind::Postgres, tx, handle)))
    }
}

fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

fn pg_error(e: tokio_postgres::Error) -> CopyError {
    CopyError::query(pg_message(&e))
}

fn param_refs(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn rows_to_batch(stmt: &Statement, rows: &[Row]) -> Result<RecordBatch> {
    let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, col) in stmt.columns().iter().enumerate() {
            values.push(convert_pg_value(row, idx, col.type_())?);
        }
        out.push(values);
    }
    Ok(RecordBatch::new(columns, out))
}

fn get<'a, T>(row: &'a Row, idx: usize) -> Result<Option<T>>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).map_err(pg_error)
}

/// Convert one PostgreSQL column value.
fn convert_pg_value(row: &Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match ty.name() {
        "bool" => get::<bool>(row, idx)?.map(Value::Bool),
        "int2" => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        "int4" => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        "int8" => get::<i64>(row, idx)?.map(Value::Int),
        "oid" => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),
        "float4" => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        "float8" => get::<f64>(row, idx)?.map(Value::Float),
        "numeric" => get::<rust_decimal::Decimal>(row, idx)?.map(Value::Decimal),
        "uuid" => get::<uuid::Uuid>(row, idx)?.map(Value::Uuid),
        "date" => get::<chrono::NaiveDate>(row, idx)?.map(Value::Date),
        "time" => get::<chrono::NaiveTime>(row, idx)?.map(Value::Time),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx)?.map(Value::DateTime),
        "timestamptz" => get::<chrono::DateTime<chrono::FixedOffset>>(row, idx)?
            .map(Value::DateTimeOffset),
        "bytea" => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        _ => get::<String>(row, idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Render a value as one field of a text-format COPY row.
fn copy_text(value: &Value) -> String {
    match value {
        Value::Null => "\\N".to_string(),
        Value::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        Value::Bytes(b) => {
            let mut out = String::with_capacity(3 + b.len() * 2);
            out.push_str("\\\\x");
            for byte in b {
                out.push_str(&format!("{:02x}", byte));
            }
            out
        }
        other => match other.to_text() {
            Some(text) => escape_copy_text(&text),
            None => "\\N".to_string(),
        },
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

type BindResult<T> = std::result::Result<T, Box<dyn std::error::Error + Sync + Send>>;

/// Convert a parameter to the variant the server-side type is encoded
/// from. Binary encoders trust their input, so a mismatch has to be
/// resolved (or rejected) before encoding.
fn coerce_param(value: &Value, ty: &Type) -> BindResult<Value> {
    let mismatch = || -> Box<dyn std::error::Error + Sync + Send> {
        format!("cannot bind {:?} as {}", value, ty).into()
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    let text = value.to_text().unwrap_or_default();
    let text = text.trim();

    let coerced = if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        Some(value.to_text().map(Value::Text).unwrap_or(Value::Null))
    } else if *ty == Type::BOOL {
        match value {
            Value::Bool(v) => Some(Value::Bool(*v)),
            Value::Int(v) => Some(Value::Bool(*v != 0)),
            Value::Text(_) => match text.to_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Some(Value::Bool(true)),
                "0" | "f" | "false" | "n" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    } else if [Type::INT2, Type::INT4, Type::INT8].contains(ty) {
        match value {
            Value::Int(v) => Some(Value::Int(*v)),
            Value::Bool(v) => Some(Value::Int(i64::from(*v))),
            Value::Float(v) if v.fract() == 0.0 => Some(Value::Int(*v as i64)),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64().map(Value::Int),
            Value::Text(_) => text.parse().ok().map(Value::Int),
            _ => None,
        }
    } else if [Type::FLOAT4, Type::FLOAT8].contains(ty) {
        match value {
            Value::Float(v) => Some(Value::Float(*v)),
            Value::Int(v) => Some(Value::Float(*v as f64)),
            Value::Decimal(d) => d.to_f64().map(Value::Float),
            Value::Text(_) => text.parse().ok().map(Value::Float),
            _ => None,
        }
    } else if *ty == Type::NUMERIC {
        match value {
            Value::Decimal(d) => Some(Value::Decimal(*d)),
            Value::Int(v) => Some(Value::Decimal(Decimal::from(*v))),
            Value::Float(v) => Decimal::try_from(*v).ok().map(Value::Decimal),
            Value::Text(_) => Decimal::from_str(text).ok().map(Value::Decimal),
            _ => None,
        }
    } else if *ty == Type::DATE {
        match value {
            Value::Date(d) => Some(Value::Date(*d)),
            Value::DateTime(dt) => Some(Value::Date(dt.date())),
            Value::Text(_) => parse_datetime(text).map(|dt| Value::Date(dt.date())),
            _ => None,
        }
    } else if *ty == Type::TIMESTAMP {
        match value {
            Value::DateTime(dt) => Some(Value::DateTime(*dt)),
            Value::Date(d) => Some(Value::DateTime(d.and_time(NaiveTime::MIN))),
            Value::DateTimeOffset(dt) => Some(Value::DateTime(dt.naive_local())),
            Value::Text(_) => parse_datetime(text).map(Value::DateTime),
            _ => None,
        }
    } else if *ty == Type::TIMESTAMPTZ {
        match value {
            Value::DateTimeOffset(dt) => Some(Value::DateTimeOffset(*dt)),
            // naive timestamps are taken as UTC
            Value::DateTime(dt) => Some(Value::DateTimeOffset(dt.and_utc().fixed_offset())),
            Value::Date(d) => Some(Value::DateTimeOffset(
                d.and_time(NaiveTime::MIN).and_utc().fixed_offset(),
            )),
            Value::Text(_) => DateTime::parse_from_rfc3339(text)
                .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z"))
                .ok()
                .map(Value::DateTimeOffset),
            _ => None,
        }
    } else if *ty == Type::TIME {
        match value {
            Value::Time(t) => Some(Value::Time(*t)),
            Value::DateTime(dt) => Some(Value::Time(dt.time())),
            Value::Text(_) => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .ok()
                .map(Value::Time),
            _ => None,
        }
    } else if *ty == Type::UUID {
        match value {
            Value::Uuid(u) => Some(Value::Uuid(*u)),
            Value::Text(_) => text.parse().ok().map(Value::Uuid),
            _ => None,
        }
    } else if *ty == Type::BYTEA {
        match value {
            Value::Bytes(b) => Some(Value::Bytes(b.clone())),
            Value::Text(s) => Some(Value::Bytes(s.as_bytes().to_vec())),
            _ => None,
        }
    } else {
        // other types: the inner encoder's own type check decides
        Some(value.clone())
    };
    coerced.ok_or_else(mismatch)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> BindResult<IsNull> {
        match coerce_param(self, ty)? {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::Int(v) if *ty == Type::INT2 => i16::try_from(v)?.to_sql_checked(ty, out),
            Value::Int(v) if *ty == Type::INT4 => i32::try_from(v)?.to_sql_checked(ty, out),
            Value::Int(v) => v.to_sql_checked(ty, out),
            Value::Float(v) if *ty == Type::FLOAT4 => (v as f32).to_sql_checked(ty, out),
            Value::Float(v) => v.to_sql_checked(ty, out),
            Value::Decimal(v) => v.to_sql_checked(ty, out),
            Value::Text(v) => v.to_sql_checked(ty, out),
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => v.to_sql_checked(ty, out),
            Value::Time(v) => v.to_sql_checked(ty, out),
            Value::DateTime(v) => v.to_sql_checked(ty, out),
            Value::DateTimeOffset(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
