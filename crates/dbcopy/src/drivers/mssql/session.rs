//! MSSQL session over a tiberius client.
//!
//! Bulk loads use the TDS bulk-insert path. Values are narrowed to the
//! destination column types first, because bulk insert does not convert.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, IntoSql, ToSql, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::{ConnectionProfile, DbKind};
use crate::core::{RecordBatch, RowCursor, Session, Value};
use crate::drivers::common::cursor::{self, ChannelCursor};
use crate::error::{CopyError, Result};

type TdsClient = Client<Compat<TcpStream>>;

/// One SQL Server connection.
pub struct MssqlSession {
    client: TdsClient,
    in_transaction: bool,
}

impl MssqlSession {
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self> {
        let mut config = Config::new();
        config.host(profile.require_host()?);
        config.port(profile.port);
        config.database(profile.require_database()?);
        config.authentication(AuthMethod::sql_server(
            profile.require_user()?,
            profile.password_or_empty(),
        ));
        config.trust_cert();

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| CopyError::connection(DbKind::Mssql, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| CopyError::connection(DbKind::Mssql, e))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| CopyError::connection(DbKind::Mssql, e))?;

        info!(
            "Connected to MSSQL: {}:{}/{}",
            profile.host.as_deref().unwrap_or_default(),
            profile.port,
            profile.database.as_deref().unwrap_or_default()
        );

        Ok(Self {
            client,
            in_transaction: false,
        })
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client
                .simple_query("BEGIN TRAN")
                .await
                .map_err(tds_error)?
                .into_results()
                .await
                .map_err(tds_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end(&mut self, statement: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client
                .simple_query(statement)
                .await
                .map_err(tds_error)?
                .into_results()
                .await
                .map_err(tds_error)?;
        }
        Ok(())
    }

    /// Destination columns in table order, which is the order bulk insert
    /// expects values in.
    async fn table_columns(&mut self, table: &str) -> Result<Vec<TableColumn>> {
        let sql = "SELECT c.name, t.name, CAST(c.max_length AS INT) FROM sys.columns c \
                   JOIN sys.types t ON c.user_type_id = t.user_type_id \
                   WHERE c.object_id = OBJECT_ID(@P1) ORDER BY c.column_id";
        let rows = self
            .client
            .query(sql, &[&table])
            .await
            .map_err(tds_error)?
            .into_first_result()
            .await
            .map_err(tds_error)?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: Option<&str> = row.get(0);
            let ty: Option<&str> = row.get(1);
            let max_length: Option<i32> = row.get(2);
            if let (Some(name), Some(ty)) = (name, ty) {
                columns.push(TableColumn::new(name, ty, max_length.unwrap_or(-1)));
            }
        }
        Ok(columns)
    }
}

/// Maximum string length (in bytes) for TDS bulk insert.
const BULK_INSERT_STRING_LIMIT: usize = 65535;

/// One destination column as bulk insert sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableColumn {
    name: String,
    /// Lower-cased `sys.types` name.
    ty: String,
    /// Character capacity for text columns; `None` for `(max)` and
    /// non-text types.
    max_chars: Option<usize>,
}

impl TableColumn {
    fn new(name: &str, ty: &str, max_length: i32) -> Self {
        let ty = ty.to_lowercase();
        let max_chars = match (ty.as_str(), usize::try_from(max_length)) {
            ("nchar" | "nvarchar", Ok(bytes)) => Some(bytes / 2),
            ("char" | "varchar", Ok(bytes)) => Some(bytes),
            _ => None,
        };
        Self {
            name: name.to_string(),
            ty,
            max_chars,
        }
    }
}

/// Batch position feeding each destination column, in table order.
///
/// Destination columns the batch lacks are sent as NULL. `None` when the
/// batch carries a column the table does not have: bulk insert cannot
/// name it, so the load has to go through `INSERT`.
fn bulk_layout(batch_columns: &[String], table: &[TableColumn]) -> Option<Vec<Option<usize>>> {
    let all_known = batch_columns
        .iter()
        .all(|c| table.iter().any(|t| t.name.eq_ignore_ascii_case(c)));
    if !all_known || table.is_empty() {
        return None;
    }
    Some(
        table
            .iter()
            .map(|t| batch_columns.iter().position(|c| c.eq_ignore_ascii_case(&t.name)))
            .collect(),
    )
}

/// Whether some text value is too long for its column or for the bulk
/// protocol. Such rows are left to `INSERT`, whose truncation errors name
/// the column.
fn has_oversized_text(batch: &RecordBatch, layout: &[Option<usize>], table: &[TableColumn]) -> bool {
    batch.rows().iter().any(|row| {
        layout.iter().zip(table).any(|(idx, column)| {
            let Some(Value::Text(s)) = idx.and_then(|i| row.get(i)) else {
                return false;
            };
            let utf16_bytes: usize = s.chars().map(|c| c.len_utf16() * 2).sum();
            utf16_bytes > BULK_INSERT_STRING_LIMIT
                || column.max_chars.is_some_and(|max| s.chars().count() > max)
        })
    })
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.begin().await?;
        let result = self
            .client
            .execute(sql, &param_refs(params))
            .await
            .map_err(tds_error)?;
        Ok(result.total())
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        _fetch_hint: usize,
    ) -> Result<RecordBatch> {
        self.begin().await?;
        let mut stream = self
            .client
            .query(sql, &param_refs(params))
            .await
            .map_err(tds_error)?;
        let columns = column_names(stream.columns().await.map_err(tds_error)?);
        let rows = stream.into_first_result().await.map_err(tds_error)?;
        let rows = rows
            .into_iter()
            .map(row_to_values)
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBatch::new(columns, rows))
    }

    async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        self.begin().await?;
        let mut affected = 0;
        for row in rows {
            affected += self
                .client
                .execute(sql, &param_refs(row))
                .await
                .map_err(tds_error)?
                .total();
        }
        Ok(affected)
    }

    async fn bulk_load(&mut self, table: &str, batch: &RecordBatch) -> Result<Option<u64>> {
        if batch.is_empty() {
            return Ok(Some(0));
        }
        self.begin().await?;

        let table_columns = self.table_columns(table).await?;
        let Some(layout) = bulk_layout(batch.columns(), &table_columns) else {
            debug!("Columns of {} do not cover the batch; using INSERT", table);
            return Ok(None);
        };
        if has_oversized_text(batch, &layout, &table_columns) {
            debug!("Batch for {} has oversized strings; using INSERT", table);
            return Ok(None);
        }

        let mut bulk = self
            .client
            .bulk_insert(table)
            .await
            .map_err(|e| CopyError::bulk_load(table, tds_message(&e)))?;

        for row in batch.rows() {
            let mut token_row = TokenRow::new();
            for (idx, column) in layout.iter().zip(&table_columns) {
                let value = idx.and_then(|i| row.get(i)).unwrap_or(&Value::Null);
                let data = to_column_data(value, Some(column.ty.as_str()))
                    .map_err(|msg| CopyError::conversion(column.name.as_str(), msg))?;
                token_row.push(data);
            }
            bulk.send(token_row)
                .await
                .map_err(|e| CopyError::bulk_load(table, tds_message(&e)))?;
        }

        let result = bulk
            .finalize()
            .await
            .map_err(|e| CopyError::bulk_load(table, tds_message(&e)))?;
        let total = result.total();
        debug!("Bulk inserted {} rows into {}", total, table);
        Ok(Some(total))
    }

    async fn commit(&mut self) -> Result<()> {
        self.end("COMMIT TRAN").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end("IF @@TRANCOUNT > 0 ROLLBACK TRAN").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| CopyError::connection(DbKind::Mssql, e))
    }

    async fn into_cursor(
        self: Box<Self>,
        sql: &str,
        params: &[Value],
        fetch_hint: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let MssqlSession { mut client, .. } = *self;
        let sql = sql.to_string();
        let params = params.to_vec();
        let (tx, mut rx) = cursor::channel();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        let handle = tokio::spawn(async move {
            {
                let refs = param_refs(&params);
                let mut stream = match client.query(&sql, &refs).await {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(tds_error(e)));
                        return;
                    }
                };
                let columns = match stream.columns().await {
                    Ok(cols) => column_names(cols),
                    Err(e) => {
                        let _ = ready_tx.send(Err(tds_error(e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                debug!("MSSQL row stream open (fetch hint {})", fetch_hint);

                let mut rows = stream.into_row_stream();
                while let Some((max_rows, reply)) = rx.recv().await {
                    let mut chunk = Vec::new();
                    let mut failed = None;
                    while chunk.len() < max_rows {
                        match rows.try_next().await {
                            Ok(Some(row)) => match row_to_values(row) {
                                Ok(values) => chunk.push(values),
                                Err(e) => {
                                    failed = Some(e);
                                    break;
                                }
                            },
                            Ok(None) => break,
                            Err(e) => {
                                failed = Some(tds_error(e));
                                break;
                            }
                        }
                    }
                    let result = match failed {
                        Some(e) => Err(e),
                        None => Ok(RecordBatch::new(columns.clone(), chunk)),
                    };
                    let _ = reply.send(result);
                }
            }
            let _ = client.close().await;
        });

        ready_rx
            .await
            .map_err(|_| CopyError::connection(DbKind::Mssql, "cursor worker stopped"))??;
        Ok(Box::new(ChannelCursor::new(DbKind::Mssql, tx, handle)))
    }
}

fn tds_message(e: &tiberius::error::Error) -> String {
    match e {
        tiberius::error::Error::Server(token) => token.message().to_string(),
        other => other.to_string(),
    }
}

fn tds_error(e: tiberius::error::Error) -> CopyError {
    CopyError::query(tds_message(&e))
}

fn column_names(columns: Option<&[tiberius::Column]>) -> Vec<String> {
    columns
        .unwrap_or_default()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

fn param_refs(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}

impl ToSql for Value {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            Value::Null => ColumnData::String(None),
            Value::Bool(v) => ColumnData::Bit(Some(*v)),
            Value::Int(v) => ColumnData::I64(Some(*v)),
            Value::Float(v) => ColumnData::F64(Some(*v)),
            Value::Decimal(v) => v.to_sql(),
            Value::Text(v) => ColumnData::String(Some(v.as_str().into())),
            Value::Bytes(v) => ColumnData::Binary(Some(v.as_slice().into())),
            Value::Uuid(v) => ColumnData::Guid(Some(*v)),
            Value::Date(v) => v.to_sql(),
            Value::Time(v) => v.to_sql(),
            Value::DateTime(v) => v.to_sql(),
            Value::DateTimeOffset(v) => v.to_sql(),
        }
    }
}

/// Owned TDS data for a decimal; tiberius only provides `ToSql` for `Decimal`.
fn decimal_data(v: Decimal) -> ColumnData<'static> {
    match v.to_sql() {
        ColumnData::Numeric(n) => ColumnData::Numeric(n),
        _ => unreachable!("tiberius encodes Decimal as Numeric"),
    }
}

/// Narrow a value to the destination column's TDS type.
fn to_column_data(
    value: &Value,
    column_type: Option<&str>,
) -> std::result::Result<ColumnData<'static>, String> {
    let ty = column_type.unwrap_or("");
    let out_of_range = |v: &dyn std::fmt::Display| format!("{} out of range for {}", v, ty);
    let data = match (value, ty) {
        (Value::Null, "bit") => ColumnData::Bit(None),
        (Value::Null, "tinyint") => ColumnData::U8(None),
        (Value::Null, "smallint") => ColumnData::I16(None),
        (Value::Null, "int") => ColumnData::I32(None),
        (Value::Null, "bigint") => ColumnData::I64(None),
        (Value::Null, "real") => ColumnData::F32(None),
        (Value::Null, "float") => ColumnData::F64(None),
        (Value::Null, "decimal" | "numeric" | "money" | "smallmoney") => ColumnData::Numeric(None),
        (Value::Null, "date") => ColumnData::Date(None),
        (Value::Null, "time") => ColumnData::Time(None),
        (Value::Null, "datetime2" | "datetime" | "smalldatetime") => ColumnData::DateTime2(None),
        (Value::Null, "datetimeoffset") => ColumnData::DateTimeOffset(None),
        (Value::Null, "uniqueidentifier") => ColumnData::Guid(None),
        (Value::Null, "binary" | "varbinary" | "image") => ColumnData::Binary(None),
        (Value::Null, _) => ColumnData::String(None),

        (Value::Bool(v), "bit") => ColumnData::Bit(Some(*v)),
        (Value::Bool(v), _) => to_column_data(&Value::Int(i64::from(*v)), column_type)?,
        (Value::Int(v), "tinyint") => {
            ColumnData::U8(Some(u8::try_from(*v).map_err(|_| out_of_range(v))?))
        }
        (Value::Int(v), "smallint") => {
            ColumnData::I16(Some(i16::try_from(*v).map_err(|_| out_of_range(v))?))
        }
        (Value::Int(v), "int") => {
            ColumnData::I32(Some(i32::try_from(*v).map_err(|_| out_of_range(v))?))
        }
        (Value::Int(v), "bit") => ColumnData::Bit(Some(*v != 0)),
        (Value::Int(v), "real") => ColumnData::F32(Some(*v as f32)),
        (Value::Int(v), "float") => ColumnData::F64(Some(*v as f64)),
        (Value::Int(v), "decimal" | "numeric" | "money" | "smallmoney") => {
            decimal_data(Decimal::from(*v))
        }
        (Value::Int(v), _) => ColumnData::I64(Some(*v)),
        (Value::Float(v), "real") => ColumnData::F32(Some(*v as f32)),
        (Value::Float(v), "decimal" | "numeric" | "money" | "smallmoney") => {
            decimal_data(Decimal::try_from(*v).map_err(|e| e.to_string())?)
        }
        (Value::Float(v), _) => ColumnData::F64(Some(*v)),
        (Value::Decimal(v), "real") => ColumnData::F32(v.to_string().parse().ok()),
        (Value::Decimal(v), "float") => ColumnData::F64(v.to_string().parse().ok()),
        (Value::Decimal(v), _) => decimal_data(*v),
        (Value::Text(v), "uniqueidentifier") => {
            ColumnData::Guid(Some(v.parse().map_err(|e: uuid::Error| e.to_string())?))
        }
        (Value::Text(v), _) => ColumnData::String(Some(v.clone().into())),
        (Value::Bytes(v), _) => ColumnData::Binary(Some(v.clone().into())),
        (Value::Uuid(v), _) => ColumnData::Guid(Some(*v)),
        (Value::Date(v), "date") => (*v).into_sql(),
        (Value::Date(v), _) => v.and_time(NaiveTime::MIN).into_sql(),
        (Value::Time(v), _) => (*v).into_sql(),
        (Value::DateTime(v), "date") => v.date().into_sql(),
        (Value::DateTime(v), "time") => v.time().into_sql(),
        (Value::DateTime(v), _) => (*v).into_sql(),
        (Value::DateTimeOffset(v), "datetimeoffset") => (*v).into_sql(),
        (Value::DateTimeOffset(v), _) => v.naive_utc().into_sql(),
    };
    Ok(data)
}

/// Convert one tiberius row.
fn row_to_values(row: tiberius::Row) -> Result<Vec<Value>> {
    row.into_iter().map(|data| column_value(&data)).collect()
}

fn column_value(data: &ColumnData<'static>) -> Result<Value> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I16(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I32(v) => v.map(|v| Value::Int(v.into())),
        ColumnData::I64(v) => v.map(Value::Int),
        ColumnData::F32(v) => v.map(|v| Value::Float(v.into())),
        ColumnData::F64(v) => v.map(Value::Float),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| Value::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(Value::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| Value::Bytes(b.to_vec())),
        ColumnData::Numeric(_) => Decimal::from_sql(data).map_err(tds_error)?.map(Value::Decimal),
        ColumnData::Xml(v) => v.as_ref().map(|x| Value::Text(x.to_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(data).map_err(tds_error)?.map(Value::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data).map_err(tds_error)?.map(Value::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(tds_error)?
            .map(Value::DateTimeOffset),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(tds_error)?
                .map(Value::DateTime)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_narrows_to_destination_width() {
        assert!(matches!(
            to_column_data(&Value::Int(7), Some("smallint")),
            Ok(ColumnData::I16(Some(7)))
        ));
        assert!(matches!(
            to_column_data(&Value::Int(7), Some("int")),
            Ok(ColumnData::I32(Some(7)))
        ));
        assert!(to_column_data(&Value::Int(300), Some("tinyint")).is_err());
    }

    #[test]
    fn test_null_takes_column_type() {
        assert!(matches!(
            to_column_data(&Value::Null, Some("datetime2")),
            Ok(ColumnData::DateTime2(None))
        ));
        assert!(matches!(
            to_column_data(&Value::Null, None),
            Ok(ColumnData::String(None))
        ));
    }

    #[test]
    fn test_column_value_reads_native_data() {
        assert_eq!(column_value(&ColumnData::I32(Some(5))).unwrap(), Value::Int(5));
        assert_eq!(column_value(&ColumnData::String(None)).unwrap(), Value::Null);
        assert_eq!(
            column_value(&ColumnData::String(Some("abc".into()))).unwrap(),
            Value::Text("abc".into())
        );
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    fn sales_table() -> Vec<TableColumn> {
        vec![
            TableColumn::new("A", "int", 4),
            TableColumn::new("AUX_UPDATED_DATA", "datetime2", 8),
            TableColumn::new("B", "nvarchar", 20),
            TableColumn::new("NOTE", "varchar", -1),
        ]
    }

    #[test]
    fn test_bulk_layout_follows_table_order() {
        let layout = bulk_layout(&columns(&["a", "B", "aux_updated_data"]), &sales_table()).unwrap();
        assert_eq!(layout, vec![Some(0), Some(2), Some(1), None]);
    }

    #[test]
    fn test_bulk_layout_rejects_unknown_column() {
        assert_eq!(bulk_layout(&columns(&["A", "NEWCOL"]), &sales_table()), None);
        assert_eq!(bulk_layout(&columns(&["A"]), &[]), None);
    }

    #[test]
    fn test_text_capacity_from_max_length() {
        let table = sales_table();
        assert_eq!(table[2].max_chars, Some(10));
        assert_eq!(table[3].max_chars, None);
        assert_eq!(table[0].max_chars, None);
    }

    #[test]
    fn test_oversized_text_leaves_bulk_path() {
        let table = sales_table();
        let names = columns(&["A", "B"]);
        let layout = bulk_layout(&names, &table).unwrap();

        let fits = RecordBatch::new(names.clone(), vec![vec![Value::Int(1), Value::from("ten chars!")]]);
        assert!(!has_oversized_text(&fits, &layout, &table));

        let long = RecordBatch::new(names, vec![vec![Value::Int(1), Value::from("eleven chars")]]);
        assert!(has_oversized_text(&long, &layout, &table));
    }
}
