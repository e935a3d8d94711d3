//! Native TDS driver over tiberius.
//!
//! A [`TdsDatabase`] owns one tiberius client. Each `execute` runs the query
//! on a background task that holds the client for as long as the result is
//! being read and forwards rows through a one-slot channel, so at most one
//! row is buffered ahead of the reader. Dropping the handle stops the task;
//! tiberius drains the unread remainder before the next query.
//!
//! Only the first result set of a batch is exposed. Column metadata is held
//! back until the first row arrives so that nullable integer and float
//! columns report the width they were declared with.
//!
//! Rows are forwarded one at a time as tiberius decodes them. A fetch size
//! hint is accepted and recorded but does not change buffering.
//!
//! Queries without parameters run as a plain batch; with parameters they go
//! through `sp_executesql` and reference them as `@P1`, `@P2`, ...
//!
//! A configured instance name is resolved through the SQL Server Browser
//! service before connecting.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use futures::TryStreamExt;
use smol_str::SmolStr;
use sqlserver_arel::{Engine, SQLSERVER_ADAPTER_NAME};
use tiberius::numeric::Numeric;
use tiberius::{Client, ColumnData, ColumnType, FromSql, Query, QueryItem, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, trace};

use crate::config::{DatabaseTimezone, MssqlConfig};
use crate::database::Database;
use crate::error::{DatasetError, DatasetResult};
use crate::handle::{Clob, DriverDate, DriverTimestamp, ResultHandle};
use crate::value::Value;
use crate::wire;

type TdsClient = Client<Compat<TcpStream>>;

const TIME_FORMAT: &str = "%H:%M:%S%.f";
const OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %:z";

/// Largest scale and digit count a TDS numeric parameter carries.
const MAX_NUMERIC_SCALE: u8 = 37;
const MAX_NUMERIC_DIGITS: u32 = 38;

/// A SQL Server connection speaking TDS.
#[derive(Clone)]
pub struct TdsDatabase {
    client: Arc<Mutex<TdsClient>>,
    timezone: DatabaseTimezone,
}

impl std::fmt::Debug for TdsDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdsDatabase")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl TdsDatabase {
    /// Open a connection.
    pub async fn connect(config: &MssqlConfig) -> DatasetResult<Self> {
        let tds = config.to_tiberius_config()?;
        debug!(
            host = %config.host,
            port = config.port,
            instance = ?config.instance_name,
            database = %config.database,
            "Connecting to SQL Server"
        );

        let connecting = async {
            if uses_browser(config) {
                Ok::<_, DatasetError>(TcpStream::connect_named(&tds).await?)
            } else {
                Ok(TcpStream::connect(tds.get_addr()).await?)
            }
        };
        let tcp = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| {
                DatasetError::driver(format!(
                    "timed out connecting to {}:{}",
                    config.host, config.port
                ))
            })??;
        tcp.set_nodelay(true)?;

        let client = Client::connect(tds, tcp.compat_write()).await?;
        info!(host = %config.host, database = %config.database, "Connected to SQL Server");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            timezone: config.database_timezone,
        })
    }

    /// Open a connection from a connection string.
    pub async fn connect_str(conn_str: &str) -> DatasetResult<Self> {
        Self::connect(&MssqlConfig::from_connection_string(conn_str)?).await
    }
}

fn uses_browser(config: &MssqlConfig) -> bool {
    config.instance_name.is_some()
}

impl Engine for TdsDatabase {
    fn adapter_name(&self) -> Option<&str> {
        Some(SQLSERVER_ADAPTER_NAME)
    }
}

#[async_trait]
impl Database for TdsDatabase {
    async fn execute_with(
        &self,
        sql: &str,
        params: &[Value],
    ) -> DatasetResult<Box<dyn ResultHandle>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(run_query(
            Arc::clone(&self.client),
            sql.to_owned(),
            params.to_vec(),
            tx,
        ));

        match rx.recv().await {
            Some(Event::Columns(columns)) => {
                trace!(columns = columns.len(), "Received result metadata");
                Ok(Box::new(TdsResultHandle::new(columns, rx)))
            }
            Some(Event::Failed(e)) => Err(e),
            Some(Event::Row(_)) => Err(DatasetError::driver("row received before metadata")),
            None => Err(DatasetError::ConnectionClosed),
        }
    }

    fn database_timezone(&self) -> DatabaseTimezone {
        self.timezone
    }
}

enum Event {
    Columns(Vec<(SmolStr, i32)>),
    Row(Vec<ColumnData<'static>>),
    Failed(DatasetError),
}

async fn run_query(
    client: Arc<Mutex<TdsClient>>,
    sql: String,
    params: Vec<Value>,
    tx: mpsc::Sender<Event>,
) {
    let mut client = client.lock_owned().await;
    let started = if params.is_empty() {
        client.simple_query(sql).await
    } else {
        let mut query = Query::new(sql);
        for param in params {
            bind_param(&mut query, param);
        }
        query.query(&mut *client).await
    };
    let mut stream = match started {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(Event::Failed(e.into())).await;
            return;
        }
    };

    let mut pending: Option<Vec<(SmolStr, ColumnType)>> = None;
    let mut described = false;
    loop {
        let event = match stream.try_next().await {
            Ok(Some(QueryItem::Metadata(meta))) if meta.result_index() == 0 => {
                pending = Some(
                    meta.columns()
                        .iter()
                        .map(|c| (SmolStr::new(c.name()), c.column_type()))
                        .collect(),
                );
                continue;
            }
            Ok(Some(QueryItem::Row(row))) if row.result_index() == 0 => {
                let cells: Vec<ColumnData<'static>> = row.into_iter().collect();
                if let Some(columns) = pending.take() {
                    described = true;
                    let columns = describe(columns, Some(cells.as_slice()));
                    if tx.send(Event::Columns(columns)).await.is_err() {
                        return;
                    }
                }
                Event::Row(cells)
            }
            Ok(Some(_)) | Ok(None) => break,
            Err(e) => Event::Failed(e.into()),
        };
        let failed = matches!(event, Event::Failed(_));
        if tx.send(event).await.is_err() || failed {
            return;
        }
    }

    // Empty results and statements without a result set still get a handle.
    if !described {
        let columns = pending.map(|c| describe(c, None)).unwrap_or_default();
        let _ = tx.send(Event::Columns(columns)).await;
    }
}

fn describe(
    columns: Vec<(SmolStr, ColumnType)>,
    first_row: Option<&[ColumnData<'static>]>,
) -> Vec<(SmolStr, i32)> {
    columns
        .into_iter()
        .enumerate()
        .map(|(i, (name, column_type))| {
            let sample = first_row.and_then(|row| row.get(i));
            (name, wire_type_for(column_type, sample))
        })
        .collect()
}

fn bind_param(query: &mut Query<'_>, param: Value) {
    match param {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(v) => query.bind(v),
        Value::Short(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Long(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Double(v) => query.bind(v),
        Value::String(v) => query.bind(v),
        Value::Date(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::Decimal(v) => match numeric_param(&v) {
            Some(numeric) => query.bind(numeric),
            None => query.bind(v.to_string()),
        },
        Value::Bytes(v) => query.bind(v),
    }
}

/// A TDS numeric for `value`, if it fits 38 digits and scale 37.
fn numeric_param(value: &BigDecimal) -> Option<Numeric> {
    let (digits, scale) = value.as_bigint_and_exponent();
    let (digits, scale) = if scale < 0 {
        (value.with_scale(0).as_bigint_and_exponent().0, 0)
    } else {
        (digits, scale)
    };
    let scale = u8::try_from(scale).ok().filter(|s| *s <= MAX_NUMERIC_SCALE)?;
    let digits = digits
        .to_i128()
        .filter(|d| d.unsigned_abs() < 10u128.pow(MAX_NUMERIC_DIGITS))?;
    Some(Numeric::new_with_scale(digits, scale))
}

/// Wire type code reported for a TDS column type.
///
/// Nullable integer and float columns share one TDS type whatever their
/// width. A cell from the column resolves it: tiberius decodes every cell,
/// NULL included, into the variant of the declared size. Without a cell the
/// widest type is reported.
pub fn wire_type_for(column_type: ColumnType, sample: Option<&ColumnData<'_>>) -> i32 {
    match (column_type, sample) {
        (ColumnType::Intn, Some(ColumnData::U8(_))) => wire::TINYINT,
        (ColumnType::Intn, Some(ColumnData::I16(_))) => wire::SMALLINT,
        (ColumnType::Intn, Some(ColumnData::I32(_))) => wire::INTEGER,
        (ColumnType::Floatn, Some(ColumnData::F32(_))) => wire::REAL,
        (column_type, _) => declared_wire_type(column_type),
    }
}

fn declared_wire_type(column_type: ColumnType) -> i32 {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => wire::BIT,
        ColumnType::Int1 => wire::TINYINT,
        ColumnType::Int2 => wire::SMALLINT,
        ColumnType::Int4 => wire::INTEGER,
        ColumnType::Int8 | ColumnType::Intn => wire::BIGINT,
        ColumnType::Float4 => wire::REAL,
        ColumnType::Float8 | ColumnType::Floatn => wire::DOUBLE,
        ColumnType::Money | ColumnType::Money4 | ColumnType::Decimaln => wire::DECIMAL,
        ColumnType::Numericn => wire::NUMERIC,
        ColumnType::Guid | ColumnType::BigChar => wire::CHAR,
        ColumnType::BigVarChar => wire::VARCHAR,
        ColumnType::NChar => wire::NCHAR,
        ColumnType::NVarchar => wire::NVARCHAR,
        ColumnType::Text => wire::LONGVARCHAR,
        ColumnType::NText | ColumnType::Xml => wire::LONGNVARCHAR,
        ColumnType::BigBinary => wire::BINARY,
        ColumnType::BigVarBin => wire::VARBINARY,
        ColumnType::Image => wire::LONGVARBINARY,
        ColumnType::Daten => wire::DATE,
        ColumnType::Timen => wire::TIME,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2 => wire::TIMESTAMP,
        ColumnType::DatetimeOffsetn => wire::DATETIMEOFFSET,
        _ => wire::OTHER,
    }
}

fn is_null(data: &ColumnData<'_>) -> bool {
    matches!(
        data,
        ColumnData::U8(None)
            | ColumnData::I16(None)
            | ColumnData::I32(None)
            | ColumnData::I64(None)
            | ColumnData::F32(None)
            | ColumnData::F64(None)
            | ColumnData::Bit(None)
            | ColumnData::String(None)
            | ColumnData::Guid(None)
            | ColumnData::Binary(None)
            | ColumnData::Numeric(None)
            | ColumnData::Xml(None)
            | ColumnData::DateTime(None)
            | ColumnData::SmallDateTime(None)
            | ColumnData::Time(None)
            | ColumnData::Date(None)
            | ColumnData::DateTime2(None)
            | ColumnData::DateTimeOffset(None)
    )
}

/// A result set streamed from a [`TdsDatabase`].
pub struct TdsResultHandle {
    columns: Vec<(SmolStr, i32)>,
    rx: Option<mpsc::Receiver<Event>>,
    current: Option<Vec<ColumnData<'static>>>,
    was_null: bool,
    fetch_size: Option<u32>,
}

impl std::fmt::Debug for TdsResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdsResultHandle")
            .field("columns", &self.columns)
            .field("closed", &self.rx.is_none())
            .field("fetch_size", &self.fetch_size)
            .finish_non_exhaustive()
    }
}

impl TdsResultHandle {
    fn new(columns: Vec<(SmolStr, i32)>, rx: mpsc::Receiver<Event>) -> Self {
        Self {
            columns,
            rx: Some(rx),
            current: None,
            was_null: false,
            fetch_size: None,
        }
    }

    fn column(&self, index: usize) -> DatasetResult<&(SmolStr, i32)> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or_else(|| DatasetError::driver(format!("column index {index} out of range")))
    }

    fn wire_type_at(&self, index: usize) -> i32 {
        self.column(index).map(|c| c.1).unwrap_or(wire::OTHER)
    }

    fn cell(&mut self, index: usize) -> DatasetResult<&ColumnData<'static>> {
        if self.rx.is_none() {
            return Err(DatasetError::ConnectionClosed);
        }
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DatasetError::driver("no current row"))?;
        let data = index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or_else(|| DatasetError::driver(format!("column index {index} out of range")))?;
        self.was_null = is_null(data);
        Ok(data)
    }
}

macro_rules! primitive_getter {
    ($name:ident -> $ty:ty { $($pat:pat => $expr:expr),* $(,)? }) => {
        fn $name(&mut self, index: usize) -> DatasetResult<$ty> {
            let wire_type = self.wire_type_at(index);
            match *self.cell(index)? {
                $($pat => Ok($expr.unwrap_or_default()),)*
                _ => Err(DatasetError::unsupported(stringify!($name), wire_type)),
            }
        }
    };
}

#[async_trait]
impl ResultHandle for TdsResultHandle {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_label(&self, index: usize) -> DatasetResult<SmolStr> {
        self.column(index).map(|c| c.0.clone())
    }

    fn column_wire_type(&self, index: usize) -> DatasetResult<i32> {
        self.column(index).map(|c| c.1)
    }

    async fn next(&mut self) -> DatasetResult<bool> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(DatasetError::ConnectionClosed);
        };
        loop {
            match rx.recv().await {
                Some(Event::Row(row)) => {
                    self.current = Some(row);
                    return Ok(true);
                }
                Some(Event::Failed(e)) => {
                    self.current = None;
                    return Err(e);
                }
                Some(Event::Columns(_)) => continue,
                None => {
                    self.current = None;
                    return Ok(false);
                }
            }
        }
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    primitive_getter!(get_boolean -> bool {
        ColumnData::Bit(v) => v,
        ColumnData::U8(v) => v.map(|n| n != 0),
    });
    primitive_getter!(get_short -> i16 {
        ColumnData::I16(v) => v,
        ColumnData::U8(v) => v.map(i16::from),
    });
    primitive_getter!(get_int -> i32 {
        ColumnData::I32(v) => v,
        ColumnData::I16(v) => v.map(i32::from),
        ColumnData::U8(v) => v.map(i32::from),
    });
    primitive_getter!(get_long -> i64 {
        ColumnData::I64(v) => v,
        ColumnData::I32(v) => v.map(i64::from),
        ColumnData::I16(v) => v.map(i64::from),
        ColumnData::U8(v) => v.map(i64::from),
    });
    primitive_getter!(get_float -> f32 { ColumnData::F32(v) => v });
    primitive_getter!(get_double -> f64 {
        ColumnData::F64(v) => v,
        ColumnData::F32(v) => v.map(f64::from),
    });

    fn get_string(&mut self, index: usize) -> DatasetResult<Option<String>> {
        let wire_type = self.wire_type_at(index);
        let data = self.cell(index)?;
        Ok(match data {
            ColumnData::String(v) => v.as_deref().map(str::to_owned),
            ColumnData::Guid(v) => v.map(|g| g.to_string()),
            ColumnData::Xml(v) => v.clone().map(|xml| xml.into_owned().into_string()),
            ColumnData::Numeric(v) => v.map(|n| n.to_string()),
            ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| t.format(TIME_FORMAT).to_string()),
            ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)?
                .map(|t| t.format(OFFSET_FORMAT).to_string()),
            _ => return Err(DatasetError::unsupported("get_string", wire_type)),
        })
    }

    fn get_date(&mut self, index: usize) -> DatasetResult<Option<DriverDate>> {
        let wire_type = self.wire_type_at(index);
        let data = self.cell(index)?;
        let date = match data {
            ColumnData::Date(_) => NaiveDate::from_sql(data)?,
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                NaiveDateTime::from_sql(data)?.map(|ts| ts.date())
            }
            _ => return Err(DatasetError::unsupported("get_date", wire_type)),
        };
        Ok(date.map(|d| DriverDate::from_calendar(d.year(), d.month(), d.day())))
    }

    fn get_timestamp(&mut self, index: usize) -> DatasetResult<Option<DriverTimestamp>> {
        let wire_type = self.wire_type_at(index);
        let data = self.cell(index)?;
        let ts = match data {
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                NaiveDateTime::from_sql(data)?
            }
            ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(|d| d.and_time(NaiveTime::MIN)),
            _ => return Err(DatasetError::unsupported("get_timestamp", wire_type)),
        };
        Ok(ts.map(|ts| {
            DriverTimestamp::from_calendar(
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second(),
                ts.nanosecond(),
            )
        }))
    }

    fn get_big_decimal_string(&mut self, index: usize) -> DatasetResult<Option<String>> {
        let wire_type = self.wire_type_at(index);
        Ok(match self.cell(index)? {
            ColumnData::Numeric(v) => v.map(|n| n.to_string()),
            ColumnData::U8(v) => v.map(|n| n.to_string()),
            ColumnData::I16(v) => v.map(|n| n.to_string()),
            ColumnData::I32(v) => v.map(|n| n.to_string()),
            ColumnData::I64(v) => v.map(|n| n.to_string()),
            // money and smallmoney arrive as floats
            ColumnData::F32(v) => v.map(|n| n.to_string()),
            ColumnData::F64(v) => v.map(|n| n.to_string()),
            ColumnData::String(v) => v.as_deref().map(str::to_owned),
            _ => return Err(DatasetError::unsupported("get_big_decimal_string", wire_type)),
        })
    }

    fn get_bytes(&mut self, index: usize) -> DatasetResult<Option<Vec<u8>>> {
        let wire_type = self.wire_type_at(index);
        match self.cell(index)? {
            ColumnData::Binary(v) => Ok(v.as_deref().map(<[u8]>::to_vec)),
            _ => Err(DatasetError::unsupported("get_bytes", wire_type)),
        }
    }

    fn get_clob(&mut self, index: usize) -> DatasetResult<Option<Clob>> {
        let wire_type = self.wire_type_at(index);
        match self.cell(index)? {
            ColumnData::String(v) => Ok(v.as_deref().map(Clob::new)),
            ColumnData::Xml(v) => Ok(v.clone().map(|xml| Clob::new(xml.into_owned().into_string()))),
            _ => Err(DatasetError::unsupported("get_clob", wire_type)),
        }
    }

    fn get_object(&mut self, index: usize) -> DatasetResult<Value> {
        let data = self.cell(index)?;
        if is_null(data) {
            return Ok(Value::Null);
        }
        Ok(match data {
            ColumnData::Bit(v) => Value::from(*v),
            ColumnData::U8(v) => Value::from(v.map(i16::from)),
            ColumnData::I16(v) => Value::from(*v),
            ColumnData::I32(v) => Value::from(*v),
            ColumnData::I64(v) => Value::from(*v),
            ColumnData::F32(v) => Value::from(*v),
            ColumnData::F64(v) => Value::from(*v),
            ColumnData::String(v) => Value::from(v.as_deref().map(str::to_owned)),
            ColumnData::Guid(v) => Value::from(v.map(|g| g.to_string())),
            ColumnData::Binary(v) => Value::from(v.as_deref().map(<[u8]>::to_vec)),
            ColumnData::Xml(v) => Value::from(v.clone().map(|xml| xml.into_owned().into_string())),
            ColumnData::Numeric(v) => match v.map(|n| n.to_string()) {
                Some(text) => Value::Decimal(BigDecimal::from_str(&text).map_err(|e| {
                    DatasetError::driver(format!("unreadable numeric '{text}': {e}"))
                })?),
                None => Value::Null,
            },
            ColumnData::Date(_) => Value::from(NaiveDate::from_sql(data)?),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                Value::from(NaiveDateTime::from_sql(data)?.map(|ts| ts.and_utc().fixed_offset()))
            }
            ColumnData::DateTimeOffset(_) => Value::from(DateTime::<FixedOffset>::from_sql(data)?),
            ColumnData::Time(_) => {
                Value::from(NaiveTime::from_sql(data)?.map(|t| t.format(TIME_FORMAT).to_string()))
            }
        })
    }

    fn set_fetch_size(&mut self, rows: u32) {
        trace!(rows, "Fetch size recorded; rows stream one at a time");
        self.fetch_size = Some(rows);
    }

    fn close(&mut self) -> DatasetResult<()> {
        if self.rx.take().is_some() {
            trace!("Closed TDS result");
        }
        self.current = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.rx.is_none()
    }
}
