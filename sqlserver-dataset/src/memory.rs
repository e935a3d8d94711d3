//! An in-memory driver for tests.
//!
//! [`MemoryDatabase`] hands out scripted results in FIFO order, records
//! every SQL string it executes along with its bind parameters, and tracks
//! how often each handle is closed.
//!
//! ```rust
//! use sqlserver_dataset::memory::{Cell, MemoryDatabase, MemoryResult};
//! use sqlserver_dataset::wire;
//!
//! let db = MemoryDatabase::sqlserver().with_result(
//!     MemoryResult::new(vec![("id", wire::INTEGER), ("name", wire::VARCHAR)])
//!         .with_row(vec![Cell::Int(1), Cell::from("Alice")]),
//! );
//! assert_eq!(db.query_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use parking_lot::Mutex;
use smol_str::SmolStr;
use sqlserver_arel::{Engine, SQLSERVER_ADAPTER_NAME};

use crate::config::DatabaseTimezone;
use crate::database::Database;
use crate::error::{DatasetError, DatasetResult};
use crate::handle::{Clob, DriverDate, DriverTimestamp, ResultHandle};
use crate::value::Value;

/// A raw cell as the driver holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Character data; also serves time, offset and decimal strings.
    String(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Zone-less timestamp.
    Timestamp(NaiveDateTime),
    /// Binary data.
    Bytes(Vec<u8>),
    /// A driver object returned as is.
    Object(Value),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// Counters shared between a handle and the database that issued it.
#[derive(Debug, Default)]
pub struct HandleStats {
    close_calls: AtomicUsize,
    rows_fetched: AtomicUsize,
    fetch_size: AtomicU32,
}

impl HandleStats {
    /// How many times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// How many rows were advanced to.
    pub fn rows_fetched(&self) -> usize {
        self.rows_fetched.load(Ordering::SeqCst)
    }

    /// The fetch size hint received, if any.
    pub fn fetch_size(&self) -> Option<u32> {
        match self.fetch_size.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }
}

/// A scripted result set.
#[derive(Debug)]
pub struct MemoryResult {
    columns: Vec<(SmolStr, i32)>,
    rows: VecDeque<Vec<Cell>>,
    current: Option<Vec<Cell>>,
    was_null: bool,
    closed: bool,
    fail_after: Option<(usize, String)>,
    stats: Arc<HandleStats>,
}

impl MemoryResult {
    /// A result with the given columns and no rows.
    pub fn new<S: Into<SmolStr>>(columns: Vec<(S, i32)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, code)| (name.into(), code))
                .collect(),
            rows: VecDeque::new(),
            current: None,
            was_null: false,
            closed: false,
            fail_after: None,
            stats: Arc::new(HandleStats::default()),
        }
    }

    /// Append a row.
    pub fn with_row(mut self, row: Vec<Cell>) -> Self {
        self.rows.push_back(row);
        self
    }

    /// Append several rows.
    pub fn with_rows(mut self, rows: impl IntoIterator<Item = Vec<Cell>>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Fail with a driver error once `rows` rows have been returned.
    pub fn fail_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((rows, message.into()));
        self
    }

    /// Counters for this handle.
    pub fn stats(&self) -> Arc<HandleStats> {
        Arc::clone(&self.stats)
    }

    fn cell(&mut self, index: usize) -> DatasetResult<Cell> {
        if self.closed {
            return Err(DatasetError::ConnectionClosed);
        }
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DatasetError::driver("no current row"))?;
        let cell = index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .cloned()
            .ok_or_else(|| DatasetError::driver(format!("column index {index} out of range")))?;
        self.was_null = matches!(cell, Cell::Null);
        Ok(cell)
    }

    fn column(&self, index: usize) -> DatasetResult<&(SmolStr, i32)> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or_else(|| DatasetError::driver(format!("column index {index} out of range")))
    }

    fn unsupported(&self, getter: &'static str, index: usize) -> DatasetError {
        let wire_type = self.column(index).map(|c| c.1).unwrap_or_default();
        DatasetError::unsupported(getter, wire_type)
    }
}

macro_rules! primitive_getter {
    ($name:ident -> $ty:ty { $($pat:pat => $expr:expr),* $(,)? }) => {
        fn $name(&mut self, index: usize) -> DatasetResult<$ty> {
            match self.cell(index)? {
                Cell::Null => Ok(<$ty>::default()),
                $($pat => Ok($expr),)*
                _ => Err(self.unsupported(stringify!($name), index)),
            }
        }
    };
}

#[async_trait]
impl ResultHandle for MemoryResult {
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
        if self.closed {
            return Err(DatasetError::ConnectionClosed);
        }
        if let Some((after, message)) = &self.fail_after {
            if self.stats.rows_fetched() >= *after {
                return Err(DatasetError::driver(message.clone()));
            }
        }
        self.current = self.rows.pop_front();
        if self.current.is_some() {
            self.stats.rows_fetched.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.current.is_some())
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    primitive_getter!(get_boolean -> bool { Cell::Bool(v) => v });
    primitive_getter!(get_short -> i16 { Cell::Short(v) => v });
    primitive_getter!(get_int -> i32 { Cell::Int(v) => v, Cell::Short(v) => i32::from(v) });
    primitive_getter!(get_long -> i64 {
        Cell::Long(v) => v,
        Cell::Int(v) => i64::from(v),
        Cell::Short(v) => i64::from(v),
    });
    primitive_getter!(get_float -> f32 { Cell::Float(v) => v });
    primitive_getter!(get_double -> f64 { Cell::Double(v) => v, Cell::Float(v) => f64::from(v) });

    fn get_string(&mut self, index: usize) -> DatasetResult<Option<String>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::String(s) => Ok(Some(s)),
            _ => Err(self.unsupported("get_string", index)),
        }
    }

    fn get_date(&mut self, index: usize) -> DatasetResult<Option<DriverDate>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::Date(d) => Ok(Some(DriverDate::from_calendar(d.year(), d.month(), d.day()))),
            Cell::Timestamp(ts) => Ok(Some(DriverDate::from_calendar(
                ts.year(),
                ts.month(),
                ts.day(),
            ))),
            _ => Err(self.unsupported("get_date", index)),
        }
    }

    fn get_timestamp(&mut self, index: usize) -> DatasetResult<Option<DriverTimestamp>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::Timestamp(ts) => Ok(Some(DriverTimestamp::from_calendar(
                ts.year(),
                ts.month(),
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second(),
                ts.nanosecond(),
            ))),
            _ => Err(self.unsupported("get_timestamp", index)),
        }
    }

    fn get_big_decimal_string(&mut self, index: usize) -> DatasetResult<Option<String>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::String(s) => Ok(Some(s)),
            Cell::Int(v) => Ok(Some(v.to_string())),
            Cell::Long(v) => Ok(Some(v.to_string())),
            _ => Err(self.unsupported("get_big_decimal_string", index)),
        }
    }

    fn get_bytes(&mut self, index: usize) -> DatasetResult<Option<Vec<u8>>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::Bytes(b) => Ok(Some(b)),
            _ => Err(self.unsupported("get_bytes", index)),
        }
    }

    fn get_clob(&mut self, index: usize) -> DatasetResult<Option<Clob>> {
        match self.cell(index)? {
            Cell::Null => Ok(None),
            Cell::String(s) => Ok(Some(Clob::new(s))),
            _ => Err(self.unsupported("get_clob", index)),
        }
    }

    fn get_object(&mut self, index: usize) -> DatasetResult<Value> {
        Ok(match self.cell(index)? {
            Cell::Null => Value::Null,
            Cell::Bool(v) => Value::Bool(v),
            Cell::Short(v) => Value::Short(v),
            Cell::Int(v) => Value::Int(v),
            Cell::Long(v) => Value::Long(v),
            Cell::Float(v) => Value::Float(v),
            Cell::Double(v) => Value::Double(v),
            Cell::String(v) => Value::String(v),
            Cell::Date(v) => Value::Date(v),
            Cell::Timestamp(v) => Value::Timestamp(v.and_utc().fixed_offset()),
            Cell::Bytes(v) => Value::Bytes(v),
            Cell::Object(v) => v,
        })
    }

    fn set_fetch_size(&mut self, rows: u32) {
        self.stats.fetch_size.store(rows, Ordering::SeqCst);
    }

    fn close(&mut self) -> DatasetResult<()> {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        self.current = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

enum Scripted {
    Result(MemoryResult),
    Error(String),
}

/// A scripted database.
pub struct MemoryDatabase {
    adapter: Option<String>,
    timezone: DatabaseTimezone,
    responses: Mutex<VecDeque<Scripted>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
    handles: Mutex<Vec<Arc<HandleStats>>>,
}

impl MemoryDatabase {
    /// A database reporting the given adapter name.
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
            timezone: DatabaseTimezone::Utc,
            responses: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// A database reporting the SQL Server adapter.
    pub fn sqlserver() -> Self {
        Self::new(SQLSERVER_ADAPTER_NAME)
    }

    /// Set the connection timezone.
    pub fn with_timezone(mut self, timezone: DatabaseTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Queue a result for a later `execute`.
    pub fn with_result(self, result: MemoryResult) -> Self {
        self.push_result(result);
        self
    }

    /// Queue a failure for a later `execute`.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push_error(message);
        self
    }

    /// Queue a result on a shared database.
    pub fn push_result(&self, result: MemoryResult) {
        self.responses.lock().push_back(Scripted::Result(result));
    }

    /// Queue a failure on a shared database.
    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Scripted::Error(message.into()));
    }

    /// Every SQL string executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// The bind parameters of every execution, in order.
    pub fn executed_params(&self) -> Vec<Vec<Value>> {
        self.executed.lock().iter().map(|(_, params)| params.clone()).collect()
    }

    /// The last SQL string executed.
    pub fn last_query(&self) -> Option<String> {
        self.executed.lock().last().map(|(sql, _)| sql.clone())
    }

    /// Number of executed queries.
    pub fn query_count(&self) -> usize {
        self.executed.lock().len()
    }

    /// Counters of every handle issued, in order.
    pub fn handles(&self) -> Vec<Arc<HandleStats>> {
        self.handles.lock().clone()
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::sqlserver()
    }
}

impl Engine for MemoryDatabase {
    fn adapter_name(&self) -> Option<&str> {
        self.adapter.as_deref()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn execute_with(
        &self,
        sql: &str,
        params: &[Value],
    ) -> DatasetResult<Box<dyn ResultHandle>> {
        self.executed.lock().push((sql.to_owned(), params.to_vec()));
        let scripted = self.responses.lock().pop_front();
        match scripted {
            Some(Scripted::Result(result)) => {
                self.handles.lock().push(result.stats());
                Ok(Box::new(result))
            }
            Some(Scripted::Error(message)) => Err(DatasetError::driver(message)),
            None => Err(DatasetError::driver(format!("no scripted result for `{sql}`"))),
        }
    }

    fn database_timezone(&self) -> DatabaseTimezone {
        self.timezone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    #[tokio::test]
    async fn test_scripted_results_in_order() {
        let db = MemoryDatabase::sqlserver()
            .with_result(MemoryResult::new(vec![("a", wire::INTEGER)]))
            .with_error("boom");

        let mut handle = db.execute("SELECT 1").await.unwrap();
        assert!(!handle.next().await.unwrap());
        assert!(db.execute("SELECT 2").await.is_err());
        assert!(db.execute("SELECT 3").await.is_err());
        assert_eq!(db.executed(), vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
        assert_eq!(db.executed_params(), vec![Vec::<Value>::new(); 3]);
    }

    #[tokio::test]
    async fn test_params_are_recorded() {
        let db = MemoryDatabase::sqlserver()
            .with_result(MemoryResult::new(vec![("a", wire::INTEGER)]));

        db.execute_with("SELECT @P1 AS a", &[Value::Int(5)])
            .await
            .unwrap();
        assert_eq!(db.last_query().as_deref(), Some("SELECT @P1 AS a"));
        assert_eq!(db.executed_params(), vec![vec![Value::Int(5)]]);
    }

    #[tokio::test]
    async fn test_null_tracking() {
        let mut result = MemoryResult::new(vec![("a", wire::INTEGER), ("b", wire::INTEGER)])
            .with_row(vec![Cell::Null, Cell::Int(4)]);
        assert!(result.next().await.unwrap());

        assert_eq!(result.get_int(1).unwrap(), 0);
        assert!(result.was_null());
        assert_eq!(result.get_int(2).unwrap(), 4);
        assert!(!result.was_null());
        assert!(result.get_int(3).is_err());
    }

    #[tokio::test]
    async fn test_close_is_counted_and_idempotent() {
        let mut result = MemoryResult::new(vec![("a", wire::INTEGER)]);
        let stats = result.stats();
        result.close().unwrap();
        result.close().unwrap();
        assert!(result.is_closed());
        assert_eq!(stats.close_calls(), 2);
        assert!(result.next().await.is_err());
    }
}
