//! Immutable, cloneable query descriptors.
//!
//! A [`Dataset`] pairs a connection with [`DatasetOptions`]. It is never
//! changed in place: [`Dataset::with_options`] returns a new dataset with
//! the delta merged in. Each dataset owns a column cache behind its own
//! mutex; a derived dataset starts with a copy of its parent's cache unless
//! the delta replaces the SQL, in which case it starts empty.
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlserver_dataset::{Dataset, OptionsDelta};
//! use sqlserver_dataset::memory::MemoryDatabase;
//!
//! let db = Arc::new(MemoryDatabase::sqlserver());
//! let users = Dataset::new(db, "SELECT id, name FROM users");
//! let batched = users.with_options(&OptionsDelta::new().fetch_size(500));
//! let admins = users.with_sql("SELECT id, name FROM users WHERE admin = 1");
//!
//! assert_eq!(users.clone(), users);
//! assert_ne!(batched, users);
//! assert_eq!(admins.sql(), "SELECT id, name FROM users WHERE admin = 1");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use sqlserver_arel::SelectManager;
use tracing::debug;

use crate::cursor::ResultCursor;
use crate::database::Database;
use crate::error::{DatasetError, DatasetResult};
use crate::options::{DatasetOptions, OptionsDelta};
use crate::value::{ColumnDescriptor, TypedRow, Value};

/// Build the one-row query used to discover a query's columns.
pub fn probe_sql(sql: &str) -> String {
    format!("SELECT TOP 1 [T1].* FROM ({sql}) \"T1\"")
}

#[derive(Debug, Clone, Default)]
struct ColumnCache {
    columns: Option<Arc<[ColumnDescriptor]>>,
}

/// A query descriptor bound to a connection.
pub struct Dataset {
    db: Arc<dyn Database>,
    opts: DatasetOptions,
    cache: Mutex<ColumnCache>,
}

impl Dataset {
    /// Create a dataset for a SQL string.
    pub fn new(db: Arc<dyn Database>, sql: impl Into<String>) -> Self {
        Self::with_opts(db, DatasetOptions::new(sql))
    }

    /// Create a dataset from full options.
    pub fn with_opts(db: Arc<dyn Database>, opts: DatasetOptions) -> Self {
        Self {
            db,
            opts,
            cache: Mutex::new(ColumnCache::default()),
        }
    }

    /// Create a dataset from a rendered SELECT.
    pub fn from_select(db: Arc<dyn Database>, select: &SelectManager) -> Self {
        Self::new(db, select.to_sql())
    }

    /// The query text.
    pub fn sql(&self) -> &str {
        &self.opts.sql
    }

    /// The options.
    pub fn options(&self) -> &DatasetOptions {
        &self.opts
    }

    /// The connection.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// A new dataset with `delta` merged into the options.
    ///
    /// The column cache is copied unless the delta replaces the SQL.
    pub fn with_options(&self, delta: &OptionsDelta) -> Self {
        let cache = if delta.touches_sql() {
            ColumnCache::default()
        } else {
            self.cache.lock().clone()
        };
        debug!(
            inherits_columns = cache.columns.is_some(),
            touches_sql = delta.touches_sql(),
            "Derived dataset"
        );
        Self {
            db: Arc::clone(&self.db),
            opts: self.opts.merge(delta),
            cache: Mutex::new(cache),
        }
    }

    /// A new dataset running different SQL, with an empty column cache.
    pub fn with_sql(&self, sql: impl Into<String>) -> Self {
        self.with_options(&OptionsDelta::new().sql(sql))
    }

    /// A new dataset with different bind parameters. The column cache is kept.
    pub fn with_params<I, V>(&self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with_options(&OptionsDelta::new().params(params))
    }

    /// Cached column descriptors, if any.
    pub fn cache_get(&self) -> Option<Arc<[ColumnDescriptor]>> {
        self.cache.lock().columns.clone()
    }

    /// Store column descriptors in the cache.
    pub fn cache_set(&self, columns: Arc<[ColumnDescriptor]>) {
        self.cache.lock().columns = Some(columns);
    }

    /// Drop the cached column descriptors.
    ///
    /// Takes `&mut self`: only a dataset nobody else holds can be cleared.
    pub fn clear_columns_cache(&mut self) {
        self.cache.get_mut().columns = None;
    }

    /// Column descriptors, probing the database only when none are cached.
    pub async fn columns(&self) -> DatasetResult<Arc<[ColumnDescriptor]>> {
        if let Some(columns) = self.cache_get() {
            return Ok(columns);
        }
        self.probe_columns().await
    }

    /// Discover column descriptors by running a one-row probe query.
    ///
    /// The fetched row is discarded; the descriptors replace the cache.
    pub async fn probe_columns(&self) -> DatasetResult<Arc<[ColumnDescriptor]>> {
        let sql = probe_sql(&self.opts.sql);
        debug!(sql = %sql, params = self.opts.params.len(), "Probing columns");

        let columns = match self.run_probe(&sql).await {
            Ok(columns) => columns,
            Err(e) => return Err(DatasetError::probe(sql, e)),
        };
        self.cache_set(Arc::clone(&columns));
        Ok(columns)
    }

    async fn run_probe(&self, sql: &str) -> DatasetResult<Arc<[ColumnDescriptor]>> {
        let handle = self.db.execute_with(sql, &self.opts.params).await?;
        let mut cursor = ResultCursor::open(
            handle,
            self.opts.row_shape,
            None,
            self.opts.conversion_options(self.db.database_timezone()),
        )?;
        cursor.next_row().await?;
        cursor.close();
        Ok(cursor.shared_columns())
    }

    /// Open a cursor over this dataset's query, merged with `delta`.
    ///
    /// The descriptors the cursor reads are cached when the delta keeps
    /// this dataset's SQL and nothing is cached yet.
    pub async fn cursor(&self, delta: &OptionsDelta) -> DatasetResult<ResultCursor> {
        let opts = self.opts.merge(delta);
        debug!(
            sql = %opts.sql,
            params = opts.params.len(),
            shape = %opts.row_shape,
            "Executing query"
        );

        let handle = self.db.execute_with(&opts.sql, &opts.params).await?;
        let cursor = ResultCursor::open(
            handle,
            opts.row_shape,
            opts.fetch_size,
            opts.conversion_options(self.db.database_timezone()),
        )?;

        if !delta.touches_sql() {
            let mut cache = self.cache.lock();
            if cache.columns.is_none() {
                cache.columns = Some(cursor.shared_columns());
            }
        }
        Ok(cursor)
    }

    /// Run the query and pass each row to `f`. Returns the dataset itself.
    pub async fn each<F>(&self, delta: &OptionsDelta, mut f: F) -> DatasetResult<&Self>
    where
        F: FnMut(TypedRow),
    {
        let mut cursor = self.cursor(delta).await?;
        while let Some(row) = cursor.next_row().await? {
            f(row);
        }
        Ok(self)
    }

    /// Run the query and collect every row.
    pub async fn all(&self) -> DatasetResult<Vec<TypedRow>> {
        self.all_with(&OptionsDelta::new()).await
    }

    /// Run the query with extra options and collect every row.
    pub async fn all_with(&self, delta: &OptionsDelta) -> DatasetResult<Vec<TypedRow>> {
        let mut rows = Vec::new();
        self.each(delta, |row| rows.push(row)).await?;
        debug!(rows = rows.len(), "Collected rows");
        Ok(rows)
    }

    /// Run the query and return its rows as a stream.
    pub async fn stream(
        &self,
        delta: &OptionsDelta,
    ) -> DatasetResult<BoxStream<'static, DatasetResult<TypedRow>>> {
        Ok(self.cursor(delta).await?.into_stream().boxed())
    }
}

impl Clone for Dataset {
    fn clone(&self) -> Self {
        self.with_options(&OptionsDelta::new())
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.db), Arc::as_ptr(&other.db)) && self.opts == other.opts
    }
}

impl Eq for Dataset {}

impl Hash for Dataset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.db).cast::<()>().hash(state);
        self.opts.hash(state);
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("adapter", &self.db.adapter_name())
            .field("opts", &self.opts)
            .field("columns_cached", &self.cache.lock().columns.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Cell, MemoryDatabase, MemoryResult};
    use crate::value::{RowShape, Value};
    use crate::wire;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn users_result() -> MemoryResult {
        MemoryResult::new(vec![("id", wire::INTEGER), ("name", wire::NVARCHAR)])
            .with_row(vec![Cell::Int(1), Cell::from("ada")])
    }

    #[test]
    fn test_probe_sql() {
        assert_eq!(
            probe_sql("SELECT * FROM users"),
            "SELECT TOP 1 [T1].* FROM (SELECT * FROM users) \"T1\""
        );
    }

    #[tokio::test]
    async fn test_columns_probe_once() {
        let db = Arc::new(MemoryDatabase::sqlserver().with_result(users_result()));
        let ds = Dataset::new(db.clone(), "SELECT id, name FROM users");

        let first = ds.columns().await.unwrap();
        let second = ds.columns().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(db.query_count(), 1);
        assert_eq!(
            db.last_query().unwrap(),
            "SELECT TOP 1 [T1].* FROM (SELECT id, name FROM users) \"T1\""
        );
        assert_eq!(
            first.to_vec(),
            vec![
                ColumnDescriptor::new("id", wire::INTEGER, 1),
                ColumnDescriptor::new("name", wire::NVARCHAR, 2),
            ]
        );
        assert_eq!(db.handles()[0].close_calls(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_is_probe_error() {
        let db = Arc::new(MemoryDatabase::sqlserver().with_error("Invalid object name 'nope'"));
        let ds = Dataset::new(db, "SELECT * FROM nope");

        let err = ds.columns().await.unwrap_err();
        assert!(err.is_probe_error());
        assert!(ds.cache_get().is_none());
    }

    #[tokio::test]
    async fn test_clone_equality_and_hash() {
        let db: Arc<dyn Database> = Arc::new(MemoryDatabase::sqlserver());
        let ds = Dataset::new(Arc::clone(&db), "SELECT 1");
        let copy = ds.clone();
        let other_db = Dataset::new(Arc::new(MemoryDatabase::sqlserver()), "SELECT 1");

        assert_eq!(copy, ds);
        assert_ne!(other_db, ds);

        let set: HashSet<Dataset> = [ds.clone(), copy, other_db].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_inherited_unless_sql_changes() {
        let db = Arc::new(MemoryDatabase::sqlserver().with_result(users_result()));
        let ds = Dataset::new(db.clone(), "SELECT id, name FROM users");
        let columns = ds.columns().await.unwrap();

        let shaped = ds.with_options(&OptionsDelta::new().as_object().fetch_size(10));
        assert_eq!(shaped.columns().await.unwrap(), columns);
        assert_eq!(db.query_count(), 1);

        let changed = ds.with_sql("SELECT id FROM users");
        assert!(changed.cache_get().is_none());

        let same_sql = ds.with_options(&OptionsDelta::new().sql("SELECT id, name FROM users"));
        assert!(same_sql.cache_get().is_none());
    }

    #[tokio::test]
    async fn test_clone_does_not_share_cache() {
        let db = Arc::new(MemoryDatabase::sqlserver());
        let ds = Dataset::new(db, "SELECT 1");
        let copy = ds.clone();

        copy.cache_set(Arc::from(vec![ColumnDescriptor::new("one", wire::INTEGER, 1)]));
        assert!(ds.cache_get().is_none());
        assert!(copy.cache_get().is_some());
    }

    #[tokio::test]
    async fn test_clear_columns_cache() {
        let db = Arc::new(MemoryDatabase::sqlserver());
        let mut ds = Dataset::new(db, "SELECT 1");
        ds.cache_set(Arc::from(vec![ColumnDescriptor::new("one", wire::INTEGER, 1)]));
        ds.clear_columns_cache();
        assert!(ds.cache_get().is_none());
    }

    #[tokio::test]
    async fn test_each_returns_self_and_caches_columns() {
        let db = Arc::new(MemoryDatabase::sqlserver().with_result(users_result()));
        let ds = Dataset::new(db.clone(), "SELECT id, name FROM users");

        let mut seen = Vec::new();
        let returned = ds
            .each(&OptionsDelta::new().as_object(), |row| seen.push(row))
            .await
            .unwrap();

        assert!(std::ptr::eq(returned, &ds));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shape(), RowShape::Labeled);
        assert_eq!(seen[0].get_by_name("name"), Some(&Value::from("ada")));

        assert_eq!(ds.columns().await.unwrap().len(), 2);
        assert_eq!(db.query_count(), 1);
    }

    #[tokio::test]
    async fn test_params_reach_driver() {
        let db = Arc::new(
            MemoryDatabase::sqlserver()
                .with_result(users_result())
                .with_result(users_result()),
        );
        let ds = Dataset::new(db.clone(), "SELECT id, name FROM users WHERE id = @P1")
            .with_params([1_i64]);

        ds.columns().await.unwrap();
        ds.all().await.unwrap();

        assert_eq!(
            db.executed_params(),
            vec![vec![Value::Long(1)], vec![Value::Long(1)]]
        );
        assert_eq!(
            ds.with_params(["ada"]).options().params,
            vec![Value::from("ada")]
        );
        assert!(ds.with_params(["ada"]).cache_get().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_columns_and_iteration() {
        let db = Arc::new(MemoryDatabase::sqlserver());
        for _ in 0..16 {
            db.push_result(users_result());
        }
        let shared = Arc::new(Dataset::new(db.clone(), "SELECT id, name FROM users"));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let columns = shared.columns().await.unwrap();
                    let copy = shared.as_ref().clone();
                    let mut rows = 0;
                    copy.each(&OptionsDelta::new(), |_| rows += 1).await.unwrap();
                    (columns, rows)
                })
            })
            .collect();

        for task in tasks {
            let (columns, rows) = task.await.unwrap();
            assert_eq!(columns.len(), 2);
            assert_eq!(rows, 1);
        }
        assert_eq!(shared.cache_get().unwrap().len(), 2);
        assert!((9..=16).contains(&db.query_count()));
        assert!(db.handles().iter().all(|h| h.close_calls() == 1));
    }

    #[tokio::test]
    async fn test_fetch_size_reaches_driver() {
        let db = Arc::new(MemoryDatabase::sqlserver().with_result(users_result()));
        let ds = Dataset::new(db.clone(), "SELECT id, name FROM users")
            .with_options(&OptionsDelta::new().fetch_size(100));

        ds.all().await.unwrap();
        assert_eq!(db.handles()[0].fetch_size(), Some(100));
    }
}
