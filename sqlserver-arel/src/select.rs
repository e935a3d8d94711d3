//! SELECT statement building and rendering.
//!
//! [`SelectManager`] collects a single-table SELECT and renders it for the
//! bound engine's dialect. Under SQL Server:
//!
//! - the lock hint follows the table source: `FROM [users] WITH (HOLDLOCK, ROWLOCK)`
//! - pagination is `OFFSET n ROWS FETCH NEXT m ROWS ONLY`, with the offset
//!   defaulting to 0 when only a limit is set
//! - a zero limit renders `FETCH FIRST (SELECT 0) ROWS ONLY`
//! - OFFSET requires an ORDER BY, so one is added when missing
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlserver_arel::{NamedEngine, Relation, SelectManager};
//!
//! let mut query = SelectManager::new(Arc::new(NamedEngine::sqlserver()), Relation::new("users"));
//! query.project(["id", "name"]).order(["name DESC"]).lock(true).take(10);
//!
//! assert_eq!(
//!     query.to_sql(),
//!     "SELECT id, name FROM [users] WITH (HOLDLOCK, ROWLOCK) ORDER BY name DESC \
//!      OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
//! );
//! ```

use std::fmt::Write;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;
use tracing::debug;

use crate::engine::{Dialect, Engine};
use crate::error::{ArelError, ArelResult};
use crate::lock::{LockInput, lock_sql};
use crate::nodes::{ColumnRef, LockIntent, OrderNode, OrderSpec, Relation, SqlLiteral};
use crate::order::OrderInput;
use crate::rewriter::DialectRewriter;

/// Last ` AS ` in a projection.
static PROJECTION_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AS\s+").expect("alias pattern is valid"));

/// Projection used by existence checks, never a useful sort key.
const ONE_AS_ONE: &str = "1 AS one";

/// Order used when nothing else identifies a row.
const NULL_ORDER: &str = "(SELECT NULL)";

/// The parts of a single-table SELECT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectStatement {
    /// Table source.
    pub relation: Option<Relation>,
    /// Projected expressions. Empty means `*`.
    pub projections: Vec<String>,
    /// WHERE conditions, joined with AND.
    pub wheres: Vec<String>,
    /// ORDER BY entries.
    pub orders: Vec<OrderNode>,
    /// Requested locking.
    pub lock: LockIntent,
    /// Row limit.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: Option<u64>,
    /// SELECT DISTINCT.
    pub distinct: bool,
    /// Primary key column, used as the fallback sort key.
    pub primary_key: Option<String>,
}

/// Builds a SELECT bound to an engine.
///
/// Builder methods mutate in place and return `&mut Self`, so `order` and
/// `lock` can be called repeatedly while a query is assembled.
#[derive(Clone)]
pub struct SelectManager {
    engine: Arc<dyn Engine>,
    ast: SelectStatement,
}

impl std::fmt::Debug for SelectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectManager")
            .field("adapter", &self.engine.adapter_name())
            .field("ast", &self.ast)
            .finish()
    }
}

impl SelectManager {
    /// Start a SELECT from a relation.
    pub fn new(engine: Arc<dyn Engine>, relation: Relation) -> Self {
        Self {
            engine,
            ast: SelectStatement {
                relation: Some(relation),
                ..Default::default()
            },
        }
    }

    /// The statement built so far.
    pub fn ast(&self) -> &SelectStatement {
        &self.ast
    }

    /// The dialect of the bound engine, checked now.
    pub fn dialect(&self) -> Dialect {
        Dialect::detect(self.engine.as_ref())
    }

    fn rewriter(&self) -> DialectRewriter {
        DialectRewriter::for_engine(self.engine.as_ref())
    }

    /// Add projected expressions.
    pub fn project<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ast.projections.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add a WHERE condition.
    pub fn filter(&mut self, condition: impl Into<String>) -> &mut Self {
        self.ast.wheres.push(condition.into());
        self
    }

    /// Select distinct rows.
    pub fn distinct(&mut self) -> &mut Self {
        self.ast.distinct = true;
        self
    }

    /// Declare the primary key column.
    pub fn primary_key(&mut self, column: impl Into<String>) -> &mut Self {
        self.ast.primary_key = Some(column.into());
        self
    }

    /// Append ORDER BY terms.
    pub fn order<I>(&mut self, inputs: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<OrderInput>,
    {
        self.ast.orders = self.rewriter().rewrite_order(&self.ast.orders, inputs);
        self
    }

    /// Set row locking.
    pub fn lock(&mut self, input: impl Into<LockInput>) -> &mut Self {
        self.ast.lock = self.rewriter().lock_intent(input);
        self
    }

    /// Limit the number of rows.
    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.ast.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.ast.offset = Some(offset);
        self
    }

    /// Render for the bound engine's dialect.
    pub fn to_sql(&self) -> String {
        let dialect = self.dialect();
        let sql = match dialect {
            Dialect::SqlServer => render_sqlserver(&self.ast),
            Dialect::Generic => render_generic(&self.ast),
        };
        debug!(sql = %sql, ?dialect, "Rendered select");
        sql
    }

    /// Render as SQL Server, failing if the engine is another dialect.
    pub fn to_sqlserver_sql(&self) -> ArelResult<String> {
        match self.dialect() {
            Dialect::SqlServer => Ok(render_sqlserver(&self.ast)),
            Dialect::Generic => Err(ArelError::dialect_mismatch(self.engine.adapter_name())),
        }
    }
}

fn push_projection_and_source(sql: &mut String, stmt: &SelectStatement, dialect: Dialect) {
    sql.push_str("SELECT ");
    if stmt.distinct {
        sql.push_str("DISTINCT ");
    }
    if stmt.projections.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&stmt.projections.join(", "));
    }

    if let Some(relation) = &stmt.relation {
        let _ = write!(sql, " FROM {}", dialect.quote_identifier(&relation.name));
        if let Some(alias) = &relation.alias {
            let _ = write!(sql, " {}", dialect.quote_identifier(alias));
        }
    }
}

fn push_wheres(sql: &mut String, stmt: &SelectStatement) {
    if !stmt.wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&stmt.wheres.join(" AND "));
    }
}

fn push_orders(sql: &mut String, orders: &[OrderNode], dialect: Dialect) {
    if orders.is_empty() {
        return;
    }
    sql.push_str(" ORDER BY ");
    for (i, order) in orders.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&order.to_sql(dialect));
    }
}

/// A projection with its trailing alias removed.
fn strip_alias(projection: &str) -> &str {
    match PROJECTION_ALIAS.find_iter(projection).last() {
        Some(m) => projection[..m.start()].trim(),
        None => projection.trim(),
    }
}

/// An order that makes OFFSET/FETCH deterministic.
fn deterministic_order(stmt: &SelectStatement) -> OrderNode {
    let projection = stmt
        .projections
        .iter()
        .map(|p| p.trim())
        .find(|p| !p.contains('*') && !p.eq_ignore_ascii_case(ONE_AS_ONE));
    if let Some(projection) = projection {
        return OrderNode::Spec(OrderSpec::asc(SqlLiteral::new(strip_alias(projection))));
    }

    match (&stmt.relation, &stmt.primary_key) {
        (Some(relation), Some(pk)) => {
            OrderNode::Spec(OrderSpec::asc(ColumnRef::new(relation.qualifier(), pk.as_str())))
        }
        _ => OrderNode::Sql(SqlLiteral::new(NULL_ORDER)),
    }
}

fn render_sqlserver(stmt: &SelectStatement) -> String {
    let dialect = Dialect::SqlServer;
    let mut sql = String::with_capacity(128);

    push_projection_and_source(&mut sql, stmt, dialect);
    if let Some(hint) = lock_sql(&stmt.lock, dialect) {
        sql.push(' ');
        sql.push_str(&hint);
    }
    push_wheres(&mut sql, stmt);

    let paginated = stmt.limit.is_some() || stmt.offset.is_some();
    if paginated && stmt.orders.is_empty() {
        push_orders(&mut sql, &[deterministic_order(stmt)], dialect);
    } else {
        push_orders(&mut sql, &stmt.orders, dialect);
    }

    if paginated {
        let _ = write!(sql, " OFFSET {} ROWS", stmt.offset.unwrap_or(0));
        match stmt.limit {
            Some(0) => sql.push_str(" FETCH FIRST (SELECT 0) ROWS ONLY"),
            Some(limit) => {
                let _ = write!(sql, " FETCH NEXT {limit} ROWS ONLY");
            }
            None => {}
        }
    }

    sql
}

fn render_generic(stmt: &SelectStatement) -> String {
    let dialect = Dialect::Generic;
    let mut sql = String::with_capacity(128);

    push_projection_and_source(&mut sql, stmt, dialect);
    push_wheres(&mut sql, stmt);
    push_orders(&mut sql, &stmt.orders, dialect);

    if let Some(limit) = stmt.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }
    if let Some(offset) = stmt.offset {
        let _ = write!(sql, " OFFSET {offset}");
    }
    if let Some(lock) = lock_sql(&stmt.lock, dialect) {
        sql.push(' ');
        sql.push_str(&lock);
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NamedEngine;
    use pretty_assertions::assert_eq;

    fn sqlserver(table: &'static str) -> SelectManager {
        SelectManager::new(Arc::new(NamedEngine::sqlserver()), Relation::new(table))
    }

    fn generic(table: &'static str) -> SelectManager {
        SelectManager::new(
            Arc::new(NamedEngine::new("PostgreSQLAdapter")),
            Relation::new(table),
        )
    }

    #[test]
    fn test_plain_select() {
        let query = sqlserver("users");
        assert_eq!(query.to_sql(), "SELECT * FROM [users]");
    }

    #[test]
    fn test_lock_hint_follows_table() {
        let mut query = sqlserver("users");
        query.filter("id = 1").lock(true);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM [users] WITH (HOLDLOCK, ROWLOCK) WHERE id = 1"
        );
    }

    #[test]
    fn test_for_update_text_becomes_updlock() {
        let mut query = sqlserver("users");
        query.lock("FOR UPDATE");
        assert_eq!(query.to_sql(), "SELECT * FROM [users] WITH (UPDLOCK)");
    }

    #[test]
    fn test_offset_without_order_uses_first_projection() {
        let mut query = sqlserver("users");
        query.project(["name AS display_name", "email"]).skip(20).take(10);
        assert_eq!(
            query.to_sql(),
            "SELECT name AS display_name, email FROM [users] ORDER BY name ASC \
             OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_offset_without_order_falls_back_to_primary_key() {
        let mut query = sqlserver("users");
        query.primary_key("id").take(5);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM [users] ORDER BY [users].[id] ASC OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );

        let mut query = sqlserver("audit");
        query.skip(3);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM [audit] ORDER BY (SELECT NULL) OFFSET 3 ROWS"
        );
    }

    #[test]
    fn test_zero_limit() {
        let mut query = sqlserver("users");
        query.order(["id"]).take(0);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM [users] ORDER BY id ASC OFFSET 0 ROWS FETCH FIRST (SELECT 0) ROWS ONLY"
        );
    }

    #[test]
    fn test_aliased_relation_orders() {
        let users = Relation::new("users").aliased("u");
        let mut query = SelectManager::new(Arc::new(NamedEngine::sqlserver()), users.clone());
        query.order([users.column("name")]).order(["UPPER(a,b) DESC"]);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM [users] [u] ORDER BY [u].[name] ASC, UPPER(a,b) DESC"
        );
    }

    #[test]
    fn test_generic_rendering() {
        let mut query = generic("users");
        query.order(["name DESC"]).lock(true).take(10).skip(5);
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM \"users\" ORDER BY name DESC LIMIT 10 OFFSET 5 FOR UPDATE"
        );
        assert!(query.to_sqlserver_sql().is_err());
    }

    #[test]
    fn test_strip_alias() {
        assert_eq!(strip_alias("COUNT(*) AS total"), "COUNT(*)");
        assert_eq!(strip_alias("CAST(x AS int) as y"), "CAST(x AS int)");
        assert_eq!(strip_alias("name"), "name");
    }
}
