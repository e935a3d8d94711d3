//! Ordering and locking nodes.
//!
//! These are the comparable building blocks the rewriter produces and the
//! SELECT renderer consumes. [`OrderSpec`] equality is defined over what a
//! term actually sorts on, so a spec built from a column reference and the
//! same term parsed back out of a string compare equal and deduplicate.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::engine::Dialect;

/// Sort order for ORDER BY terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Parse an `ASC`/`DESC` keyword, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        if keyword.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if keyword.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A table, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Table name.
    pub name: Cow<'static, str>,
    /// Alias used in the FROM clause.
    pub alias: Option<Cow<'static, str>>,
}

impl Relation {
    /// Create a relation for a table.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// Alias this relation.
    pub fn aliased(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name columns are qualified with: the alias if present, else the table name.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Reference a column of this relation.
    pub fn column(&self, name: impl Into<Cow<'static, str>>) -> Attribute {
        Attribute {
            relation: self.clone(),
            name: name.into(),
        }
    }
}

/// A column reference that still knows the relation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    /// Owning relation.
    pub relation: Relation,
    /// Column name.
    pub name: Cow<'static, str>,
}

impl Attribute {
    /// Resolve to a table-qualified column, taking the qualifier from the relation.
    pub fn to_column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.relation.qualifier(), self.name.as_ref())
    }

    /// Ascending order on this column.
    pub fn asc(&self) -> OrderSpec {
        OrderSpec::asc(self.to_column_ref())
    }

    /// Descending order on this column.
    pub fn desc(&self) -> OrderSpec {
        OrderSpec::desc(self.to_column_ref())
    }
}

/// A resolved, table-qualified column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Table name or alias.
    pub table: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Create a column reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// `table.column` without quoting.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    /// Render with dialect quoting.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        format!(
            "{}.{}",
            dialect.quote_identifier(&self.table),
            dialect.quote_identifier(&self.column)
        )
    }
}

/// Raw SQL emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    /// Wrap raw SQL.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// The SQL text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the SQL text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SqlLiteral {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SqlLiteral {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What an ORDER BY term sorts on.
#[derive(Debug, Clone)]
pub enum OrderExpr {
    /// A resolved column.
    Column(ColumnRef),
    /// Raw SQL.
    Sql(SqlLiteral),
}

impl OrderExpr {
    /// Identity used for equality and hashing.
    ///
    /// Columns compare as `table.column`; raw SQL compares by its trimmed
    /// text with identifier brackets removed. `users.name`, `[users].[name]`
    /// and the column reference `users.name` all share one identity.
    pub fn identity(&self) -> Cow<'_, str> {
        match self {
            Self::Column(col) => Cow::Owned(col.qualified_name()),
            Self::Sql(sql) => {
                let text = sql.as_str().trim();
                if text.contains(['[', ']']) {
                    Cow::Owned(text.chars().filter(|c| !matches!(c, '[' | ']')).collect())
                } else {
                    Cow::Borrowed(text)
                }
            }
        }
    }

    /// Render for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Self::Column(col) => col.to_sql(dialect),
            Self::Sql(sql) => sql.as_str().to_owned(),
        }
    }
}

impl PartialEq for OrderExpr {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for OrderExpr {}

impl Hash for OrderExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl From<ColumnRef> for OrderExpr {
    fn from(col: ColumnRef) -> Self {
        Self::Column(col)
    }
}

impl From<SqlLiteral> for OrderExpr {
    fn from(sql: SqlLiteral) -> Self {
        Self::Sql(sql)
    }
}

impl From<&str> for OrderExpr {
    fn from(sql: &str) -> Self {
        Self::Sql(SqlLiteral::new(sql))
    }
}

/// One ORDER BY term with its direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderSpec {
    /// `expr ASC`
    Ascending(OrderExpr),
    /// `expr DESC`
    Descending(OrderExpr),
}

impl OrderSpec {
    /// Create a spec with an explicit direction.
    pub fn new(expr: impl Into<OrderExpr>, order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => Self::Ascending(expr.into()),
            SortOrder::Desc => Self::Descending(expr.into()),
        }
    }

    /// Ascending spec.
    pub fn asc(expr: impl Into<OrderExpr>) -> Self {
        Self::Ascending(expr.into())
    }

    /// Descending spec.
    pub fn desc(expr: impl Into<OrderExpr>) -> Self {
        Self::Descending(expr.into())
    }

    /// The sorted expression.
    pub fn expr(&self) -> &OrderExpr {
        match self {
            Self::Ascending(expr) | Self::Descending(expr) => expr,
        }
    }

    /// The direction.
    pub fn direction(&self) -> SortOrder {
        match self {
            Self::Ascending(_) => SortOrder::Asc,
            Self::Descending(_) => SortOrder::Desc,
        }
    }

    /// The same expression in the opposite direction.
    pub fn reverse(&self) -> Self {
        Self::new(self.expr().clone(), self.direction().reverse())
    }

    /// Render as `expr ASC|DESC`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        format!("{} {}", self.expr().to_sql(dialect), self.direction())
    }
}

/// An entry in a query's order list.
///
/// The generic dialect keeps whatever it was handed; only the SQL Server
/// rewriter normalizes everything to [`OrderSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderNode {
    /// A directed term.
    Spec(OrderSpec),
    /// A bare column.
    Column(ColumnRef),
    /// Raw SQL, rendered as is.
    Sql(SqlLiteral),
}

impl OrderNode {
    /// Render for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Self::Spec(spec) => spec.to_sql(dialect),
            Self::Column(col) => col.to_sql(dialect),
            Self::Sql(sql) => sql.as_str().to_owned(),
        }
    }

    /// The spec, if this node is one.
    pub fn as_spec(&self) -> Option<&OrderSpec> {
        match self {
            Self::Spec(spec) => Some(spec),
            _ => None,
        }
    }
}

impl From<OrderSpec> for OrderNode {
    fn from(spec: OrderSpec) -> Self {
        Self::Spec(spec)
    }
}

/// Row locking requested for a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LockIntent {
    /// No locking.
    #[default]
    NoLock,
    /// The dialect's default row lock.
    DefaultLock,
    /// Caller-supplied hint text.
    CustomLock(String),
}

impl LockIntent {
    /// Check if any lock was requested.
    pub fn is_locked(&self) -> bool {
        !matches!(self, Self::NoLock)
    }
}
