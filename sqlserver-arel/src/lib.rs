//! # sqlserver-arel
//!
//! SQL Server dialect rewriting for ORM query trees.
//!
//! This crate turns dialect-neutral ordering and locking requests into SQL
//! that SQL Server accepts:
//! - Order inputs (columns, prepared specs, strings) normalized to comparable
//!   [`OrderSpec`] values, with function calls such as `UPPER(a,b)` kept whole
//! - Lock requests turned into table hints (`WITH (HOLDLOCK, ROWLOCK)`)
//! - SELECT rendering with `OFFSET ... FETCH` pagination and lock hints after
//!   the table source
//!
//! Rewriting only applies when the bound [`Engine`] reports the SQL Server
//! adapter; any other engine gets the generic behavior.
//!
//! ## Ordering
//!
//! ```rust
//! use sqlserver_arel::{ColumnRef, OrderSpec, Relation, SqlLiteral, dedup_orders, expand_orders};
//!
//! let users = Relation::new("users");
//! let mut specs = expand_orders([users.column("name")]);
//! specs.extend(expand_orders(["users.name ASC, created_at DESC"]));
//!
//! // The column reference and the parsed string sort on the same thing.
//! assert_eq!(dedup_orders(specs), vec![
//!     OrderSpec::asc(ColumnRef::new("users", "name")),
//!     OrderSpec::desc(SqlLiteral::new("created_at")),
//! ]);
//! ```
//!
//! ## Locking
//!
//! ```rust
//! use sqlserver_arel::{DialectRewriter, NamedEngine};
//!
//! let rewriter = DialectRewriter::for_engine(&NamedEngine::sqlserver());
//! assert_eq!(rewriter.rewrite_lock(true).as_deref(), Some("WITH (HOLDLOCK, ROWLOCK)"));
//!
//! let rewriter = DialectRewriter::for_engine(&NamedEngine::new("PostgreSQLAdapter"));
//! assert_eq!(rewriter.rewrite_lock(true).as_deref(), Some("FOR UPDATE"));
//! ```

pub mod engine;
pub mod error;
pub mod lock;
pub mod logging;
pub mod nodes;
pub mod order;
pub mod rewriter;
pub mod select;

pub use engine::{Dialect, Engine, NamedEngine, SQLSERVER_ADAPTER_NAME};
pub use error::{ArelError, ArelResult};
pub use lock::{
    GENERIC_DEFAULT_LOCK, LockInput, SQLSERVER_DEFAULT_LOCK, SQLSERVER_UPDATE_LOCK, lock_sql,
};
pub use nodes::{
    Attribute, ColumnRef, LockIntent, OrderExpr, OrderNode, OrderSpec, Relation, SortOrder,
    SqlLiteral,
};
pub use order::{OrderInput, dedup_orders, expand_orders, parse_order_text, split_order_text};
pub use rewriter::DialectRewriter;
pub use select::{SelectManager, SelectStatement};
