//! # sqlserver-adapter
//!
//! SQL Server support for ORM adapters.
//!
//! This crate provides:
//! - Dialect rewriting of ordering and locking for SQL Server query trees
//!   ([`arel`])
//! - Typed row materialization with cached column discovery ([`dataset`])
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sqlserver_adapter::prelude::*;
//! use sqlserver_adapter::dataset::memory::{Cell, MemoryDatabase, MemoryResult};
//! use sqlserver_adapter::dataset::wire;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let db = Arc::new(MemoryDatabase::sqlserver().with_result(
//!     MemoryResult::new(vec![("id", wire::INTEGER), ("name", wire::NVARCHAR)])
//!         .with_row(vec![Cell::Int(1), Cell::from("Alice")]),
//! ));
//!
//! let users = Relation::new("users");
//! let mut select = SelectManager::new(db.clone(), users.clone());
//! select
//!     .project(["id", "name"])
//!     .order([users.column("name")])
//!     .take(10);
//!
//! let dataset = Dataset::from_select(db.clone(), &select);
//! let rows = dataset.all_with(&OptionsDelta::new().as_object()).await.unwrap();
//! assert_eq!(rows[0].get_by_name("name"), Some(&Value::from("Alice")));
//! assert_eq!(
//!     db.last_query().as_deref(),
//!     Some("SELECT id, name FROM [users] ORDER BY [users].[name] ASC OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"),
//! );
//! # });
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Dialect rewriting for query trees.
pub mod arel {
    pub use sqlserver_arel::*;
}

/// Typed result materialization.
pub mod dataset {
    pub use sqlserver_dataset::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sqlserver_arel::{
        Dialect, DialectRewriter, Engine, LockInput, OrderInput, OrderSpec, Relation,
        SelectManager, SortOrder, SqlLiteral,
    };
    pub use sqlserver_dataset::{
        Database, Dataset, DatabaseTimezone, MssqlConfig, OptionsDelta, RowShape, TdsDatabase,
        TypedRow, Value,
    };
}

// Re-export key types at the crate root
pub use sqlserver_arel::{ArelError, ArelResult};
pub use sqlserver_dataset::{DatasetError, DatasetResult};
