//! Error types for dialect rewriting.

use thiserror::Error;

/// Result type for rewriting operations.
pub type ArelResult<T> = Result<T, ArelError>;

/// Errors raised by the SQL Server rewriter.
///
/// Ordinary rewriting never fails: when the engine is not SQL Server the
/// generic behavior is used instead. Only the strict entry points
/// ([`DialectRewriter::sqlserver`](crate::DialectRewriter::sqlserver) and
/// [`SelectManager::to_sqlserver_sql`](crate::SelectManager::to_sqlserver_sql))
/// report a mismatch, since calling them on another dialect is a programming
/// error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArelError {
    /// A SQL Server only path was used against a different adapter.
    #[error(
        "sql server rewrite requested on a {} connection",
        .adapter.as_deref().unwrap_or("disconnected")
    )]
    DialectMismatch {
        /// Adapter name reported by the engine, if it has a connection.
        adapter: Option<String>,
    },
}

impl ArelError {
    /// Create a dialect mismatch error.
    pub fn dialect_mismatch(adapter: Option<&str>) -> Self {
        Self::DialectMismatch {
            adapter: adapter.map(str::to_owned),
        }
    }

    /// Check if this is a dialect mismatch.
    pub fn is_dialect_mismatch(&self) -> bool {
        matches!(self, Self::DialectMismatch { .. })
    }
}
