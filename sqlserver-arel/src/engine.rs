//! Execution engine identity and dialect detection.

use std::borrow::Cow;

/// Adapter name a SQL Server connection reports.
pub const SQLSERVER_ADAPTER_NAME: &str = "SQLServerAdapter";

/// The execution engine a query is bound to.
///
/// Only identity is needed here: detection runs on every query build, so
/// implementations must answer from memory without touching the network.
pub trait Engine: Send + Sync {
    /// Name of the adapter behind the current connection, or `None` when
    /// the engine is not connected.
    fn adapter_name(&self) -> Option<&str>;
}

/// SQL dialect chosen for a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// SQL Server: lock hints, bracket quoting, OFFSET/FETCH pagination.
    SqlServer,
    /// Any other adapter. Behavior is left unchanged.
    #[default]
    Generic,
}

impl Dialect {
    /// Detect the dialect from the engine's adapter name.
    ///
    /// The match is exact; adapters that merely contain "SQLServer" in their
    /// name are treated as generic.
    #[inline]
    pub fn detect(engine: &dyn Engine) -> Self {
        match engine.adapter_name() {
            Some(SQLSERVER_ADAPTER_NAME) => Self::SqlServer,
            _ => Self::Generic,
        }
    }

    /// Check if this is the SQL Server dialect.
    #[inline]
    pub fn is_sqlserver(&self) -> bool {
        matches!(self, Self::SqlServer)
    }

    /// Quote an identifier for this dialect.
    ///
    /// SQL Server uses brackets with `]` doubled; the generic dialect uses
    /// double quotes with `"` doubled.
    pub fn quote_identifier<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::SqlServer => Cow::Owned(format!("[{}]", name.replace(']', "]]"))),
            Self::Generic => Cow::Owned(format!("\"{}\"", name.replace('"', "\"\""))),
        }
    }
}

/// An engine with a fixed adapter name.
///
/// Useful when building SQL without a live connection, and in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedEngine {
    adapter: Option<String>,
}

impl NamedEngine {
    /// Create an engine reporting the given adapter name.
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: Some(adapter.into()),
        }
    }

    /// Create an engine that reports the SQL Server adapter.
    pub fn sqlserver() -> Self {
        Self::new(SQLSERVER_ADAPTER_NAME)
    }

    /// Create an engine without a connection.
    pub fn disconnected() -> Self {
        Self { adapter: None }
    }
}

impl Engine for NamedEngine {
    fn adapter_name(&self) -> Option<&str> {
        self.adapter.as_deref()
    }
}
