//! Row locking.
//!
//! SQL Server has no `FOR UPDATE`; row locks are table hints placed after the
//! table source. `lock(true)` becomes `WITH (HOLDLOCK, ROWLOCK)` and custom
//! text is passed through, except that text asking for `FOR UPDATE` is
//! rendered as `WITH (UPDLOCK)`.

use std::borrow::Cow;

use crate::engine::Dialect;
use crate::nodes::{LockIntent, SqlLiteral};

/// Default SQL Server lock hint.
pub const SQLSERVER_DEFAULT_LOCK: &str = "WITH (HOLDLOCK, ROWLOCK)";

/// SQL Server hint used in place of `FOR UPDATE`.
pub const SQLSERVER_UPDATE_LOCK: &str = "WITH (UPDLOCK)";

/// Default generic row lock.
pub const GENERIC_DEFAULT_LOCK: &str = "FOR UPDATE";

/// An argument to `lock(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockInput {
    /// `true` requests the dialect default, `false` removes locking.
    Enabled(bool),
    /// A hint that is emitted verbatim.
    Sql(SqlLiteral),
    /// Hint text.
    Text(String),
}

impl From<bool> for LockInput {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<SqlLiteral> for LockInput {
    fn from(sql: SqlLiteral) -> Self {
        Self::Sql(sql)
    }
}

impl From<&str> for LockInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for LockInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Resolve a lock input for SQL Server.
pub(crate) fn sqlserver_intent(input: LockInput) -> LockIntent {
    match input {
        LockInput::Enabled(true) => LockIntent::DefaultLock,
        LockInput::Sql(sql) => LockIntent::CustomLock(sql.into_inner()),
        LockInput::Text(text) => LockIntent::CustomLock(text),
        other => generic_intent(other),
    }
}

/// Resolve a lock input for any other dialect.
pub(crate) fn generic_intent(input: LockInput) -> LockIntent {
    match input {
        LockInput::Enabled(true) => LockIntent::DefaultLock,
        LockInput::Enabled(false) => LockIntent::NoLock,
        LockInput::Sql(sql) => LockIntent::CustomLock(sql.into_inner()),
        LockInput::Text(text) => LockIntent::CustomLock(text),
    }
}

/// The clause text for a lock intent, or `None` when nothing is locked.
pub fn lock_sql(intent: &LockIntent, dialect: Dialect) -> Option<Cow<'_, str>> {
    match (intent, dialect) {
        (LockIntent::NoLock, _) => None,
        (LockIntent::DefaultLock, Dialect::SqlServer) => Some(Cow::Borrowed(SQLSERVER_DEFAULT_LOCK)),
        (LockIntent::DefaultLock, Dialect::Generic) => Some(Cow::Borrowed(GENERIC_DEFAULT_LOCK)),
        (LockIntent::CustomLock(text), Dialect::SqlServer)
            if text.to_ascii_uppercase().contains("FOR UPDATE") =>
        {
            Some(Cow::Borrowed(SQLSERVER_UPDATE_LOCK))
        }
        (LockIntent::CustomLock(text), _) => Some(Cow::Borrowed(text.as_str())),
    }
}
