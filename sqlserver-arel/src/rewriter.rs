//! The dialect rewriter.
//!
//! A rewriter is created per query build from the bound engine. When the
//! engine reports the SQL Server adapter, order inputs are normalized to
//! comparable [`OrderSpec`]s and lock requests become table hints. Otherwise
//! inputs are handed through the way a generic builder would keep them.
//!
//! ```rust
//! use sqlserver_arel::{DialectRewriter, NamedEngine, OrderNode, OrderSpec, SqlLiteral};
//!
//! let rewriter = DialectRewriter::for_engine(&NamedEngine::sqlserver());
//! let orders = rewriter.rewrite_order(&[], ["name ASC, UPPER(a,b) DESC"]);
//! assert_eq!(orders, vec![
//!     OrderNode::Spec(OrderSpec::asc(SqlLiteral::new("name"))),
//!     OrderNode::Spec(OrderSpec::desc(SqlLiteral::new("UPPER(a,b)"))),
//! ]);
//!
//! let hint = rewriter.rewrite_lock(true);
//! assert_eq!(hint.as_deref(), Some("WITH (HOLDLOCK, ROWLOCK)"));
//! ```

use tracing::trace;

use crate::engine::{Dialect, Engine};
use crate::error::{ArelError, ArelResult};
use crate::lock::{self, LockInput};
use crate::nodes::{LockIntent, OrderNode};
use crate::order::{self, OrderInput};

/// Rewrites ordering and locking for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DialectRewriter {
    dialect: Dialect,
}

impl DialectRewriter {
    /// Create a rewriter for a known dialect.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Create a rewriter for the engine's dialect.
    pub fn for_engine(engine: &dyn Engine) -> Self {
        let dialect = Dialect::detect(engine);
        trace!(
            adapter = engine.adapter_name().unwrap_or("none"),
            ?dialect,
            "Detected dialect"
        );
        Self { dialect }
    }

    /// Create a SQL Server rewriter, failing if the engine is anything else.
    pub fn sqlserver(engine: &dyn Engine) -> ArelResult<Self> {
        match Dialect::detect(engine) {
            Dialect::SqlServer => Ok(Self::new(Dialect::SqlServer)),
            Dialect::Generic => Err(ArelError::dialect_mismatch(engine.adapter_name())),
        }
    }

    /// The dialect this rewriter targets.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append new order inputs to an existing order list.
    ///
    /// Existing entries are kept; the expanded inputs are concatenated after
    /// them, one level flat.
    pub fn rewrite_order<I>(&self, existing: &[OrderNode], inputs: I) -> Vec<OrderNode>
    where
        I: IntoIterator,
        I::Item: Into<OrderInput>,
    {
        let mut orders = existing.to_vec();
        match self.dialect {
            Dialect::SqlServer => orders.extend(
                inputs
                    .into_iter()
                    .flat_map(|input| order::expand_input(input.into()))
                    .map(OrderNode::Spec),
            ),
            Dialect::Generic => orders.extend(
                inputs
                    .into_iter()
                    .map(|input| order::passthrough_input(input.into())),
            ),
        }
        orders
    }

    /// Resolve a lock request to an intent.
    pub fn lock_intent(&self, input: impl Into<LockInput>) -> LockIntent {
        match self.dialect {
            Dialect::SqlServer => lock::sqlserver_intent(input.into()),
            Dialect::Generic => lock::generic_intent(input.into()),
        }
    }

    /// Resolve a lock request straight to clause text.
    ///
    /// Returns `None` when the request removes locking.
    pub fn rewrite_lock(&self, input: impl Into<LockInput>) -> Option<String> {
        let intent = self.lock_intent(input);
        lock::lock_sql(&intent, self.dialect).map(|sql| sql.into_owned())
    }
}
