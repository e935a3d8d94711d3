//! The driver entry point.

use async_trait::async_trait;
use sqlserver_arel::Engine;

use crate::config::DatabaseTimezone;
use crate::error::DatasetResult;
use crate::handle::ResultHandle;
use crate::value::Value;

/// A connection that can run SQL and hand back a result handle.
///
/// The [`Engine`] supertrait carries the adapter identity used for dialect
/// detection, so the same connection can be bound to a query builder.
#[async_trait]
pub trait Database: Engine {
    /// Execute a query with positional bind parameters.
    ///
    /// Parameters are referenced as `@P1`, `@P2`, ... in `sql`. This is one
    /// of the two points where work may wait on I/O; the other is
    /// [`ResultHandle::next`].
    async fn execute_with(
        &self,
        sql: &str,
        params: &[Value],
    ) -> DatasetResult<Box<dyn ResultHandle>>;

    /// Execute a query without parameters.
    async fn execute(&self, sql: &str) -> DatasetResult<Box<dyn ResultHandle>> {
        self.execute_with(sql, &[]).await
    }

    /// Timezone zone-less timestamps from this connection are stored in.
    fn database_timezone(&self) -> DatabaseTimezone {
        DatabaseTimezone::Utc
    }
}
