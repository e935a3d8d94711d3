//! Error types for result materialization.

use thiserror::Error;

use crate::wire;

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors that can occur while executing queries and converting rows.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// A cell value could not be converted for its wire type.
    #[error("cannot convert column {column} ({}): {message}", wire_name(.wire_type))]
    Conversion {
        /// 1-based column index.
        column: usize,
        /// Wire type code reported by the driver.
        wire_type: i32,
        /// What went wrong.
        message: String,
    },

    /// The column discovery query failed.
    #[error("column probe failed for `{sql}`: {source}")]
    ProbeQuery {
        /// The probe SQL that was executed.
        sql: String,
        /// The underlying failure.
        #[source]
        source: Box<DatasetError>,
    },

    /// Driver-level failure.
    #[error("driver error: {0}")]
    Driver(String),

    /// Tiberius/SQL Server error.
    #[error("sql server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The driver cannot produce this getter for the column's type.
    #[error("{getter} is not supported for {}", wire_name(.wire_type))]
    Unsupported {
        /// Getter that was called.
        getter: &'static str,
        /// Wire type code of the column.
        wire_type: i32,
    },

    /// The connection or result handle is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

fn wire_name(code: &i32) -> &'static str {
    wire::type_name(*code)
}

impl DatasetError {
    /// Create a conversion error.
    pub fn conversion(column: usize, wire_type: i32, message: impl Into<String>) -> Self {
        Self::Conversion {
            column,
            wire_type,
            message: message.into(),
        }
    }

    /// Wrap a failure of the probe query.
    pub fn probe(sql: impl Into<String>, source: DatasetError) -> Self {
        Self::ProbeQuery {
            sql: sql.into(),
            source: Box::new(source),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an unsupported getter error.
    pub fn unsupported(getter: &'static str, wire_type: i32) -> Self {
        Self::Unsupported { getter, wire_type }
    }

    /// Check if this is a conversion error.
    pub fn is_conversion_error(&self) -> bool {
        matches!(self, Self::Conversion { .. })
    }

    /// Check if this is a probe error.
    pub fn is_probe_error(&self) -> bool {
        matches!(self, Self::ProbeQuery { .. })
    }

    /// Check if this came from the connection rather than from a value.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SqlServer(_) | Self::Io(_) | Self::ConnectionClosed
        )
    }
}
