//! Logging setup for the SQL Server adapter.
//!
//! Structured logging is controlled by environment variables.
//!
//! # Environment Variables
//!
//! - `SQLSERVER_ADAPTER_DEBUG=true` (or `1`, `yes`) - Enable debug logging
//! - `SQLSERVER_ADAPTER_LOG_LEVEL=debug|info|warn|error|trace` - Set a specific level
//! - `SQLSERVER_ADAPTER_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use sqlserver_arel::logging;
//!
//! // Call once at startup
//! logging::init();
//! ```
//!
//! Inside the workspace, use the `tracing` macros with structured fields:
//!
//! ```rust,ignore
//! use tracing::{debug, trace};
//!
//! debug!(sql = %sql, "Executing query");
//! trace!(column = index, wire_type = code, "Converting cell");
//! ```

use std::env;
use std::fmt;
use std::sync::Once;

use tracing::Level;

static INIT: Once = Once::new();

const DEBUG_VAR: &str = "SQLSERVER_ADAPTER_DEBUG";
const LEVEL_VAR: &str = "SQLSERVER_ADAPTER_LOG_LEVEL";
const FORMAT_VAR: &str = "SQLSERVER_ADAPTER_LOG_FORMAT";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    Compact,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}

/// Whether `SQLSERVER_ADAPTER_DEBUG` is set to `true`, `1` or `yes`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_VAR)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level named by `SQLSERVER_ADAPTER_LOG_LEVEL`.
///
/// Unset or unrecognized values fall back to `DEBUG` when debug logging is
/// enabled and `WARN` otherwise.
pub fn get_log_level() -> Level {
    env::var(LEVEL_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<Level>().ok())
        .unwrap_or(if is_debug_enabled() {
            Level::DEBUG
        } else {
            Level::WARN
        })
}

/// The format named by `SQLSERVER_ADAPTER_LOG_FORMAT`, JSON by default.
pub fn get_log_format() -> LogFormat {
    env::var(FORMAT_VAR)
        .map(|v| LogFormat::from_env_value(&v))
        .unwrap_or_default()
}

/// Install a subscriber if the environment asks for logging.
///
/// Nothing happens unless `SQLSERVER_ADAPTER_DEBUG` or
/// `SQLSERVER_ADAPTER_LOG_LEVEL` is set. Only the first `init*` call in a
/// process has any effect. Without the `tracing-subscriber` feature no
/// subscriber is installed; the application brings its own.
pub fn init() {
    if !is_debug_enabled() && env::var(LEVEL_VAR).is_err() {
        return;
    }
    init_with_level(get_log_level());
}

/// Install a subscriber at `level`, in the format from the environment.
pub fn init_with_level(level: Level) {
    INIT.call_once(|| install(level, get_log_format()));
}

/// Install a subscriber at `DEBUG`.
pub fn init_debug() {
    init_with_level(Level::DEBUG);
}

#[cfg(feature = "tracing-subscriber")]
fn install(level: Level, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level_name = level.as_str().to_ascii_lowercase();
    let filter = EnvFilter::try_new(format!(
        "sqlserver_adapter={level_name},sqlserver_arel={level_name},sqlserver_dataset={level_name}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    if installed.is_ok() {
        tracing::info!(level = %level, format = %format, "SQL Server adapter logging initialized");
    }
}

#[cfg(not(feature = "tracing-subscriber"))]
fn install(_level: Level, _format: LogFormat) {}
