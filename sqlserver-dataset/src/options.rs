//! Dataset options and option deltas.
//!
//! A dataset's options are never edited in place. Every change is expressed
//! as an [`OptionsDelta`] and produces a new options value; whether the
//! column cache survives depends only on [`OptionsDelta::touches_sql`].

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde::Serialize;
use smol_str::SmolStr;

use crate::config::{ConversionOptions, DatabaseTimezone};
use crate::value::{RowShape, Value};

/// Options of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DatasetOptions {
    /// Query text.
    pub sql: String,
    /// Positional bind parameters for `@P1`, `@P2`, ...
    pub params: Vec<Value>,
    /// Row shape for iteration.
    pub row_shape: RowShape,
    /// Row batching hint passed to the driver.
    pub fetch_size: Option<NonZeroU32>,
    /// Timezone override. `None` uses the connection's setting.
    pub timezone: Option<DatabaseTimezone>,
    /// Other caller options, carried for equality and merging.
    pub extra: BTreeMap<SmolStr, String>,
}

impl DatasetOptions {
    /// Options for a query.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Merge a delta; values in the delta win.
    pub fn merge(&self, delta: &OptionsDelta) -> Self {
        let mut merged = self.clone();
        if let Some(sql) = &delta.sql {
            merged.sql.clone_from(sql);
        }
        if let Some(params) = &delta.params {
            merged.params.clone_from(params);
        }
        if let Some(shape) = delta.row_shape {
            merged.row_shape = shape;
        }
        if let Some(fetch_size) = delta.fetch_size {
            merged.fetch_size = fetch_size;
        }
        if let Some(timezone) = delta.timezone {
            merged.timezone = Some(timezone);
        }
        for (key, value) in &delta.extra {
            merged.extra.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Conversion options, falling back to the connection's timezone.
    pub fn conversion_options(&self, connection_timezone: DatabaseTimezone) -> ConversionOptions {
        ConversionOptions::new(self.timezone.unwrap_or(connection_timezone))
    }
}

/// A set of option changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsDelta {
    sql: Option<String>,
    params: Option<Vec<Value>>,
    row_shape: Option<RowShape>,
    fetch_size: Option<Option<NonZeroU32>>,
    timezone: Option<DatabaseTimezone>,
    extra: BTreeMap<SmolStr, String>,
}

impl OptionsDelta {
    /// An empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the query text.
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Replace the bind parameters.
    ///
    /// Parameters do not change the column set, so the cache survives.
    pub fn params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Set the row shape.
    pub fn row_shape(mut self, shape: RowShape) -> Self {
        self.row_shape = Some(shape);
        self
    }

    /// Return rows as positional sequences.
    pub fn as_array(self) -> Self {
        self.row_shape(RowShape::Positional)
    }

    /// Return rows as label to value mappings.
    pub fn as_object(self) -> Self {
        self.row_shape(RowShape::Labeled)
    }

    /// Set the fetch size. Zero clears it.
    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = Some(NonZeroU32::new(rows));
        self
    }

    /// Override the timezone.
    pub fn timezone(mut self, timezone: DatabaseTimezone) -> Self {
        self.timezone = Some(timezone);
        self
    }

    /// Set an extra option.
    pub fn extra(mut self, key: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check if the delta changes the query text.
    ///
    /// Any SQL in the delta counts, even if it equals the current text.
    pub fn touches_sql(&self) -> bool {
        self.sql.is_some()
    }

    /// Check if the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
