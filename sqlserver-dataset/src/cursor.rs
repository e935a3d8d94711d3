//! Row iteration over a driver result.
//!
//! A [`ResultCursor`] reads the column descriptors of its handle once,
//! resolves one converter per column and then converts rows one at a time as
//! the caller asks for them. Nothing is read ahead of the caller.
//!
//! The handle is closed exactly once: when the result is exhausted, when a
//! driver or conversion error ends iteration, on [`ResultCursor::close`], or
//! when the cursor is dropped early. A handle that was already closed from
//! outside is left alone, and a failing close is logged rather than
//! returned.

use std::num::NonZeroU32;
use std::sync::Arc;

use futures::Stream;
use futures::stream;
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::config::ConversionOptions;
use crate::converter::{Converter, TypeConverter};
use crate::error::{DatasetError, DatasetResult};
use crate::handle::ResultHandle;
use crate::value::{ColumnDescriptor, RowShape, TypedRow};

/// A single-pass cursor producing typed rows.
pub struct ResultCursor {
    handle: Option<Box<dyn ResultHandle>>,
    columns: Arc<[ColumnDescriptor]>,
    converters: Vec<Converter>,
    shape: RowShape,
    options: ConversionOptions,
    rows: usize,
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("columns", &self.columns)
            .field("converters", &self.converters)
            .field("shape", &self.shape)
            .field("options", &self.options)
            .field("rows", &self.rows)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl ResultCursor {
    /// Open a cursor over a handle.
    ///
    /// Column metadata is read here. If that fails the handle is released
    /// before the error is returned.
    pub fn open(
        mut handle: Box<dyn ResultHandle>,
        shape: RowShape,
        fetch_size: Option<NonZeroU32>,
        options: ConversionOptions,
    ) -> DatasetResult<Self> {
        let columns: Arc<[ColumnDescriptor]> = match handle.column_descriptors() {
            Ok(columns) => columns.into(),
            Err(e) => {
                release_handle(handle.as_mut(), 0);
                return Err(e);
            }
        };

        if let Some(rows) = fetch_size {
            handle.set_fetch_size(rows.get());
        }

        let converters = TypeConverter::converters_for(&columns);
        debug!(
            columns = columns.len(),
            ?shape,
            fetch_size = fetch_size.map(NonZeroU32::get),
            "Opened result cursor"
        );
        trace!(converters = ?converters, "Resolved column converters");

        Ok(Self {
            handle: Some(handle),
            columns,
            converters,
            shape,
            options,
            rows: 0,
        })
    }

    /// Column descriptors, in ordinal order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Column descriptors as a shareable slice.
    pub fn shared_columns(&self) -> Arc<[ColumnDescriptor]> {
        Arc::clone(&self.columns)
    }

    /// Number of rows produced so far.
    pub fn rows_read(&self) -> usize {
        self.rows
    }

    /// Whether the handle has been released.
    pub fn is_finished(&self) -> bool {
        self.handle.is_none()
    }

    /// Fetch and convert the next row.
    ///
    /// Returns `Ok(None)` once the result is exhausted; every later call
    /// also returns `Ok(None)`.
    pub async fn next_row(&mut self) -> DatasetResult<Option<TypedRow>> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };

        match handle.next().await {
            Ok(true) => {}
            Ok(false) => {
                self.release();
                return Ok(None);
            }
            Err(e) => {
                self.release();
                return Err(e);
            }
        }

        match self.convert_current() {
            Ok(row) => {
                self.rows += 1;
                Ok(Some(row))
            }
            Err(e) => {
                debug!(error = %e, row = self.rows + 1, "Row conversion failed");
                self.release();
                Err(e)
            }
        }
    }

    fn convert_current(&mut self) -> DatasetResult<TypedRow> {
        let handle = self
            .handle
            .as_deref_mut()
            .ok_or(DatasetError::ConnectionClosed)?;
        let cells = self.columns.iter().zip(&self.converters);

        Ok(match self.shape {
            RowShape::Positional => {
                let mut values = Vec::with_capacity(self.columns.len());
                for (column, converter) in cells {
                    values.push(converter.convert(handle, column, &self.options)?);
                }
                TypedRow::Positional(values)
            }
            RowShape::Labeled => {
                let mut values = IndexMap::with_capacity(self.columns.len());
                for (column, converter) in cells {
                    let value = converter.convert(handle, column, &self.options)?;
                    values.insert(column.name.clone(), value);
                }
                TypedRow::Labeled(values)
            }
        })
    }

    /// Release the handle now. Later calls to `next_row` return `Ok(None)`.
    pub fn close(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            release_handle(handle.as_mut(), self.rows);
        }
    }

    /// Turn the cursor into a stream of rows.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = DatasetResult<TypedRow>> + Send {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next_row().await?.map(|row| (row, cursor)))
        })
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        self.release();
    }
}

fn release_handle(handle: &mut dyn ResultHandle, rows: usize) {
    if handle.is_closed() {
        trace!(rows, "Result handle already closed");
        return;
    }
    match handle.close() {
        Ok(()) => debug!(rows, "Released result handle"),
        Err(e) => warn!(error = %e, rows, "Failed to release result handle"),
    }
}
