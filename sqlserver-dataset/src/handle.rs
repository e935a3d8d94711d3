//! The driver result boundary.
//!
//! Every wire driver (native TDS here, ODBC or JDBC bridges elsewhere)
//! exposes its result set through [`ResultHandle`]. The getters follow JDBC
//! result set conventions:
//!
//! - column indexes are 1-based
//! - primitive getters return a zero value for NULL and set [`ResultHandle::was_null`]
//! - reference getters return `None` for NULL
//! - dates report years since 1900 and 0-based months

use async_trait::async_trait;
use smol_str::SmolStr;

use crate::error::DatasetResult;
use crate::value::{ColumnDescriptor, Value};

/// A calendar date in driver form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverDate {
    /// Years since 1900.
    pub year: i32,
    /// 0-based month.
    pub month: u32,
    /// Day of month.
    pub day: u32,
}

impl DriverDate {
    /// Build from calendar parts (full year, 1-based month).
    pub fn from_calendar(year: i32, month: u32, day: u32) -> Self {
        Self {
            year: year - 1900,
            month: month.saturating_sub(1),
            day,
        }
    }
}

/// A date and time in driver form, without zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverTimestamp {
    /// Years since 1900.
    pub year: i32,
    /// 0-based month.
    pub month: u32,
    /// Day of month.
    pub day: u32,
    /// Hour of day.
    pub hour: u32,
    /// Minute.
    pub minute: u32,
    /// Second.
    pub second: u32,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl DriverTimestamp {
    /// Build from calendar parts (full year, 1-based month).
    pub fn from_calendar(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanos: u32,
    ) -> Self {
        Self {
            year: year - 1900,
            month: month.saturating_sub(1),
            day,
            hour,
            minute,
            second,
            nanos,
        }
    }
}

/// A character large object.
///
/// Drivers may hand out a truncated preview; the full text is read with
/// [`Clob::sub_string`] over the reported length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clob {
    text: String,
}

impl Clob {
    /// Wrap character data.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Length in characters.
    pub fn length(&self) -> usize {
        self.text.chars().count()
    }

    /// Characters starting at the 1-based position `pos`.
    pub fn sub_string(&self, pos: usize, len: usize) -> String {
        self.text
            .chars()
            .skip(pos.saturating_sub(1))
            .take(len)
            .collect()
    }
}

/// A driver result set.
///
/// Only [`next`](ResultHandle::next) may wait on I/O; everything else reads
/// the current row from memory.
#[async_trait]
pub trait ResultHandle: Send {
    /// Number of result columns.
    fn column_count(&self) -> usize;

    /// Label of a column.
    fn column_label(&self, index: usize) -> DatasetResult<SmolStr>;

    /// Wire type code of a column.
    fn column_wire_type(&self, index: usize) -> DatasetResult<i32>;

    /// Advance to the next row. Returns `false` when the result is exhausted.
    async fn next(&mut self) -> DatasetResult<bool>;

    /// Whether the last getter read a NULL.
    fn was_null(&self) -> bool;

    /// Read a boolean.
    fn get_boolean(&mut self, index: usize) -> DatasetResult<bool>;

    /// Read a 16-bit integer.
    fn get_short(&mut self, index: usize) -> DatasetResult<i16>;

    /// Read a 32-bit integer.
    fn get_int(&mut self, index: usize) -> DatasetResult<i32>;

    /// Read a 64-bit integer.
    fn get_long(&mut self, index: usize) -> DatasetResult<i64>;

    /// Read a 32-bit float.
    fn get_float(&mut self, index: usize) -> DatasetResult<f32>;

    /// Read a 64-bit float.
    fn get_double(&mut self, index: usize) -> DatasetResult<f64>;

    /// Read character data.
    fn get_string(&mut self, index: usize) -> DatasetResult<Option<String>>;

    /// Read a date.
    fn get_date(&mut self, index: usize) -> DatasetResult<Option<DriverDate>>;

    /// Read a timestamp.
    fn get_timestamp(&mut self, index: usize) -> DatasetResult<Option<DriverTimestamp>>;

    /// Read an exact numeric as its decimal string.
    fn get_big_decimal_string(&mut self, index: usize) -> DatasetResult<Option<String>>;

    /// Read binary data.
    fn get_bytes(&mut self, index: usize) -> DatasetResult<Option<Vec<u8>>>;

    /// Read a character large object.
    fn get_clob(&mut self, index: usize) -> DatasetResult<Option<Clob>>;

    /// Read whatever the driver holds, in its natural form.
    fn get_object(&mut self, index: usize) -> DatasetResult<Value>;

    /// Hint how many rows to fetch per round trip.
    fn set_fetch_size(&mut self, _rows: u32) {}

    /// Release the result. Closing twice is not an error.
    fn close(&mut self) -> DatasetResult<()>;

    /// Whether the handle has been released.
    fn is_closed(&self) -> bool;

    /// Descriptors for every column, in ordinal order.
    fn column_descriptors(&self) -> DatasetResult<Vec<ColumnDescriptor>> {
        (1..=self.column_count())
            .map(|i| {
                Ok(ColumnDescriptor::new(
                    self.column_label(i)?,
                    self.column_wire_type(i)?,
                    i,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_parts_offsets() {
        let date = DriverDate::from_calendar(2024, 2, 29);
        assert_eq!(
            date,
            DriverDate {
                year: 124,
                month: 1,
                day: 29
            }
        );

        let ts = DriverTimestamp::from_calendar(1999, 12, 31, 23, 59, 59, 1);
        assert_eq!(ts.year, 99);
        assert_eq!(ts.month, 11);
    }

    #[test]
    fn test_clob_sub_string() {
        let clob = Clob::new("héllo wörld");
        assert_eq!(clob.length(), 11);
        assert_eq!(clob.sub_string(1, clob.length()), "héllo wörld");
        assert_eq!(clob.sub_string(7, 3), "wör");
    }
}
