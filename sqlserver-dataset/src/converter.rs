//! Cell conversion by wire type.
//!
//! [`TypeConverter::lookup`] resolves a wire type code to a [`Converter`]
//! once per column; the cursor keeps the resolved list and indexes it by
//! ordinal for every row. Unknown codes fall back to the driver's natural
//! object value instead of failing.
//!
//! NULL cells always convert to [`Value::Null`]. A malformed driver value
//! (an unparsable timestamp string, an out of range date) is reported as a
//! conversion error carrying the column index and wire type.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

use crate::config::{ConversionOptions, DatabaseTimezone};
use crate::error::{DatasetError, DatasetResult};
use crate::handle::ResultHandle;
use crate::value::{ColumnDescriptor, Value};
use crate::wire;

/// Date time-only columns are anchored to.
const TIME_ANCHOR_DATE: &str = "2000-01-01";

const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const OFFSET_TIMESTAMP_FORMATS: [&str; 2] =
    ["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Signature of a conversion function.
pub type ConvertFn =
    fn(&mut dyn ResultHandle, &ColumnDescriptor, &ConversionOptions) -> DatasetResult<Value>;

/// A resolved conversion for one column.
#[derive(Clone, Copy)]
pub struct Converter {
    name: &'static str,
    func: ConvertFn,
}

impl Converter {
    const fn new(name: &'static str, func: ConvertFn) -> Self {
        Self { name, func }
    }

    /// Name of the conversion, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Convert the cell of `column` in the handle's current row.
    #[inline]
    pub fn convert(
        &self,
        handle: &mut dyn ResultHandle,
        column: &ColumnDescriptor,
        options: &ConversionOptions,
    ) -> DatasetResult<Value> {
        (self.func)(handle, column, options)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.name).finish()
    }
}

impl PartialEq for Converter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The wire type dispatch table.
pub struct TypeConverter;

impl TypeConverter {
    /// Resolve the conversion for a wire type code.
    pub fn lookup(wire_type: i32) -> Converter {
        match wire_type {
            wire::BOOLEAN | wire::BIT => Converter::new("boolean", convert_boolean),
            wire::TINYINT | wire::SMALLINT => Converter::new("short", convert_short),
            wire::INTEGER => Converter::new("int", convert_int),
            wire::BIGINT => Converter::new("long", convert_long),
            wire::REAL => Converter::new("float", convert_float),
            wire::FLOAT | wire::DOUBLE => Converter::new("double", convert_double),
            wire::CHAR
            | wire::VARCHAR
            | wire::LONGVARCHAR
            | wire::NCHAR
            | wire::NVARCHAR
            | wire::LONGNVARCHAR => Converter::new("string", convert_string),
            wire::BINARY | wire::VARBINARY | wire::LONGVARBINARY | wire::BLOB => {
                Converter::new("blob", convert_blob)
            }
            wire::CLOB | wire::NCLOB => Converter::new("clob", convert_clob),
            wire::DATE => Converter::new("date", convert_date),
            wire::TIME => Converter::new("time", convert_time),
            wire::TIMESTAMP => Converter::new("timestamp", convert_timestamp),
            wire::DATETIMEOFFSET => Converter::new("datetimeoffset", convert_datetimeoffset),
            wire::DECIMAL | wire::NUMERIC => Converter::new("decimal", convert_decimal),
            _ => Converter::new("object", convert_object),
        }
    }

    /// Resolve conversions for a column set, in ordinal order.
    pub fn converters_for(columns: &[ColumnDescriptor]) -> Vec<Converter> {
        columns.iter().map(|c| Self::lookup(c.wire_type)).collect()
    }

    /// Convert a single cell without a prepared converter list.
    pub fn convert(
        handle: &mut dyn ResultHandle,
        column: &ColumnDescriptor,
        options: &ConversionOptions,
    ) -> DatasetResult<Value> {
        Self::lookup(column.wire_type).convert(handle, column, options)
    }
}

fn conversion_error(column: &ColumnDescriptor, message: impl Into<String>) -> DatasetError {
    DatasetError::conversion(column.ordinal, column.wire_type, message)
}

macro_rules! primitive_converter {
    ($($fn_name:ident => $getter:ident),* $(,)?) => {
        $(
            fn $fn_name(
                handle: &mut dyn ResultHandle,
                column: &ColumnDescriptor,
                _options: &ConversionOptions,
            ) -> DatasetResult<Value> {
                let value = handle.$getter(column.ordinal)?;
                if handle.was_null() {
                    Ok(Value::Null)
                } else {
                    Ok(value.into())
                }
            }
        )*
    };
}

primitive_converter! {
    convert_boolean => get_boolean,
    convert_short => get_short,
    convert_int => get_int,
    convert_long => get_long,
    convert_float => get_float,
    convert_double => get_double,
}

fn convert_string(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    Ok(handle.get_string(column.ordinal)?.into())
}

fn convert_object(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    let value = handle.get_object(column.ordinal)?;
    if handle.was_null() {
        Ok(Value::Null)
    } else {
        Ok(value)
    }
}

fn convert_blob(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    Ok(handle.get_bytes(column.ordinal)?.into())
}

fn convert_clob(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    Ok(handle
        .get_clob(column.ordinal)?
        .map(|clob| clob.sub_string(1, clob.length()))
        .into())
}

fn convert_date(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    let Some(date) = handle.get_date(column.ordinal)? else {
        return Ok(Value::Null);
    };
    NaiveDate::from_ymd_opt(date.year + 1900, date.month + 1, date.day)
        .map(Value::Date)
        .ok_or_else(|| conversion_error(column, format!("invalid date {date:?}")))
}

/// Place a zone-less timestamp in the configured timezone.
fn localize(
    naive: NaiveDateTime,
    column: &ColumnDescriptor,
    options: &ConversionOptions,
) -> DatasetResult<DateTime<FixedOffset>> {
    match options.timezone {
        DatabaseTimezone::Utc => Ok(Utc.from_utc_datetime(&naive).fixed_offset()),
        DatabaseTimezone::Local => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.fixed_offset())
            .ok_or_else(|| {
                conversion_error(column, format!("{naive} does not exist in the local timezone"))
            }),
    }
}

fn convert_timestamp(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    options: &ConversionOptions,
) -> DatasetResult<Value> {
    let Some(ts) = handle.get_timestamp(column.ordinal)? else {
        return Ok(Value::Null);
    };
    let date = NaiveDate::from_ymd_opt(ts.year + 1900, ts.month + 1, ts.day);
    let time = NaiveTime::from_hms_nano_opt(ts.hour, ts.minute, ts.second, ts.nanos);
    match (date, time) {
        (Some(date), Some(time)) => {
            localize(date.and_time(time), column, options).map(Value::Timestamp)
        }
        _ => Err(conversion_error(column, format!("invalid timestamp {ts:?}"))),
    }
}

fn convert_time(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    options: &ConversionOptions,
) -> DatasetResult<Value> {
    let Some(text) = handle.get_string(column.ordinal)? else {
        return Ok(Value::Null);
    };
    let anchored = format!("{TIME_ANCHOR_DATE} {}", text.trim());
    let naive = NaiveDateTime::parse_from_str(&anchored, NAIVE_TIMESTAMP_FORMAT)
        .map_err(|e| conversion_error(column, format!("invalid time '{text}': {e}")))?;
    localize(naive, column, options).map(Value::Timestamp)
}

fn parse_offset_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    OFFSET_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok())
}

fn convert_datetimeoffset(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    options: &ConversionOptions,
) -> DatasetResult<Value> {
    let Some(text) = handle.get_string(column.ordinal)? else {
        return Ok(Value::Null);
    };
    let parsed = parse_offset_timestamp(&text).ok_or_else(|| {
        conversion_error(column, format!("invalid datetimeoffset '{text}'"))
    })?;
    let converted = match options.timezone {
        DatabaseTimezone::Utc => parsed.with_timezone(&Utc).fixed_offset(),
        DatabaseTimezone::Local => parsed.with_timezone(&Local).fixed_offset(),
    };
    Ok(Value::Timestamp(converted))
}

fn convert_decimal(
    handle: &mut dyn ResultHandle,
    column: &ColumnDescriptor,
    _options: &ConversionOptions,
) -> DatasetResult<Value> {
    let Some(text) = handle.get_big_decimal_string(column.ordinal)? else {
        return Ok(Value::Null);
    };
    BigDecimal::from_str(text.trim())
        .map(Value::Decimal)
        .map_err(|e| conversion_error(column, format!("invalid decimal '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Cell, MemoryResult};
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    fn single(wire_type: i32, cell: Cell) -> (MemoryResult, ColumnDescriptor) {
        let result = MemoryResult::new(vec![("c", wire_type)]).with_row(vec![cell]);
        (result, ColumnDescriptor::new("c", wire_type, 1))
    }

    async fn convert_one(wire_type: i32, cell: Cell, options: ConversionOptions) -> DatasetResult<Value> {
        let (mut result, column) = single(wire_type, cell);
        assert!(result.next().await?);
        TypeConverter::convert(&mut result, &column, &options)
    }

    #[test]
    fn test_lookup_table() {
        assert_eq!(TypeConverter::lookup(wire::INTEGER).name(), "int");
        assert_eq!(TypeConverter::lookup(wire::TINYINT).name(), "short");
        assert_eq!(TypeConverter::lookup(wire::FLOAT).name(), "double");
        assert_eq!(TypeConverter::lookup(wire::REAL).name(), "float");
        assert_eq!(TypeConverter::lookup(wire::NCLOB).name(), "clob");
        assert_eq!(TypeConverter::lookup(wire::VARBINARY).name(), "blob");
        assert_eq!(TypeConverter::lookup(wire::DATETIMEOFFSET).name(), "datetimeoffset");
        assert_eq!(TypeConverter::lookup(wire::ARRAY).name(), "object");
        assert_eq!(TypeConverter::lookup(wire::OTHER).name(), "object");
        assert_eq!(TypeConverter::lookup(-9999).name(), "object");
    }

    #[tokio::test]
    async fn test_null_is_null_for_every_type() {
        let codes = [
            wire::ARRAY,
            wire::BIGINT,
            wire::BINARY,
            wire::BIT,
            wire::BLOB,
            wire::BOOLEAN,
            wire::CHAR,
            wire::CLOB,
            wire::DATE,
            wire::DECIMAL,
            wire::DOUBLE,
            wire::FLOAT,
            wire::INTEGER,
            wire::LONGNVARCHAR,
            wire::LONGVARBINARY,
            wire::LONGVARCHAR,
            wire::NCHAR,
            wire::NCLOB,
            wire::NUMERIC,
            wire::NVARCHAR,
            wire::REAL,
            wire::SMALLINT,
            wire::TIME,
            wire::TIMESTAMP,
            wire::TINYINT,
            wire::VARBINARY,
            wire::VARCHAR,
            wire::OTHER,
            wire::DATETIMEOFFSET,
        ];
        for code in codes {
            for options in [ConversionOptions::utc(), ConversionOptions::local()] {
                let value = convert_one(code, Cell::Null, options).await.unwrap();
                assert_eq!(value, Value::Null, "wire type {}", wire::type_name(code));
            }
        }
    }

    #[tokio::test]
    async fn test_primitives_unmodified() {
        let utc = ConversionOptions::utc();
        assert_eq!(
            convert_one(wire::BIT, Cell::Bool(true), utc).await.unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            convert_one(wire::SMALLINT, Cell::Short(-3), utc).await.unwrap(),
            Value::Short(-3)
        );
        assert_eq!(
            convert_one(wire::INTEGER, Cell::Int(0), utc).await.unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            convert_one(wire::BIGINT, Cell::Long(i64::MAX), utc).await.unwrap(),
            Value::Long(i64::MAX)
        );
        assert_eq!(
            convert_one(wire::REAL, Cell::Float(1.5), utc).await.unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            convert_one(wire::DOUBLE, Cell::Double(0.1), utc).await.unwrap(),
            Value::Double(0.1)
        );
    }

    #[tokio::test]
    async fn test_date_offsets() {
        let value = convert_one(
            wire::DATE,
            Cell::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap();
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    }

    #[tokio::test]
    async fn test_timestamp_nanos_in_utc() {
        let naive = NaiveDate::from_ymd_opt(2021, 6, 15)
            .unwrap()
            .and_hms_nano_opt(10, 20, 30, 547_000_000)
            .unwrap();
        let value = convert_one(wire::TIMESTAMP, Cell::Timestamp(naive), ConversionOptions::utc())
            .await
            .unwrap();
        let ts = value.as_timestamp().unwrap();

        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.nanosecond(), 547_000_000);
        assert_eq!(f64::from(ts.timestamp_subsec_micros()) / 1_000_000.0, 0.547);
        assert_eq!((ts.year(), ts.month(), ts.day()), (2021, 6, 15));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (10, 20, 30));
    }

    #[tokio::test]
    async fn test_timestamp_in_local_keeps_wall_clock() {
        let naive = NaiveDate::from_ymd_opt(2021, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let value = convert_one(wire::TIMESTAMP, Cell::Timestamp(naive), ConversionOptions::local())
            .await
            .unwrap();
        assert_eq!(value.as_timestamp().unwrap().naive_local(), naive);
    }

    #[tokio::test]
    async fn test_time_anchored_to_2000_01_01() {
        let value = convert_one(
            wire::TIME,
            Cell::String("13:45:10.1234567".into()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap();
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (13, 45, 10));
        assert_eq!(ts.nanosecond(), 123_456_700);
    }

    #[tokio::test]
    async fn test_datetimeoffset_converted_to_utc() {
        let value = convert_one(
            wire::DATETIMEOFFSET,
            Cell::String("2020-03-01 02:30:00.5 +02:00".into()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap();
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.to_rfc3339(), "2020-03-01T00:30:00.500+00:00");
    }

    #[tokio::test]
    async fn test_malformed_values_are_conversion_errors() {
        let err = convert_one(
            wire::DATETIMEOFFSET,
            Cell::String("yesterday".into()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Conversion {
                column: 1,
                wire_type: wire::DATETIMEOFFSET,
                ..
            }
        ));

        let err = convert_one(wire::TIME, Cell::String("25:99".into()), ConversionOptions::utc())
            .await
            .unwrap_err();
        assert!(err.is_conversion_error());

        let err = convert_one(wire::DECIMAL, Cell::String("12,5".into()), ConversionOptions::utc())
            .await
            .unwrap_err();
        assert!(err.is_conversion_error());
    }

    #[tokio::test]
    async fn test_decimal_keeps_precision() {
        let value = convert_one(
            wire::NUMERIC,
            Cell::String("12345678901234567890.123456789".into()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap();
        assert_eq!(
            value,
            Value::Decimal(BigDecimal::from_str("12345678901234567890.123456789").unwrap())
        );
    }

    #[tokio::test]
    async fn test_decimal_at_sqlserver_limits() {
        for text in [
            "99999999999999999999999999999999999999",
            "-99999999999999999999999999999999999999",
            "0.100000000000000000000000000000",
            "12345678.901234567890123456789012345678",
        ] {
            let value = convert_one(wire::DECIMAL, Cell::String(text.into()), ConversionOptions::utc())
                .await
                .unwrap();
            let decimal = value.as_decimal().unwrap();
            assert_eq!(decimal.to_string(), text);
        }

        let value = convert_one(
            wire::NUMERIC,
            Cell::String("0.100000000000000000000000000000".into()),
            ConversionOptions::utc(),
        )
        .await
        .unwrap();
        assert_eq!(value.as_decimal().unwrap().as_bigint_and_exponent().1, 30);
    }

    #[tokio::test]
    async fn test_blob_and_clob_are_full_length() {
        let bytes: Vec<u8> = (0..=255).collect();
        let value = convert_one(wire::LONGVARBINARY, Cell::Bytes(bytes.clone()), ConversionOptions::utc())
            .await
            .unwrap();
        assert_eq!(value, Value::Bytes(bytes));

        let text = "x".repeat(10_000);
        let value = convert_one(wire::NCLOB, Cell::String(text.clone()), ConversionOptions::utc())
            .await
            .unwrap();
        assert_eq!(value, Value::String(text));
    }
}
