//! Typed values, rows and column descriptors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{DatasetError, DatasetResult};

/// A converted cell, also used for bind parameters.
///
/// Equality is total: floats compare by bit pattern, so `Value` can be
/// hashed and used inside dataset options.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// `bit` / boolean.
    Bool(bool),
    /// `smallint` / `tinyint`.
    Short(i16),
    /// `int`.
    Int(i32),
    /// `bigint`.
    Long(i64),
    /// `real`.
    Float(f32),
    /// `float`.
    Double(f64),
    /// Character data.
    String(String),
    /// `date`.
    Date(NaiveDate),
    /// Date and time, carrying the offset it was interpreted in.
    Timestamp(DateTime<FixedOffset>),
    /// `decimal` / `numeric` at full precision (up to 38 digits).
    Decimal(BigDecimal),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value widened to `i64`, for any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point value, for `Float` and `Double`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Date value, if this is one.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Timestamp value, if this is one.
    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    /// Decimal value, if this is one.
    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Self::Decimal(v) => Some(v),
            _ => None,
        }
    }

    /// Byte value, if this is one.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Short(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Decimal(v) => v.hash(state),
            Self::Bytes(v) => v.hash(state),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    NaiveDate => Date,
    DateTime<FixedOffset> => Timestamp,
    BigDecimal => Decimal,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// One result column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column label.
    pub name: SmolStr,
    /// Wire type code.
    pub wire_type: i32,
    /// 1-based position in the result.
    pub ordinal: usize,
}

impl ColumnDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<SmolStr>, wire_type: i32, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            wire_type,
            ordinal,
        }
    }
}

/// How rows are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowShape {
    /// Values in column order.
    #[default]
    #[serde(alias = "array")]
    Positional,
    /// Values keyed by column label.
    #[serde(alias = "object", alias = "hash")]
    Labeled,
}

impl FromStr for RowShape {
    type Err = DatasetError;

    fn from_str(s: &str) -> DatasetResult<Self> {
        match s.to_lowercase().as_str() {
            "array" | "positional" => Ok(Self::Positional),
            "object" | "hash" | "labeled" => Ok(Self::Labeled),
            other => Err(DatasetError::config(format!("unknown row shape: {other}"))),
        }
    }
}

impl fmt::Display for RowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => f.write_str("array"),
            Self::Labeled => f.write_str("object"),
        }
    }
}

/// A converted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedRow {
    /// Values in column order.
    Positional(Vec<Value>),
    /// Values keyed by column label, in column order.
    Labeled(IndexMap<SmolStr, Value>),
}

impl TypedRow {
    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Labeled(values) => values.len(),
        }
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a 0-based position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Labeled(values) => values.get_index(index).map(|(_, v)| v),
        }
    }

    /// Value by column label. Always `None` for positional rows.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Positional(_) => None,
            Self::Labeled(values) => values.get(name),
        }
    }

    /// The shape of this row.
    pub fn shape(&self) -> RowShape {
        match self {
            Self::Positional(_) => RowShape::Positional,
            Self::Labeled(_) => RowShape::Labeled,
        }
    }

    /// The values in column order.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Positional(values) => values,
            Self::Labeled(values) => values.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from(Some(5_i32)), Value::Int(5));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from("x"), Value::String("x".into()));
        assert_eq!(Value::Short(7).as_i64(), Some(7));
    }

    #[test]
    fn test_value_json() {
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(Value::Long(42).to_json(), serde_json::json!(42));
        assert_eq!(
            Value::Decimal(BigDecimal::from_str("123.45").unwrap()).to_json(),
            serde_json::json!("123.45")
        );
    }

    #[test]
    fn test_value_equality_is_total() {
        use std::collections::HashSet;

        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Int(1), Value::Long(1));
        assert_eq!(
            Value::Decimal(BigDecimal::from_str("1.50").unwrap()),
            Value::Decimal(BigDecimal::from_str("1.5").unwrap())
        );

        let set: HashSet<Value> = [
            Value::Double(f64::NAN),
            Value::Double(f64::NAN),
            Value::Int(1),
            Value::Long(1),
            Value::from("a"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_row_shape_parse() {
        assert_eq!("array".parse::<RowShape>().unwrap(), RowShape::Positional);
        assert_eq!("object".parse::<RowShape>().unwrap(), RowShape::Labeled);
        assert_eq!("Hash".parse::<RowShape>().unwrap(), RowShape::Labeled);
        assert!("table".parse::<RowShape>().is_err());
    }

    #[test]
    fn test_labeled_row_access() {
        let mut values = IndexMap::new();
        values.insert(SmolStr::new("id"), Value::Int(1));
        values.insert(SmolStr::new("name"), Value::from("ada"));
        let row = TypedRow::Labeled(values);

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1), Some(&Value::from("ada")));
        assert_eq!(row.get_by_name("id"), Some(&Value::Int(1)));
        assert_eq!(
            row.into_values(),
            vec![Value::Int(1), Value::from("ada")]
        );
    }
}
