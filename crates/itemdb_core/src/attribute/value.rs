//! Attribute values.

use super::{AttributeMap, ScalarType};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value stored under an attribute.
///
/// Scalars carry their class directly; `Set` and `List` wrap scalars of one
/// class. `Map` is the payload of a shadow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit integer or item reference.
    Long(i64),
    /// 32-bit integer.
    Int(i32),
    /// Boolean.
    Bool(bool),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Decimal in textual form.
    Decimal(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// List of longs stored as one value.
    LongList(Vec<i64>),
    /// Nested attribute map.
    Map(AttributeMap),
    /// Sorted, deduplicated scalars.
    Set(Vec<Value>),
    /// Ordered scalars.
    List(Vec<Value>),
}

impl Value {
    /// Scalar class of a scalar value; `None` for sets and lists.
    #[must_use]
    pub fn scalar_type(&self) -> Option<ScalarType> {
        Some(match self {
            Value::Long(_) => ScalarType::Long,
            Value::Int(_) => ScalarType::Int,
            Value::Bool(_) => ScalarType::Bool,
            Value::Text(_) => ScalarType::Text,
            Value::Bytes(_) => ScalarType::Bytes,
            Value::Decimal(_) => ScalarType::Decimal,
            Value::Date(_) => ScalarType::Date,
            Value::LongList(_) => ScalarType::LongList,
            Value::Map(_) => ScalarType::AttributeMap,
            Value::Set(_) | Value::List(_) => return None,
        })
    }

    /// Short name of the value's shape, for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Set(_) => "set",
            Value::List(_) => "list",
            other => other.scalar_type().map_or("unknown", ScalarType::name),
        }
    }

    /// Returns true if this is a set or list containing `element`, or a long
    /// list containing it.
    #[must_use]
    pub fn contains(&self, element: &Value) -> bool {
        match (self, element) {
            (Value::Set(values), _) => values.binary_search(element).is_ok(),
            (Value::List(values), _) => values.contains(element),
            (Value::LongList(values), Value::Long(v)) => values.contains(v),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Long(v) | Value::Date(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Decimal(v) => f.write_str(v),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::LongList(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Set(values) | Value::List(values) => {
                let (open, close) = if matches!(self, Value::Set(_)) {
                    ("{", "}")
                } else {
                    ("[", "]")
                };
                f.write_str(open)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(close)
            }
            Value::Map(map) => write!(f, "{map}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<AttributeMap> for Value {
    fn from(v: AttributeMap) -> Self {
        Value::Map(v)
    }
}

impl From<crate::types::Item> for Value {
    fn from(v: crate::types::Item) -> Self {
        Value::Long(v.as_i64())
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    /// Name of the expected shape, for error messages.
    const EXPECTED: &'static str;

    /// Extracts `Self` if the value has the right shape.
    fn from_value(value: &Value) -> Option<Self>;

    /// Extracts `Self` or reports a type mismatch on `attribute`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] when the shape differs.
    fn extract(attribute: &str, value: &Value) -> CoreResult<Self> {
        Self::from_value(value).ok_or_else(|| CoreError::TypeMismatch {
            attribute: attribute.to_string(),
            expected: Self::EXPECTED.to_string(),
            actual: value.kind_name().to_string(),
        })
    }
}

macro_rules! from_value {
    ($ty:ty, $expected:literal, $pattern:pat => $out:expr) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    $pattern => Some($out),
                    _ => None,
                }
            }
        }
    };
}

from_value!(i64, "long", Value::Long(v) | Value::Date(v) => *v);
from_value!(i32, "integer", Value::Int(v) => *v);
from_value!(bool, "boolean", Value::Bool(v) => *v);
from_value!(String, "string", Value::Text(v) | Value::Decimal(v) => v.clone());
from_value!(Vec<u8>, "bytes", Value::Bytes(v) => v.clone());
from_value!(Vec<i64>, "longList", Value::LongList(v) => v.clone());
from_value!(AttributeMap, "attributeMap", Value::Map(v) => v.clone());
from_value!(crate::types::Item, "long", Value::Long(v) => crate::types::Item::new(*v));
