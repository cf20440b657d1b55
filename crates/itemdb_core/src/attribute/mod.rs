//! Attribute model.
//!
//! An [`Attribute`] describes one kind of value an item can carry: its scalar
//! class, whether it holds one value, a set or a list, and whether a change to
//! it propagates to items that point at the carrier. Attributes are identified
//! by their string id; two handles with the same id are the same attribute.
//!
//! Attributes are themselves items. The first time a write transaction needs
//! to know something the store records about an attribute (for example whether
//! it is shadowable) the attribute is *materialized*: given an item whose
//! values describe it. See [`system`] for the self-describing schema.
//!
//! # Usage
//!
//! ```rust,ignore
//! use itemdb_core::{Attribute, ScalarType};
//!
//! let summary = Attribute::text("tracker:summary", "Summary").shadowable();
//! let watchers = Attribute::long_set("tracker:watchers", "Watchers");
//! ```

mod map;
pub mod system;
mod value;

pub use map::AttributeMap;
pub use value::{FromValue, Value};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Scalar class of an attribute value.
///
/// The names returned by [`ScalarType::name`] are written to the store when an
/// attribute is materialized. They are part of the durable schema and must
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// 64-bit integer, also used for item references.
    Long,
    /// 32-bit integer.
    Int,
    /// Boolean flag.
    Bool,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Bytes,
    /// Decimal number kept in its textual form.
    Decimal,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Ordered list of longs stored as one value.
    LongList,
    /// A nested attribute map.
    AttributeMap,
}

impl ScalarType {
    /// Every scalar type.
    pub const ALL: [ScalarType; 9] = [
        ScalarType::Long,
        ScalarType::Int,
        ScalarType::Bool,
        ScalarType::Text,
        ScalarType::Bytes,
        ScalarType::Decimal,
        ScalarType::Date,
        ScalarType::LongList,
        ScalarType::AttributeMap,
    ];

    /// Durable name of this scalar type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Long => "long",
            ScalarType::Int => "integer",
            ScalarType::Bool => "boolean",
            ScalarType::Text => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Decimal => "decimal",
            ScalarType::Date => "date",
            ScalarType::LongList => "longList",
            ScalarType::AttributeMap => "attributeMap",
        }
    }

    /// Looks a scalar type up by its durable name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// How many values an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Composition {
    /// A single value.
    Scalar,
    /// An unordered collection without duplicates.
    Set,
    /// An ordered collection.
    List,
}

impl Composition {
    /// Durable name of this composition.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Composition::Scalar => "scalar",
            Composition::Set => "set",
            Composition::List => "list",
        }
    }
}

/// Full description of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Stable string identity.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Scalar class of each value.
    pub scalar: ScalarType,
    /// Single value, set or list.
    pub composition: Composition,
    /// Whether a change propagates to referring items.
    pub propagating_change: bool,
    /// Whether the attribute is declared shadowable when materialized.
    pub shadowable: bool,
}

/// A shared handle to an attribute description.
///
/// Equality, ordering and hashing use the id only.
#[derive(Clone)]
pub struct Attribute(Arc<AttributeDef>);

impl Attribute {
    /// Creates an attribute from a full description.
    #[must_use]
    pub fn new(def: AttributeDef) -> Self {
        Self(Arc::new(def))
    }

    /// Creates a scalar, write-through, non-propagating attribute.
    #[must_use]
    pub fn scalar(id: &str, name: &str, scalar: ScalarType) -> Self {
        Self::composed(id, name, scalar, Composition::Scalar)
    }

    /// Creates an attribute with the given composition.
    #[must_use]
    pub fn composed(id: &str, name: &str, scalar: ScalarType, composition: Composition) -> Self {
        Self::new(AttributeDef {
            id: id.to_string(),
            name: name.to_string(),
            scalar,
            composition,
            propagating_change: false,
            shadowable: false,
        })
    }

    /// Single long attribute.
    #[must_use]
    pub fn long(id: &str, name: &str) -> Self {
        Self::scalar(id, name, ScalarType::Long)
    }

    /// Single int attribute.
    #[must_use]
    pub fn int(id: &str, name: &str) -> Self {
        Self::scalar(id, name, ScalarType::Int)
    }

    /// Single boolean attribute.
    #[must_use]
    pub fn bool(id: &str, name: &str) -> Self {
        Self::scalar(id, name, ScalarType::Bool)
    }

    /// Single text attribute.
    #[must_use]
    pub fn text(id: &str, name: &str) -> Self {
        Self::scalar(id, name, ScalarType::Text)
    }

    /// Attribute-map attribute.
    #[must_use]
    pub fn map(id: &str, name: &str) -> Self {
        Self::scalar(id, name, ScalarType::AttributeMap)
    }

    /// Set of longs, typically item references.
    #[must_use]
    pub fn long_set(id: &str, name: &str) -> Self {
        Self::composed(id, name, ScalarType::Long, Composition::Set)
    }

    /// Returns this attribute declared shadowable.
    #[must_use]
    pub fn shadowable(self) -> Self {
        self.modified(|def| def.shadowable = true)
    }

    /// Returns this attribute declared as propagating changes.
    #[must_use]
    pub fn propagating(self) -> Self {
        self.modified(|def| def.propagating_change = true)
    }

    fn modified(self, change: impl FnOnce(&mut AttributeDef)) -> Self {
        let mut def = Arc::unwrap_or_clone(self.0);
        change(&mut def);
        Self::new(def)
    }

    /// Stable id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Scalar class.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        self.0.scalar
    }

    /// Composition.
    #[must_use]
    pub fn composition(&self) -> Composition {
        self.0.composition
    }

    /// Whether changes propagate to referring items.
    #[must_use]
    pub fn is_propagating_change(&self) -> bool {
        self.0.propagating_change
    }

    /// Whether the attribute is declared shadowable. The store's own record
    /// decides once the attribute is materialized.
    #[must_use]
    pub fn declared_shadowable(&self) -> bool {
        self.0.shadowable
    }

    /// Full description.
    #[must_use]
    pub fn def(&self) -> &AttributeDef {
        &self.0
    }

    /// Validates and normalizes a value for this attribute.
    ///
    /// Set values come back sorted and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] when the value's shape or scalar
    /// class does not match.
    pub fn normalize(&self, value: Value) -> CoreResult<Value> {
        match (self.composition(), value) {
            (Composition::Scalar, value) => {
                self.check_scalar(&value)?;
                Ok(value)
            }
            (Composition::Set, Value::Set(mut elements)) => {
                for element in &elements {
                    self.check_scalar(element)?;
                }
                elements.sort();
                elements.dedup();
                Ok(Value::Set(elements))
            }
            (Composition::List, Value::List(elements)) => {
                for element in &elements {
                    self.check_scalar(element)?;
                }
                Ok(Value::List(elements))
            }
            (composition, other) => Err(self.mismatch(composition.name(), &other)),
        }
    }

    fn check_scalar(&self, value: &Value) -> CoreResult<()> {
        if value.scalar_type() == Some(self.scalar_type()) {
            Ok(())
        } else {
            Err(self.mismatch(self.scalar_type().name(), value))
        }
    }

    fn mismatch(&self, expected: &str, value: &Value) -> CoreError {
        CoreError::TypeMismatch {
            attribute: self.id().to_string(),
            expected: expected.to_string(),
            actual: value.kind_name().to_string(),
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({})", self.0.id)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.id)
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        AttributeDef::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_the_id() {
        let a = Attribute::int("t:a", "A");
        let b = Attribute::text("t:a", "Other name");
        assert_eq!(a, b);
        assert_ne!(a, Attribute::int("t:b", "B"));
    }

    #[test]
    fn builder_flags() {
        let a = Attribute::int("t:a", "A").shadowable().propagating();
        assert!(a.declared_shadowable());
        assert!(a.is_propagating_change());
        assert!(!Attribute::int("t:a", "A").declared_shadowable());
    }

    #[test]
    fn scalar_names_are_stable() {
        let names: Vec<_> = ScalarType::ALL.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "long",
                "integer",
                "boolean",
                "string",
                "bytes",
                "decimal",
                "date",
                "longList",
                "attributeMap"
            ]
        );
        for t in ScalarType::ALL {
            assert_eq!(ScalarType::from_name(t.name()), Some(t));
        }
    }

    #[test]
    fn normalize_sorts_sets() {
        let watchers = Attribute::long_set("t:w", "Watchers");
        let value = watchers
            .normalize(Value::Set(vec![Value::Long(3), Value::Long(1), Value::Long(3)]))
            .unwrap();
        assert_eq!(value, Value::Set(vec![Value::Long(1), Value::Long(3)]));
    }

    #[test]
    fn normalize_rejects_wrong_scalar() {
        let a = Attribute::int("t:a", "A");
        let err = a.normalize(Value::Text("x".into())).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn normalize_rejects_wrong_shape() {
        let watchers = Attribute::long_set("t:w", "Watchers");
        assert!(watchers.normalize(Value::Long(1)).is_err());
    }
}
