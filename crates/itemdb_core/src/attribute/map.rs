//! Copy-on-write attribute maps.

use super::{Attribute, Value};
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An attribute to value mapping with cheap clones.
///
/// Clones share storage until one of them is mutated, at which point the
/// mutated clone takes a private copy. Iteration is ordered by attribute id.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeMap(Arc<BTreeMap<Attribute, Value>>);

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `attribute`.
    #[must_use]
    pub fn get(&self, attribute: &Attribute) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// Returns true if `attribute` has a value.
    #[must_use]
    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.0.contains_key(attribute)
    }

    /// Sets or removes a value. Returns true if the map changed.
    pub fn set(&mut self, attribute: &Attribute, value: Option<Value>) -> bool {
        if self.0.get(attribute) == value.as_ref() {
            return false;
        }
        let entries = Arc::make_mut(&mut self.0);
        match value {
            Some(value) => {
                entries.insert(attribute.clone(), value);
            }
            None => {
                entries.remove(attribute);
            }
        }
        true
    }

    /// Inserts a value, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, attribute: &Attribute, value: impl Into<Value>) -> Self {
        self.set(attribute, Some(value.into()));
        self
    }

    /// Number of attributes with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no attribute has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in attribute id order.
    pub fn iter(&self) -> btree_map::Iter<'_, Attribute, Value> {
        self.0.iter()
    }

    /// Iterates attributes in id order.
    pub fn attributes(&self) -> btree_map::Keys<'_, Attribute, Value> {
        self.0.keys()
    }

    /// Returns true if both maps share the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Attributes whose values differ between `self` and `other`, in id order.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<Attribute> {
        if self.ptr_eq(other) {
            return Vec::new();
        }
        let mut changed: Vec<Attribute> = self
            .iter()
            .filter(|(attribute, value)| other.get(attribute) != Some(*value))
            .map(|(attribute, _)| attribute.clone())
            .collect();
        changed.extend(
            other
                .attributes()
                .filter(|attribute| !self.contains(attribute))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

impl FromIterator<(Attribute, Value)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (Attribute, Value)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = (&'a Attribute, &'a Value);
    type IntoIter = btree_map::Iter<'a, Attribute, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(a, v)| (a.id(), v)))
            .finish()
    }
}

impl fmt::Display for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (attribute, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={value}", attribute.id())?;
        }
        f.write_str("}")
    }
}

// Serialized as a sequence of pairs so attribute descriptions travel with
// their values.
impl Serialize for AttributeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for entry in self.iter() {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AttributeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = AttributeMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of attribute/value pairs")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<AttributeMap, A::Error> {
                let mut entries = BTreeMap::new();
                while let Some((attribute, value)) = seq.next_element::<(Attribute, Value)>()? {
                    entries.insert(attribute, value);
                }
                Ok(AttributeMap(Arc::new(entries)))
            }
        }

        deserializer.deserialize_seq(PairsVisitor)
    }
}
