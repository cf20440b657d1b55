//! The self-describing schema.
//!
//! Every well-known object (attribute or item type) can be *materialized*: given
//! an item whose `ID` value is its string id, whose `TYPE` points at the item of
//! its item type, and whose remaining values describe it. Materialization is
//! recursive: an attribute's item carries `TYPE = <ATTRIBUTE type item>`, whose
//! own item carries `TYPE = <TYPE type item>`, which points at itself.

use super::{Attribute, AttributeMap, ScalarType, Value};
use std::sync::LazyLock;

/// String identity of the object. Indexed by the store.
pub static ID: LazyLock<Attribute> = LazyLock::new(|| Attribute::text("sys:id", "Identity"));

/// Display name of the object.
pub static NAME: LazyLock<Attribute> = LazyLock::new(|| Attribute::text("sys:name", "Name"));

/// Item of the object's type.
pub static TYPE: LazyLock<Attribute> = LazyLock::new(|| Attribute::long("sys:type", "Type"));

/// Durable scalar type name of an attribute item.
pub static SCALAR_CLASS: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::text("sys:attr:scalar", "Scalar class"));

/// Composition name of an attribute item.
pub static SCALAR_COMPOSITION: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::text("sys:attr:composition", "Composition"));

/// Present and true on attribute items whose changes propagate.
pub static PROPAGATING_CHANGE: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::bool("sys:attr:propagating", "Propagating change"));

/// Present and true on attribute items that are shadowable. Written once at
/// materialization, never changed afterwards.
pub static IS_SHADOWABLE: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::bool("sys:attr:shadowable", "Shadowable"));

/// The type of item types.
pub static TYPE_TYPE: LazyLock<ItemType> = LazyLock::new(|| ItemType::new("sys:t:type", "Type"));

/// The type of attribute items.
pub static ATTRIBUTE_TYPE: LazyLock<ItemType> =
    LazyLock::new(|| ItemType::new("sys:t:attribute", "Attribute"));

/// A well-known object that can be resolved to an item.
pub trait Identified {
    /// Stable string id, stored under [`ID`].
    fn id(&self) -> &str;

    /// Display name, stored under [`NAME`].
    fn name(&self) -> &str;

    /// Type of the object's item.
    fn item_type(&self) -> &ItemType;

    /// Extra values written when the object is materialized.
    fn init_values(&self) -> AttributeMap {
        AttributeMap::new()
    }
}

/// A named item type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemType {
    id: String,
    name: String,
}

impl ItemType {
    /// Creates an item type.
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

impl Identified for ItemType {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn item_type(&self) -> &ItemType {
        &TYPE_TYPE
    }
}

impl Identified for Attribute {
    fn id(&self) -> &str {
        Attribute::id(self)
    }

    fn name(&self) -> &str {
        Attribute::name(self)
    }

    fn item_type(&self) -> &ItemType {
        &ATTRIBUTE_TYPE
    }

    fn init_values(&self) -> AttributeMap {
        let mut values = AttributeMap::new()
            .with(&SCALAR_CLASS, self.scalar_type().name())
            .with(&SCALAR_COMPOSITION, self.composition().name());
        if self.is_propagating_change() {
            values.set(&PROPAGATING_CHANGE, Some(Value::Bool(true)));
        }
        // Map-valued attributes hold shadows and are never shadowed themselves.
        if self.declared_shadowable() && self.scalar_type() != ScalarType::AttributeMap {
            values.set(&IS_SHADOWABLE, Some(Value::Bool(true)));
        }
        values
    }
}

/// An arbitrary well-known object of a caller-defined type.
#[derive(Debug, Clone)]
pub struct WellKnown {
    id: String,
    name: String,
    item_type: ItemType,
    values: AttributeMap,
}

impl WellKnown {
    /// Creates a well-known object.
    #[must_use]
    pub fn new(id: &str, name: &str, item_type: ItemType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            item_type,
            values: AttributeMap::new(),
        }
    }

    /// Adds a value written at materialization.
    #[must_use]
    pub fn with(mut self, attribute: &Attribute, value: impl Into<Value>) -> Self {
        self.values.set(attribute, Some(value.into()));
        self
    }
}

impl Identified for WellKnown {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn item_type(&self) -> &ItemType {
        &self.item_type
    }

    fn init_values(&self) -> AttributeMap {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_init_values() {
        let a = Attribute::int("t:a", "A").shadowable().propagating();
        let values = a.init_values();
        assert_eq!(values.get(&SCALAR_CLASS), Some(&Value::Text("integer".into())));
        assert_eq!(values.get(&SCALAR_COMPOSITION), Some(&Value::Text("scalar".into())));
        assert_eq!(values.get(&IS_SHADOWABLE), Some(&Value::Bool(true)));
        assert_eq!(values.get(&PROPAGATING_CHANGE), Some(&Value::Bool(true)));
    }

    #[test]
    fn map_attributes_are_never_shadowable() {
        let m = Attribute::map("t:m", "M").shadowable();
        assert!(!m.init_values().contains(&IS_SHADOWABLE));
    }

    #[test]
    fn type_chain() {
        assert_eq!(Identified::item_type(&*ID).id(), "sys:t:attribute");
        assert_eq!(ATTRIBUTE_TYPE.item_type().id(), "sys:t:type");
        assert_eq!(TYPE_TYPE.item_type(), &*TYPE_TYPE);
    }
}
