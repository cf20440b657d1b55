//! Version holders and the per-transaction holder cache.

use super::schema::ShadowKind;
use crate::attribute::{Attribute, AttributeMap, Value};
use crate::store::StagedStore;
use crate::types::Item;
use std::collections::HashMap;

/// Where a holder sits: the trunk or one shadow of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum HolderKey {
    Trunk,
    Shadow(ShadowKind),
}

/// A map that is shared until the first write, then owned.
#[derive(Debug, Clone)]
pub(crate) enum CowMap {
    Unmodified(AttributeMap),
    Modified(AttributeMap),
}

impl CowMap {
    pub(crate) fn current(&self) -> &AttributeMap {
        match self {
            CowMap::Unmodified(map) | CowMap::Modified(map) => map,
        }
    }

    /// Switches to the owned variant. Returns true on the transition.
    pub(crate) fn modify(&mut self) -> bool {
        match self {
            CowMap::Modified(_) => false,
            CowMap::Unmodified(shared) => {
                let owned = shared.clone();
                *self = CowMap::Modified(owned);
                true
            }
        }
    }

    /// Writes into the owned copy, switching to it first.
    pub(crate) fn set(&mut self, attribute: &Attribute, value: Option<Value>) -> bool {
        self.modify();
        match self {
            CowMap::Modified(map) => map.set(attribute, value),
            CowMap::Unmodified(_) => false,
        }
    }
}

/// One resolved version of one item.
#[derive(Debug, Clone)]
pub(crate) enum VersionHolder {
    /// Reads trunk directly.
    Trunk,
    /// An existing shadow's values.
    Shadow(AttributeMap),
    /// A shadow slot whose shadow is absent.
    Empty,
    /// Trunk being written. Holds the trunk's shadowable values as of the
    /// holder's creation until the first shadowable write.
    WriteTrunk { is_new: bool, shadowable: CowMap },
    /// The DOWNLOAD shadow being written from the server branch.
    WriteShadow(CowMap),
}

impl VersionHolder {
    fn load(store: &StagedStore, item: Item, key: HolderKey) -> Self {
        match key {
            HolderKey::Trunk => VersionHolder::Trunk,
            HolderKey::Shadow(kind) => match store.value(item, kind.attribute()) {
                Some(Value::Map(map)) => VersionHolder::Shadow(map.clone()),
                _ => VersionHolder::Empty,
            },
        }
    }

    /// Returns false only for an absent shadow.
    pub(crate) fn exists(&self) -> bool {
        !matches!(self, VersionHolder::Empty)
    }

    /// The shadow map, for shadow holders.
    pub(crate) fn shadow_values(&self) -> Option<&AttributeMap> {
        match self {
            VersionHolder::Shadow(map) => Some(map),
            VersionHolder::WriteShadow(values) => Some(values.current()),
            _ => None,
        }
    }

    /// Effective value of `attribute` in this version.
    ///
    /// Shadow holders answer shadowable attributes from their map only;
    /// absence there means "no override" and yields `None`.
    pub(crate) fn read(
        &self,
        store: &StagedStore,
        item: Item,
        attribute: &Attribute,
        shadowable: bool,
    ) -> Option<Value> {
        match self {
            VersionHolder::Shadow(map) if shadowable => map.get(attribute).cloned(),
            VersionHolder::WriteShadow(values) if shadowable => {
                values.current().get(attribute).cloned()
            }
            VersionHolder::Empty if shadowable => None,
            _ => store.value(item, attribute).cloned(),
        }
    }
}

/// At most one holder per (item, slot) for the life of a transaction.
#[derive(Debug, Default)]
pub(crate) struct HolderCache {
    slots: HashMap<(Item, HolderKey), VersionHolder>,
}

impl HolderCache {
    /// The holder in a slot, loading a read holder on first access.
    pub(crate) fn load(&mut self, store: &StagedStore, item: Item, key: HolderKey) -> &mut VersionHolder {
        self.slots
            .entry((item, key))
            .or_insert_with(|| VersionHolder::load(store, item, key))
    }

    pub(crate) fn get(&self, item: Item, key: HolderKey) -> Option<&VersionHolder> {
        self.slots.get(&(item, key))
    }

    pub(crate) fn get_mut(&mut self, item: Item, key: HolderKey) -> Option<&mut VersionHolder> {
        self.slots.get_mut(&(item, key))
    }

    pub(crate) fn install(&mut self, item: Item, key: HolderKey, holder: VersionHolder) {
        self.slots.insert((item, key), holder);
    }

    /// First existing slot of the server chain, or trunk.
    pub(crate) fn server_key(&mut self, store: &StagedStore, item: Item) -> HolderKey {
        ShadowKind::SERVER_CHAIN
            .into_iter()
            .map(HolderKey::Shadow)
            .find(|&key| self.load(store, item, key).exists())
            .unwrap_or(HolderKey::Trunk)
    }

    /// Moves a loaded shadow slot to match a new shadow value.
    ///
    /// A write holder keeps its place and restarts from the new map.
    pub(crate) fn shadow_changed(&mut self, item: Item, kind: ShadowKind, map: Option<&AttributeMap>) {
        let Some(slot) = self.slots.get_mut(&(item, HolderKey::Shadow(kind))) else {
            return;
        };
        *slot = match (&*slot, map) {
            (VersionHolder::WriteShadow(_), Some(map)) => {
                VersionHolder::WriteShadow(CowMap::Unmodified(map.clone()))
            }
            (_, Some(map)) => VersionHolder::Shadow(map.clone()),
            (_, None) => VersionHolder::Empty,
        };
    }

    pub(crate) fn forget_item(&mut self, item: Item) {
        self.slots.retain(|(slot_item, _), _| *slot_item != item);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
