//! Branch resolution and shadow-aware writes on a transaction.

use super::editor::{BaseShadowPolicy, ShadowableChangeListener};
use super::holder::{CowMap, HolderKey, VersionHolder};
use super::schema::{is_invisible, ShadowKind, ShadowPresence, SyncState, INVISIBLE};
use super::version::VersionSource;
use crate::attribute::{Attribute, AttributeMap, Value};
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use crate::types::Item;

impl Transaction {
    fn holder_key(&self, item: Item, source: VersionSource) -> HolderKey {
        match source {
            VersionSource::Trunk => HolderKey::Trunk,
            VersionSource::Shadow(kind) => HolderKey::Shadow(kind),
            VersionSource::Server => {
                let store = self.store.borrow();
                self.context.holders.borrow_mut().server_key(&store, item)
            }
        }
    }

    /// Value of `attribute` in one version of `item`.
    pub(crate) fn version_value(
        &self,
        item: Item,
        source: VersionSource,
        attribute: &Attribute,
    ) -> CoreResult<Option<Value>> {
        // Classification may materialize, so it runs before any borrow.
        let shadowable = self.is_shadowable(attribute)?;
        let key = self.holder_key(item, source);
        let store = self.store.borrow();
        let mut holders = self.context.holders.borrow_mut();
        let holder = holders.load(&store, item, key);
        Ok(holder.read(&store, item, attribute, shadowable))
    }

    /// Shadowable trunk values of `item`.
    pub(crate) fn trunk_shadowables(&self, item: Item) -> CoreResult<AttributeMap> {
        let values = self.store.borrow().values(item).cloned().unwrap_or_default();
        let mut shadowable = AttributeMap::new();
        for (attribute, value) in values.iter() {
            if self.is_shadowable(attribute)? {
                shadowable.set(attribute, Some(value.clone()));
            }
        }
        Ok(shadowable)
    }

    /// Shadowable values of one version of `item`.
    pub(crate) fn version_shadowables(
        &self,
        item: Item,
        source: VersionSource,
    ) -> CoreResult<AttributeMap> {
        match self.holder_key(item, source) {
            HolderKey::Trunk => self.trunk_shadowables(item),
            key => {
                let store = self.store.borrow();
                let mut holders = self.context.holders.borrow_mut();
                Ok(holders
                    .load(&store, item, key)
                    .shadow_values()
                    .cloned()
                    .unwrap_or_default())
            }
        }
    }

    /// The stored shadow map of `kind` on `item`.
    pub(crate) fn shadow_map(&self, item: Item, kind: ShadowKind) -> Option<AttributeMap> {
        match self.raw_value(item, kind.attribute()) {
            Some(Value::Map(map)) => Some(map),
            _ => None,
        }
    }

    /// Starting values of a DOWNLOAD created by a server-branch write.
    ///
    /// An invisible CONFLICT or BASE means the server holds nothing, so the
    /// download starts empty rather than deleted.
    pub(crate) fn server_fallback(&self, item: Item) -> CoreResult<AttributeMap> {
        for kind in [ShadowKind::Conflict, ShadowKind::Base] {
            if let Some(map) = self.shadow_map(item, kind) {
                return Ok(if is_invisible(&map) { AttributeMap::new() } else { map });
            }
        }
        self.trunk_shadowables(item)
    }

    /// Replaces or removes one shadow and keeps loaded holders in step.
    pub(crate) fn set_shadow(
        &self,
        item: Item,
        kind: ShadowKind,
        map: Option<AttributeMap>,
    ) -> CoreResult<bool> {
        let changed = self.set_raw(item, kind.attribute(), map.clone().map(Value::Map))?;
        if changed {
            self.context
                .holders
                .borrow_mut()
                .shadow_changed(item, kind, map.as_ref());
        }
        Ok(changed)
    }

    /// Trunk write with BASE bookkeeping.
    ///
    /// The first shadowable change of `item` in this transaction calls the
    /// shadowable-change listener before trunk is touched.
    pub(crate) fn write_trunk(
        &self,
        item: Item,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> CoreResult<bool> {
        if !self.is_shadowable(attribute)? {
            return self.set_raw(item, attribute, value);
        }
        self.check_writable()?;
        self.check_item(item)?;
        let value = value.map(|v| attribute.normalize(v)).transpose()?;
        if self.raw_value(item, attribute) == value {
            return Ok(false);
        }

        let installed = matches!(
            self.context.holders.borrow().get(item, HolderKey::Trunk),
            Some(VersionHolder::WriteTrunk { .. })
        );
        if !installed {
            let snapshot = self.trunk_shadowables(item)?;
            self.context.holders.borrow_mut().install(
                item,
                HolderKey::Trunk,
                VersionHolder::WriteTrunk {
                    is_new: false,
                    shadowable: CowMap::Unmodified(snapshot),
                },
            );
        }

        let first_change = match self.context.holders.borrow_mut().get_mut(item, HolderKey::Trunk) {
            Some(VersionHolder::WriteTrunk { is_new, shadowable }) => {
                shadowable.modify().then_some(*is_new)
            }
            _ => None,
        };
        if let Some(is_new) = first_change {
            self.notify_shadowable_change(item, is_new)?;
        }

        let changed = self.set_raw(item, attribute, value.clone())?;
        if let Some(VersionHolder::WriteTrunk { shadowable, .. }) =
            self.context.holders.borrow_mut().get_mut(item, HolderKey::Trunk)
        {
            shadowable.set(attribute, value);
        }
        Ok(changed)
    }

    /// Server-branch write: shadowable values land in DOWNLOAD.
    pub(crate) fn write_server(
        &self,
        item: Item,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> CoreResult<bool> {
        if !self.is_shadowable(attribute)? {
            return self.set_raw(item, attribute, value);
        }
        self.check_writable()?;
        self.check_item(item)?;
        let value = value.map(|v| attribute.normalize(v)).transpose()?;
        let key = HolderKey::Shadow(ShadowKind::Download);

        let installed = matches!(
            self.context.holders.borrow().get(item, key),
            Some(VersionHolder::WriteShadow(_))
        );
        if !installed {
            let initial = match self.shadow_map(item, ShadowKind::Download) {
                Some(map) => map,
                None => self.server_fallback(item)?,
            };
            self.context.holders.borrow_mut().install(
                item,
                key,
                VersionHolder::WriteShadow(CowMap::Unmodified(initial)),
            );
        }

        let download = match self.context.holders.borrow_mut().get_mut(item, key) {
            Some(VersionHolder::WriteShadow(values)) => {
                if !values.set(attribute, value) {
                    return Ok(false);
                }
                values.current().clone()
            }
            _ => {
                return Err(CoreError::consistency(format!(
                    "download holder of {item} is not writable"
                )))
            }
        };
        self.set_raw(item, ShadowKind::Download.attribute(), Some(Value::Map(download)))
    }

    fn notify_shadowable_change(&self, item: Item, is_new: bool) -> CoreResult<()> {
        let listener = self.context.shadow_listener.borrow().clone();
        let writer = self.writer()?;
        tracing::trace!(txn = %self.id(), %item, is_new, "first shadowable change");
        match listener {
            Some(listener) => listener.before_shadowable_changed(&writer, item, is_new),
            None => BaseShadowPolicy.before_shadowable_changed(&writer, item, is_new),
        }
    }

    /// Sync state of `item` from its BASE, CONFLICT and trunk INVISIBLE.
    pub(crate) fn sync_state(&self, item: Item) -> SyncState {
        SyncState::classify(ShadowPresence {
            base: self.shadow_map(item, ShadowKind::Base).map(|m| is_invisible(&m)),
            conflict: self
                .shadow_map(item, ShadowKind::Conflict)
                .map(|m| is_invisible(&m)),
            trunk_deleted: matches!(self.raw_value(item, &INVISIBLE), Some(Value::Bool(true))),
        })
    }
}
