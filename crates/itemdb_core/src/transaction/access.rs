//! The reader and writer surfaces handed to transaction closures.

use super::{CacheKey, Transaction, TransactionCache};
use crate::attribute::system::{Identified, ID, TYPE};
use crate::attribute::{Attribute, AttributeMap, FromValue, Value};
use crate::error::CoreResult;
use crate::query::{BoolExpr, Query};
use crate::scheduler::Gate;
use crate::shadow::{
    Branch, ItemVersion, ShadowEditor, ShadowKind, ShadowableChangeListener, SyncState,
    VersionWriter,
};
use crate::types::{Icn, Item, TransactionId};
use std::rc::Rc;

/// Read access to one transaction's snapshot.
///
/// Plain reads see trunk. Use [`DbReader::read_item`] for branch-aware reads
/// that resolve shadows.
#[derive(Debug, Clone, Copy)]
pub struct DbReader<'t> {
    tx: &'t Transaction,
}

impl<'t> DbReader<'t> {
    pub(crate) fn new(tx: &'t Transaction) -> Self {
        Self { tx }
    }

    /// ICN of the snapshot this transaction started from.
    #[must_use]
    pub fn icn(&self) -> Icn {
        self.tx.icn()
    }

    /// Id of the running transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.tx.id()
    }

    /// Returns true inside write transactions.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.tx.is_writable()
    }

    /// Fails with [`crate::CoreError::Cancelled`] once the caller cancelled.
    ///
    /// Long-running bodies call this at safe points.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when cancellation was requested.
    pub fn check_cancelled(&self) -> CoreResult<()> {
        self.tx.check_cancelled()
    }

    /// Trunk value of `attribute` on `item`.
    #[must_use]
    pub fn get_value(&self, item: Item, attribute: &Attribute) -> Option<Value> {
        self.tx.raw_value(item, attribute)
    }

    /// Typed trunk value.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the stored value has another shape.
    pub fn get<T: FromValue>(&self, item: Item, attribute: &Attribute) -> CoreResult<Option<T>> {
        self.get_value(item, attribute)
            .map(|value| T::extract(attribute.id(), &value))
            .transpose()
    }

    /// All trunk values of `item`, including its shadows.
    #[must_use]
    pub fn values(&self, item: Item) -> AttributeMap {
        self.tx
            .store
            .borrow()
            .values(item)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if `item` has any value.
    #[must_use]
    pub fn is_alive(&self, item: Item) -> bool {
        self.tx.store.borrow().is_alive(item)
    }

    /// Every live item, ascending.
    #[must_use]
    pub fn items(&self) -> Vec<Item> {
        self.tx.store.borrow().alive_items()
    }

    /// Item of a well-known object, if it was ever materialized.
    #[must_use]
    pub fn find_materialized(&self, object: &dyn Identified) -> Option<Item> {
        self.tx.find_identity(object.id())
    }

    /// Item whose identity is `id`.
    #[must_use]
    pub fn find_identity(&self, id: &str) -> Option<Item> {
        self.tx.find_identity(id)
    }

    /// Identity string of `item`, if it is a well-known object.
    #[must_use]
    pub fn identity_of(&self, item: Item) -> Option<String> {
        match self.get_value(item, &ID) {
            Some(Value::Text(id)) => Some(id),
            _ => None,
        }
    }

    /// Type item of `item`.
    #[must_use]
    pub fn type_of(&self, item: Item) -> Option<Item> {
        match self.get_value(item, &TYPE) {
            Some(Value::Long(raw)) => Some(Item::new(raw)),
            _ => None,
        }
    }

    /// Builds a query over this snapshot.
    #[must_use]
    pub fn query(&self, expr: BoolExpr) -> Query<'t> {
        Query::new(*self, expr)
    }

    /// Whether `attribute` is looked up through shadows.
    ///
    /// # Errors
    ///
    /// Fails only if materializing the attribute fails.
    pub fn is_shadowable(&self, attribute: &Attribute) -> CoreResult<bool> {
        self.tx.is_shadowable(attribute)
    }

    /// Negation of [`DbReader::is_shadowable`].
    ///
    /// # Errors
    ///
    /// Fails only if materializing the attribute fails.
    pub fn is_write_through(&self, attribute: &Attribute) -> CoreResult<bool> {
        self.is_shadowable(attribute).map(|s| !s)
    }

    /// Branch-aware view of `item`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` for non-positive ids.
    pub fn read_item(&self, item: Item, branch: Branch) -> CoreResult<ItemVersion<'t>> {
        ItemVersion::on_branch(self.tx, item, branch)
    }

    /// View of one shadow of `item`, if present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` for non-positive ids.
    pub fn read_shadow(&self, item: Item, kind: ShadowKind) -> CoreResult<Option<ItemVersion<'t>>> {
        ItemVersion::on_shadow(self.tx, item, kind)
    }

    /// Server view of `item` if any server shadow exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` for non-positive ids.
    pub fn read_server_if_exists(&self, item: Item) -> CoreResult<Option<ItemVersion<'t>>> {
        ItemVersion::server_if_exists(self.tx, item)
    }

    /// The shadow map of `kind` on `item`.
    #[must_use]
    pub fn shadow(&self, item: Item, kind: ShadowKind) -> Option<AttributeMap> {
        self.tx.shadow_map(item, kind)
    }

    /// Sync state derived from the item's shadows.
    #[must_use]
    pub fn sync_state(&self, item: Item) -> SyncState {
        self.tx.sync_state(item)
    }

    /// This transaction's typed side table.
    #[must_use]
    pub fn transaction_cache(&self) -> &'t TransactionCache {
        &self.tx.context.cache
    }

    /// Shortcut for `transaction_cache().get_or_init`.
    pub fn cached<T: 'static>(&self, key: &CacheKey<T>, init: impl FnOnce() -> T) -> Rc<T> {
        self.transaction_cache().get_or_init(key, init)
    }
}

/// Write access; dereferences to [`DbReader`].
#[derive(Debug, Clone, Copy)]
pub struct DbWriter<'t> {
    reader: DbReader<'t>,
}

impl<'t> std::ops::Deref for DbWriter<'t> {
    type Target = DbReader<'t>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<'t> DbWriter<'t> {
    pub(crate) fn new(tx: &'t Transaction) -> Self {
        Self {
            reader: DbReader::new(tx),
        }
    }

    /// Sets or clears a trunk value directly, with no shadow bookkeeping.
    ///
    /// Returns true if the stored value changed.
    ///
    /// # Errors
    ///
    /// Fails for unallocated items and values that do not fit the attribute.
    pub fn set_value(
        &self,
        item: Item,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> CoreResult<bool> {
        self.reader.tx.set_raw(item, attribute, value)
    }

    /// Sets a trunk value.
    ///
    /// # Errors
    ///
    /// See [`DbWriter::set_value`].
    pub fn set(&self, item: Item, attribute: &Attribute, value: impl Into<Value>) -> CoreResult<bool> {
        self.set_value(item, attribute, Some(value.into()))
    }

    /// Allocates a fresh item id.
    ///
    /// # Errors
    ///
    /// Never fails inside a write transaction.
    pub fn next_item(&self) -> CoreResult<Item> {
        self.reader.tx.allocate()
    }

    /// Removes every value of `item`, shadows included.
    ///
    /// # Errors
    ///
    /// Fails for unallocated items.
    pub fn clear_item(&self, item: Item) -> CoreResult<bool> {
        self.reader.tx.clear(item)
    }

    /// Resolves a well-known object to its item, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails if writing the description fails.
    pub fn materialize(&self, object: &dyn Identified) -> CoreResult<Item> {
        self.reader.tx.materialize(object)
    }

    /// Runs `callback` with the commit's ICN once it is durable.
    ///
    /// Dropped if the transaction fails or is cancelled.
    pub fn on_commit(&self, gate: Gate, callback: impl FnOnce(Icn) + Send + 'static) {
        self.reader.tx.add_post_commit(gate, Box::new(callback));
    }

    /// Creates a new item and returns its trunk writer, flagged new.
    ///
    /// # Errors
    ///
    /// Never fails inside a write transaction.
    pub fn create_item(&self) -> CoreResult<VersionWriter<'t>> {
        VersionWriter::create(self.reader.tx)
    }

    /// Writer for `item` on `branch`.
    ///
    /// Items that cannot be resolved get a writer that discards its writes.
    ///
    /// # Errors
    ///
    /// Never fails inside a write transaction.
    pub fn write_item(&self, item: Item, branch: Branch) -> CoreResult<VersionWriter<'t>> {
        VersionWriter::open(self.reader.tx, item, branch)
    }

    /// Trunk writer for `item`.
    ///
    /// # Errors
    ///
    /// See [`DbWriter::write_item`].
    pub fn change_item(&self, item: Item) -> CoreResult<VersionWriter<'t>> {
        self.write_item(item, Branch::Trunk)
    }

    /// Server-branch writer for `item`; shadowable writes land in DOWNLOAD.
    ///
    /// # Errors
    ///
    /// See [`DbWriter::write_item`].
    pub fn change_server(&self, item: Item) -> CoreResult<VersionWriter<'t>> {
        self.write_item(item, Branch::Server)
    }

    /// A writer that discards everything and logs once.
    #[must_use]
    pub fn dummy_writer(&self, item: Item, branch: Branch) -> VersionWriter<'t> {
        VersionWriter::dummy(self.reader.tx, item, branch)
    }

    /// Shadow mutation and merge operations.
    #[must_use]
    pub fn shadows(&self) -> ShadowEditor<'t> {
        ShadowEditor::new(self.reader.tx)
    }

    /// Replaces the default BASE policy for this transaction.
    ///
    /// # Errors
    ///
    /// Registering twice in one transaction is a consistency violation.
    pub fn set_shadowable_listener(
        &self,
        listener: impl ShadowableChangeListener + 'static,
    ) -> CoreResult<()> {
        self.shadows().set_listener(Rc::new(listener))
    }
}
