//! Branch-aware item views and writers.

use super::holder::{CowMap, HolderKey, VersionHolder};
use super::schema::{ShadowKind, SyncState, INVISIBLE};
use crate::attribute::{Attribute, AttributeMap, FromValue, Value};
use crate::error::CoreResult;
use crate::transaction::{CacheKey, DbReader, DbWriter, Transaction};
use crate::types::Item;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// The two logical branches of every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// The local, authoritative version.
    Trunk,
    /// The last known remote version.
    Server,
}

/// What an [`ItemVersion`] reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum VersionSource {
    Trunk,
    Server,
    Shadow(ShadowKind),
}

/// One version of one item, resolved within a transaction.
///
/// Write-through attributes always read from trunk. Shadowable attributes
/// read from whichever version this view was opened on.
#[derive(Debug, Clone, Copy)]
pub struct ItemVersion<'t> {
    tx: &'t Transaction,
    item: Item,
    source: VersionSource,
}

impl<'t> ItemVersion<'t> {
    pub(crate) fn on_branch(tx: &'t Transaction, item: Item, branch: Branch) -> CoreResult<Self> {
        let item = Item::checked(item.as_i64())?;
        let source = match branch {
            Branch::Trunk => VersionSource::Trunk,
            Branch::Server => VersionSource::Server,
        };
        Ok(Self { tx, item, source })
    }

    pub(crate) fn on_shadow(
        tx: &'t Transaction,
        item: Item,
        kind: ShadowKind,
    ) -> CoreResult<Option<Self>> {
        let item = Item::checked(item.as_i64())?;
        Ok(tx.shadow_map(item, kind).map(|_| Self {
            tx,
            item,
            source: VersionSource::Shadow(kind),
        }))
    }

    pub(crate) fn server_if_exists(tx: &'t Transaction, item: Item) -> CoreResult<Option<Self>> {
        let item = Item::checked(item.as_i64())?;
        let exists = ShadowKind::SERVER_CHAIN
            .iter()
            .any(|&kind| tx.shadow_map(item, kind).is_some());
        Ok(exists.then_some(Self {
            tx,
            item,
            source: VersionSource::Server,
        }))
    }

    /// The item.
    #[must_use]
    pub fn item(&self) -> Item {
        self.item
    }

    /// The branch, unless this view reads a specific shadow.
    #[must_use]
    pub fn branch(&self) -> Option<Branch> {
        match self.source {
            VersionSource::Trunk => Some(Branch::Trunk),
            VersionSource::Server => Some(Branch::Server),
            VersionSource::Shadow(_) => None,
        }
    }

    /// The shadow, if this view reads one.
    #[must_use]
    pub fn shadow(&self) -> Option<ShadowKind> {
        match self.source {
            VersionSource::Shadow(kind) => Some(kind),
            _ => None,
        }
    }

    /// Reader of the enclosing transaction.
    #[must_use]
    pub fn reader(&self) -> DbReader<'t> {
        self.tx.reader()
    }

    /// Value of `attribute` in this version.
    ///
    /// # Errors
    ///
    /// Fails if classifying `attribute` fails.
    pub fn get_value(&self, attribute: &Attribute) -> CoreResult<Option<Value>> {
        self.tx.version_value(self.item, self.source, attribute)
    }

    /// Typed value of `attribute` in this version.
    ///
    /// # Errors
    ///
    /// Fails on classification errors and type mismatches.
    pub fn get<T: FromValue>(&self, attribute: &Attribute) -> CoreResult<Option<T>> {
        self.get_value(attribute)?
            .map(|value| T::extract(attribute.id(), &value))
            .transpose()
    }

    /// Every shadowable value of this version.
    ///
    /// # Errors
    ///
    /// Fails if classifying a trunk attribute fails.
    pub fn all_shadowable(&self) -> CoreResult<AttributeMap> {
        self.tx.version_shadowables(self.item, self.source)
    }

    /// Returns true if this version marks the item as not existing.
    ///
    /// # Errors
    ///
    /// See [`ItemVersion::get_value`].
    pub fn is_invisible(&self) -> CoreResult<bool> {
        Ok(matches!(self.get_value(&INVISIBLE)?, Some(Value::Bool(true))))
    }

    /// Sync state of the item.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.tx.sync_state(self.item)
    }

    /// The same item on another branch.
    #[must_use]
    pub fn switch_branch(&self, branch: Branch) -> Self {
        let source = match branch {
            Branch::Trunk => VersionSource::Trunk,
            Branch::Server => VersionSource::Server,
        };
        Self { source, ..*self }
    }
}

/// How a [`VersionWriter`] applies writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterMode {
    Trunk { is_new: bool },
    Server,
    /// Discards writes; used for items that cannot be resolved.
    Dummy,
}

/// Writer modes resolved so far, one per (item, branch).
#[derive(Debug, Default)]
pub(crate) struct BranchCache {
    writers: HashMap<(Item, Branch), WriterMode>,
}

impl BranchCache {
    fn resolve(&mut self, item: Item, branch: Branch, mode: impl FnOnce() -> WriterMode) -> WriterMode {
        *self.writers.entry((item, branch)).or_insert_with(mode)
    }

    fn record(&mut self, item: Item, branch: Branch, mode: WriterMode) {
        self.writers.insert((item, branch), mode);
    }

    pub(crate) fn forget_item(&mut self, item: Item) {
        self.writers.retain(|(slot_item, _), _| *slot_item != item);
    }
}

static DUMMY_WARNED: CacheKey<RefCell<HashSet<(Item, Branch)>>> =
    CacheKey::new("shadow.dummy-warned");

/// Writes one branch of one item.
///
/// Trunk writers keep BASE up to date before the first shadowable change.
/// Server writers put shadowable values into DOWNLOAD. Write-through
/// attributes go to trunk from either branch.
#[derive(Debug, Clone, Copy)]
pub struct VersionWriter<'t> {
    version: ItemVersion<'t>,
    mode: WriterMode,
}

impl<'t> std::ops::Deref for VersionWriter<'t> {
    type Target = ItemVersion<'t>;

    fn deref(&self) -> &Self::Target {
        &self.version
    }
}

impl<'t> VersionWriter<'t> {
    pub(crate) fn create(tx: &'t Transaction) -> CoreResult<Self> {
        let item = tx.allocate()?;
        tx.context.holders.borrow_mut().install(
            item,
            HolderKey::Trunk,
            VersionHolder::WriteTrunk {
                is_new: true,
                shadowable: CowMap::Unmodified(AttributeMap::new()),
            },
        );
        let mode = WriterMode::Trunk { is_new: true };
        tx.context
            .branches
            .borrow_mut()
            .record(item, Branch::Trunk, mode);
        Ok(Self {
            version: ItemVersion {
                tx,
                item,
                source: VersionSource::Trunk,
            },
            mode,
        })
    }

    pub(crate) fn open(tx: &'t Transaction, item: Item, branch: Branch) -> CoreResult<Self> {
        tx.check_writable()?;
        if tx.check_item(item).is_err() {
            return Ok(Self::dummy(tx, item, branch));
        }
        let mode = tx
            .context
            .branches
            .borrow_mut()
            .resolve(item, branch, || match branch {
                Branch::Trunk => WriterMode::Trunk { is_new: false },
                Branch::Server => WriterMode::Server,
            });
        Ok(Self {
            version: ItemVersion::on_branch(tx, item, branch)?,
            mode,
        })
    }

    pub(crate) fn dummy(tx: &'t Transaction, item: Item, branch: Branch) -> Self {
        let source = match branch {
            Branch::Trunk => VersionSource::Trunk,
            Branch::Server => VersionSource::Server,
        };
        Self {
            version: ItemVersion { tx, item, source },
            mode: WriterMode::Dummy,
        }
    }

    /// Writer of the enclosing transaction.
    ///
    /// # Errors
    ///
    /// Never fails for a writer obtained from a write transaction.
    pub fn writer(&self) -> CoreResult<DbWriter<'t>> {
        self.version.tx.writer()
    }

    /// Sets or clears one value. Returns true if the stored value changed.
    ///
    /// # Errors
    ///
    /// Fails on cancellation, value/type mismatches and listener errors.
    pub fn set_value(&self, attribute: &Attribute, value: Option<Value>) -> CoreResult<bool> {
        let tx = self.version.tx;
        tx.check_cancelled()?;
        let item = self.version.item;
        match self.mode {
            WriterMode::Trunk { .. } => tx.write_trunk(item, attribute, value),
            WriterMode::Server => tx.write_server(item, attribute, value),
            WriterMode::Dummy => {
                let branch = self.version.branch().unwrap_or(Branch::Trunk);
                let warned = tx.context.cache.get_or_init(&DUMMY_WARNED, Default::default);
                if warned.borrow_mut().insert((item, branch)) {
                    tracing::warn!(
                        txn = %tx.id(),
                        %item,
                        ?branch,
                        attribute = attribute.id(),
                        "write to unresolved item discarded"
                    );
                }
                Ok(false)
            }
        }
    }

    /// Sets one value.
    ///
    /// # Errors
    ///
    /// See [`VersionWriter::set_value`].
    pub fn set(&self, attribute: &Attribute, value: impl Into<Value>) -> CoreResult<bool> {
        self.set_value(attribute, Some(value.into()))
    }

    /// Clears one value.
    ///
    /// # Errors
    ///
    /// See [`VersionWriter::set_value`].
    pub fn clear_value(&self, attribute: &Attribute) -> CoreResult<bool> {
        self.set_value(attribute, None)
    }

    /// Marks this version deleted.
    ///
    /// On trunk this is a local delete; on the server branch it records a
    /// remote delete in DOWNLOAD.
    ///
    /// # Errors
    ///
    /// See [`VersionWriter::set_value`].
    pub fn delete(&self) -> CoreResult<bool> {
        self.set_value(&INVISIBLE, Some(Value::Bool(true)))
    }

    /// Returns true for a trunk writer on an item created in this transaction.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self.mode, WriterMode::Trunk { is_new: true })
    }

    /// Returns true if writes are discarded.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.mode == WriterMode::Dummy
    }
}
