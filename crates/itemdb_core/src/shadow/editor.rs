//! Direct shadow access and the BASE policy.

use super::schema::{invisible_map, ShadowKind, DONE_UPLOAD_HISTORY};
use super::version::Branch;
use crate::attribute::{AttributeMap, Value};
use crate::error::{CoreError, CoreResult};
use crate::transaction::{DbWriter, Transaction};
use crate::types::Item;
use std::fmt;
use std::rc::Rc;

/// Called once per item and transaction, before the first shadowable change
/// of the item's trunk.
///
/// The default, [`BaseShadowPolicy`], snapshots trunk into BASE. A transaction
/// may install its own listener with
/// [`DbWriter::set_shadowable_listener`](crate::DbWriter::set_shadowable_listener).
pub trait ShadowableChangeListener {
    /// `is_new` is true when the item was created in this transaction.
    ///
    /// # Errors
    ///
    /// An error aborts the write that triggered the call.
    fn before_shadowable_changed(
        &self,
        writer: &DbWriter<'_>,
        item: Item,
        is_new: bool,
    ) -> CoreResult<()>;
}

/// Keeps BASE equal to the last version both sides agreed on.
///
/// An existing BASE is left alone. Otherwise a new item gets an invisible
/// BASE and an existing one gets its current shadowable trunk values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseShadowPolicy;

impl ShadowableChangeListener for BaseShadowPolicy {
    fn before_shadowable_changed(
        &self,
        writer: &DbWriter<'_>,
        item: Item,
        is_new: bool,
    ) -> CoreResult<()> {
        let shadows = writer.shadows();
        if shadows.base(item).is_some() {
            return Ok(());
        }
        let base = if is_new {
            invisible_map()
        } else {
            writer.read_item(item, Branch::Trunk)?.all_shadowable()?
        };
        shadows.set_base(item, Some(base))?;
        Ok(())
    }
}

/// Reads and replaces shadows of items in one write transaction.
///
/// Writes here bypass the BASE policy.
#[derive(Clone, Copy)]
pub struct ShadowEditor<'t> {
    pub(super) tx: &'t Transaction,
}

impl fmt::Debug for ShadowEditor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowEditor")
            .field("txn", &self.tx.id())
            .finish()
    }
}

impl<'t> ShadowEditor<'t> {
    pub(crate) fn new(tx: &'t Transaction) -> Self {
        Self { tx }
    }

    /// The shadow of `kind` on `item`.
    #[must_use]
    pub fn get(&self, item: Item, kind: ShadowKind) -> Option<AttributeMap> {
        self.tx.shadow_map(item, kind)
    }

    /// BASE of `item`.
    #[must_use]
    pub fn base(&self, item: Item) -> Option<AttributeMap> {
        self.get(item, ShadowKind::Base)
    }

    /// CONFLICT of `item`.
    #[must_use]
    pub fn conflict(&self, item: Item) -> Option<AttributeMap> {
        self.get(item, ShadowKind::Conflict)
    }

    /// DOWNLOAD of `item`.
    #[must_use]
    pub fn download(&self, item: Item) -> Option<AttributeMap> {
        self.get(item, ShadowKind::Download)
    }

    /// UPLOAD_TASK of `item`.
    #[must_use]
    pub fn upload_task(&self, item: Item) -> Option<AttributeMap> {
        self.get(item, ShadowKind::UploadTask)
    }

    /// DONE_UPLOAD of `item`.
    #[must_use]
    pub fn done_upload(&self, item: Item) -> Option<AttributeMap> {
        self.get(item, ShadowKind::DoneUpload)
    }

    /// History steps recorded with DONE_UPLOAD.
    #[must_use]
    pub fn done_upload_history(&self, item: Item) -> Option<i32> {
        match self.tx.raw_value(item, &DONE_UPLOAD_HISTORY) {
            Some(Value::Int(steps)) => Some(steps),
            _ => None,
        }
    }

    /// Replaces or removes the shadow of `kind` on `item`.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn set(&self, item: Item, kind: ShadowKind, map: Option<AttributeMap>) -> CoreResult<bool> {
        self.tx.set_shadow(item, kind, map)
    }

    /// Replaces or removes BASE.
    ///
    /// # Errors
    ///
    /// See [`ShadowEditor::set`].
    pub fn set_base(&self, item: Item, map: Option<AttributeMap>) -> CoreResult<bool> {
        self.set(item, ShadowKind::Base, map)
    }

    /// Replaces or removes CONFLICT.
    ///
    /// # Errors
    ///
    /// See [`ShadowEditor::set`].
    pub fn set_conflict(&self, item: Item, map: Option<AttributeMap>) -> CoreResult<bool> {
        self.set(item, ShadowKind::Conflict, map)
    }

    /// Replaces or removes DOWNLOAD.
    ///
    /// # Errors
    ///
    /// See [`ShadowEditor::set`].
    pub fn set_download(&self, item: Item, map: Option<AttributeMap>) -> CoreResult<bool> {
        self.set(item, ShadowKind::Download, map)
    }

    /// Replaces or removes UPLOAD_TASK.
    ///
    /// # Errors
    ///
    /// See [`ShadowEditor::set`].
    pub fn set_upload_task(&self, item: Item, map: Option<AttributeMap>) -> CoreResult<bool> {
        self.set(item, ShadowKind::UploadTask, map)
    }

    /// Replaces or removes DONE_UPLOAD together with its history count.
    ///
    /// # Errors
    ///
    /// See [`ShadowEditor::set`].
    pub fn set_done_upload(
        &self,
        item: Item,
        map: Option<AttributeMap>,
        history: Option<i32>,
    ) -> CoreResult<bool> {
        let history = map.as_ref().and(history).map(Value::Int);
        let changed = self.set(item, ShadowKind::DoneUpload, map)?;
        Ok(self.tx.set_raw(item, &DONE_UPLOAD_HISTORY, history)? || changed)
    }

    /// Installs the transaction's shadowable-change listener.
    ///
    /// # Errors
    ///
    /// A second registration in the same transaction is a consistency
    /// violation.
    pub fn set_listener(&self, listener: Rc<dyn ShadowableChangeListener>) -> CoreResult<()> {
        self.tx.check_writable()?;
        let mut slot = self.tx.context.shadow_listener.borrow_mut();
        if slot.is_some() {
            return Err(CoreError::consistency(
                "shadowable-change listener already registered in this transaction",
            ));
        }
        *slot = Some(listener);
        Ok(())
    }
}
