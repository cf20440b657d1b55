//! Transactions.
//!
//! A [`Transaction`] is created by the scheduler on a worker thread and lives
//! for exactly one closure call. It owns:
//!
//! - a [`StagedStore`] over the snapshot it started from,
//! - the per-transaction context (attribute classification, holder cache,
//!   branch cache, the shadowable-change listener, the typed side table),
//! - the cancellation token shared with the caller's result handle,
//! - callbacks to run after a successful commit.
//!
//! User code never sees the transaction itself; it receives a [`DbReader`] or
//! a [`DbWriter`] borrowing it.

mod access;
mod attr_info;
mod cache;

pub use access::{DbReader, DbWriter};
pub use cache::{CacheKey, TransactionCache};

use crate::attribute::system::{Identified, ID, IS_SHADOWABLE, NAME, TYPE};
use crate::attribute::{Attribute, Value};
use crate::error::{CoreError, CoreResult};
use crate::scheduler::Gate;
use crate::shadow::{BranchCache, HolderCache, ShadowableChangeListener};
use crate::store::{CommitDiff, StagedStore, StoreState};
use crate::types::{Icn, Item, TransactionId};
use attr_info::AttributeInfo;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a result handle and the
/// transaction it controls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A callback to run once the transaction's commit is durable.
pub(crate) struct PostCommit {
    pub(crate) gate: Gate,
    pub(crate) callback: Box<dyn FnOnce(Icn) + Send>,
}

/// Everything a transaction memoizes. Never shared between transactions.
#[derive(Default)]
pub(crate) struct TxContext {
    pub(crate) attributes: AttributeInfo,
    pub(crate) holders: RefCell<HolderCache>,
    pub(crate) branches: RefCell<BranchCache>,
    pub(crate) shadow_listener: RefCell<Option<Rc<dyn ShadowableChangeListener>>>,
    pub(crate) cache: TransactionCache,
}

/// What a successful write hands back to the scheduler.
pub(crate) struct Committed {
    pub(crate) state: StoreState,
    pub(crate) diff: CommitDiff,
    pub(crate) post_commit: Vec<PostCommit>,
}

/// A single read or write transaction.
pub struct Transaction {
    id: TransactionId,
    writable: bool,
    pub(crate) store: RefCell<StagedStore>,
    pub(crate) context: TxContext,
    cancel: CancelToken,
    post_commit: RefCell<Vec<PostCommit>>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        snapshot: Arc<StoreState>,
        writable: bool,
        cancel: CancelToken,
    ) -> Self {
        Self {
            id,
            writable,
            store: RefCell::new(StagedStore::new(snapshot)),
            context: TxContext::default(),
            cancel,
            post_commit: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn reader(&self) -> DbReader<'_> {
        DbReader::new(self)
    }

    pub(crate) fn writer(&self) -> CoreResult<DbWriter<'_>> {
        self.check_writable()?;
        Ok(DbWriter::new(self))
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn check_writable(&self) -> CoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(CoreError::ReadOnly)
        }
    }

    pub(crate) fn check_cancelled(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn icn(&self) -> Icn {
        self.store.borrow().icn()
    }

    pub(crate) fn raw_value(&self, item: Item, attribute: &Attribute) -> Option<Value> {
        self.store.borrow().value(item, attribute).cloned()
    }

    pub(crate) fn find_identity(&self, id: &str) -> Option<Item> {
        self.store.borrow().identity(id)
    }

    pub(crate) fn is_shadowable(&self, attribute: &Attribute) -> CoreResult<bool> {
        self.context.attributes.is_shadowable(self, attribute)
    }

    pub(crate) fn check_item(&self, item: Item) -> CoreResult<()> {
        if self.store.borrow().is_allocated(item) {
            Ok(())
        } else {
            Err(CoreError::InvalidItem {
                item: item.as_i64(),
            })
        }
    }

    /// Writes straight to trunk, bypassing shadow logic.
    pub(crate) fn set_raw(
        &self,
        item: Item,
        attribute: &Attribute,
        value: Option<Value>,
    ) -> CoreResult<bool> {
        self.check_writable()?;
        self.check_item(item)?;
        let value = value.map(|v| attribute.normalize(v)).transpose()?;
        if attribute == &*IS_SHADOWABLE {
            if let Some(current) = self.raw_value(item, attribute) {
                if Some(&current) != value.as_ref() {
                    return Err(CoreError::consistency(format!(
                        "shadowability of {item} is already recorded"
                    )));
                }
            }
        }
        Ok(self.store.borrow_mut().set(item, attribute, value))
    }

    pub(crate) fn clear(&self, item: Item) -> CoreResult<bool> {
        self.check_writable()?;
        self.check_item(item)?;
        self.context.holders.borrow_mut().forget_item(item);
        self.context.branches.borrow_mut().forget_item(item);
        Ok(self.store.borrow_mut().clear(item))
    }

    pub(crate) fn allocate(&self) -> CoreResult<Item> {
        self.check_writable()?;
        Ok(self.store.borrow_mut().allocate())
    }

    /// Resolves `object` to its item, creating and describing it if needed.
    pub(crate) fn materialize(&self, object: &dyn Identified) -> CoreResult<Item> {
        if let Some(item) = self.find_identity(object.id()) {
            return Ok(item);
        }
        let item = self.allocate()?;
        // Identity goes first: the type chain may lead back to this object.
        self.set_raw(item, &ID, Some(Value::Text(object.id().to_string())))?;
        self.set_raw(item, &NAME, Some(Value::Text(object.name().to_string())))?;
        let type_item = self.materialize(object.item_type())?;
        self.set_raw(item, &TYPE, Some(Value::Long(type_item.as_i64())))?;
        for (attribute, value) in object.init_values().iter() {
            self.set_raw(item, attribute, Some(value.clone()))?;
        }
        tracing::debug!(txn = %self.id, id = object.id(), %item, "materialized");
        Ok(item)
    }

    pub(crate) fn add_post_commit(&self, gate: Gate, callback: Box<dyn FnOnce(Icn) + Send>) {
        self.post_commit
            .borrow_mut()
            .push(PostCommit { gate, callback });
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.store.borrow().has_changes()
    }

    pub(crate) fn into_committed(self, icn: Icn) -> Committed {
        let (state, diff) = self.store.into_inner().commit(icn);
        Committed {
            state,
            diff,
            post_commit: self.post_commit.into_inner(),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("writable", &self.writable)
            .field("icn", &self.icn())
            .finish_non_exhaustive()
    }
}
