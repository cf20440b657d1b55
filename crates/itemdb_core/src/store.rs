//! Committed snapshots and the staged overlay a transaction writes into.
//!
//! A [`StoreState`] is immutable once published. Every transaction works on a
//! [`StagedStore`]: the snapshot it started from plus a private overlay. A
//! write commits by folding the overlay into a new snapshot; an abort simply
//! drops the overlay, so nothing partial can ever be observed.

use crate::attribute::system::ID;
use crate::attribute::{Attribute, AttributeMap, Value};
use crate::types::{Icn, Item};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// A committed, immutable view of every item.
#[derive(Debug, Clone)]
pub(crate) struct StoreState {
    pub(crate) items: HashMap<Item, AttributeMap>,
    pub(crate) identities: HashMap<String, Item>,
    pub(crate) next_item: i64,
    pub(crate) icn: Icn,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            identities: HashMap::new(),
            next_item: 1,
            icn: Icn::ZERO,
        }
    }
}

impl StoreState {
    /// Replaces (or removes, for `None`) an item's values, keeping the
    /// identity index in step.
    pub(crate) fn put(&mut self, item: Item, values: Option<AttributeMap>) {
        if let Some(previous) = self.items.remove(&item) {
            if let Some(Value::Text(id)) = previous.get(&ID) {
                if self.identities.get(id) == Some(&item) {
                    self.identities.remove(id);
                }
            }
        }
        if let Some(values) = values.filter(|v| !v.is_empty()) {
            if let Some(Value::Text(id)) = values.get(&ID) {
                self.identities.insert(id.clone(), item);
            }
            self.items.insert(item, values);
        }
    }
}

/// One item's committed change.
#[derive(Debug, Clone)]
pub(crate) struct ItemChange {
    pub(crate) item: Item,
    /// Attributes whose values differ, in id order.
    pub(crate) attributes: Vec<Attribute>,
    /// The item's values after the commit; `None` once cleared.
    pub(crate) values: Option<AttributeMap>,
    /// The item had no values before the commit.
    pub(crate) born: bool,
}

impl ItemChange {
    /// True when the commit created or cleared the item.
    pub(crate) fn changes_liveness(&self) -> bool {
        self.born || self.values.is_none()
    }
}

/// Everything one commit changed, sorted by item.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitDiff {
    pub(crate) changes: Vec<ItemChange>,
}

impl CommitDiff {
    pub(crate) fn items(&self) -> Vec<Item> {
        self.changes.iter().map(|c| c.item).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A snapshot plus private, uncommitted edits.
#[derive(Debug)]
pub(crate) struct StagedStore {
    base: Arc<StoreState>,
    items: HashMap<Item, Option<AttributeMap>>,
    identities: HashMap<String, Option<Item>>,
    next_item: i64,
    /// Sorted live items, dropped on every edit.
    alive: OnceCell<Vec<Item>>,
}

impl StagedStore {
    pub(crate) fn new(base: Arc<StoreState>) -> Self {
        let next_item = base.next_item;
        Self {
            base,
            items: HashMap::new(),
            identities: HashMap::new(),
            next_item,
            alive: OnceCell::new(),
        }
    }

    pub(crate) fn icn(&self) -> Icn {
        self.base.icn
    }

    pub(crate) fn values(&self, item: Item) -> Option<&AttributeMap> {
        match self.items.get(&item) {
            Some(staged) => staged.as_ref().filter(|v| !v.is_empty()),
            None => self.base.items.get(&item),
        }
    }

    pub(crate) fn value(&self, item: Item, attribute: &Attribute) -> Option<&Value> {
        self.values(item).and_then(|v| v.get(attribute))
    }

    pub(crate) fn is_alive(&self, item: Item) -> bool {
        self.values(item).is_some()
    }

    pub(crate) fn identity(&self, id: &str) -> Option<Item> {
        match self.identities.get(id) {
            Some(staged) => *staged,
            None => self.base.identities.get(id).copied(),
        }
    }

    /// Sets or removes one value. Returns true if anything changed.
    pub(crate) fn set(&mut self, item: Item, attribute: &Attribute, value: Option<Value>) -> bool {
        let mut values = self.values(item).cloned().unwrap_or_default();
        let previous_id = values.get(&ID).cloned();
        if !values.set(attribute, value) {
            return false;
        }
        if attribute == &*ID {
            if let Some(Value::Text(old)) = previous_id {
                self.identities.insert(old, None);
            }
            if let Some(Value::Text(new)) = values.get(&ID) {
                self.identities.insert(new.clone(), Some(item));
            }
        }
        self.items.insert(item, Some(values));
        self.alive.take();
        true
    }

    /// Removes every value of `item`. Returns true if it had any.
    pub(crate) fn clear(&mut self, item: Item) -> bool {
        let id = match self.values(item) {
            Some(values) => values.get(&ID).cloned(),
            None => return false,
        };
        if let Some(Value::Text(id)) = id {
            self.identities.insert(id, None);
        }
        self.items.insert(item, None);
        self.alive.take();
        true
    }

    pub(crate) fn allocate(&mut self) -> Item {
        let item = Item::new(self.next_item);
        self.next_item += 1;
        item
    }

    /// Returns true if `item` was allocated by this store or a prior commit.
    pub(crate) fn is_allocated(&self, item: Item) -> bool {
        item.is_valid() && item.as_i64() < self.next_item
    }

    /// Every live item, ascending.
    ///
    /// The first call after an edit scans and sorts the whole snapshot;
    /// later calls reuse that list.
    pub(crate) fn alive_items(&self) -> Vec<Item> {
        self.alive
            .get_or_init(|| {
                let mut items: Vec<Item> = self
                    .base
                    .items
                    .keys()
                    .filter(|item| !self.items.contains_key(item))
                    .copied()
                    .chain(
                        self.items
                            .iter()
                            .filter(|(_, v)| v.as_ref().is_some_and(|v| !v.is_empty()))
                            .map(|(item, _)| *item),
                    )
                    .collect();
                items.sort_unstable();
                items
            })
            .clone()
    }

    pub(crate) fn has_changes(&self) -> bool {
        !self.items.is_empty() || self.next_item != self.base.next_item
    }

    /// Folds the overlay into a new snapshot at `icn`.
    ///
    /// Items whose values end up unchanged are left out of the diff.
    pub(crate) fn commit(self, icn: Icn) -> (StoreState, CommitDiff) {
        let mut changes: Vec<ItemChange> = self
            .items
            .into_iter()
            .filter_map(|(item, values)| {
                let values = values.filter(|v| !v.is_empty());
                let before = self.base.items.get(&item).cloned();
                let born = before.is_none();
                let after = values.clone().unwrap_or_default();
                let attributes = before.unwrap_or_default().diff(&after);
                (!attributes.is_empty()).then_some(ItemChange {
                    item,
                    attributes,
                    values,
                    born,
                })
            })
            .collect();
        changes.sort_by_key(|c| c.item);

        let mut state = StoreState::clone(&self.base);
        for change in &changes {
            state.put(change.item, change.values.clone());
        }
        state.next_item = self.next_item;
        state.icn = icn;
        (state, CommitDiff { changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr() -> Attribute {
        Attribute::int("t:a", "A")
    }

    #[test]
    fn staged_writes_do_not_touch_the_base() {
        let base = Arc::new(StoreState::default());
        let mut staged = StagedStore::new(Arc::clone(&base));
        let item = staged.allocate();
        assert!(staged.set(item, &attr(), Some(Value::Int(1))));
        assert_eq!(staged.value(item, &attr()), Some(&Value::Int(1)));
        assert!(base.items.is_empty());
    }

    #[test]
    fn commit_reports_changed_attributes() {
        let mut staged = StagedStore::new(Arc::new(StoreState::default()));
        let item = staged.allocate();
        staged.set(item, &attr(), Some(Value::Int(1)));
        staged.set(item, &ID, Some(Value::Text("x".into())));
        let (state, diff) = staged.commit(Icn::new(1));

        assert_eq!(state.icn, Icn::new(1));
        assert_eq!(state.next_item, 2);
        assert_eq!(state.identities.get("x"), Some(&item));
        assert_eq!(diff.items(), vec![item]);
        assert_eq!(diff.changes[0].attributes.len(), 2);
    }

    #[test]
    fn created_and_cleared_items_change_liveness() {
        let mut base = StoreState::default();
        let kept = Item::new(1);
        let cleared = Item::new(2);
        base.put(kept, Some(AttributeMap::new().with(&attr(), 1)));
        base.put(cleared, Some(AttributeMap::new().with(&attr(), 1)));
        base.next_item = 3;

        let mut staged = StagedStore::new(Arc::new(base));
        let created = staged.allocate();
        staged.set(created, &attr(), Some(Value::Int(1)));
        staged.set(kept, &attr(), Some(Value::Int(2)));
        staged.clear(cleared);
        let (_, diff) = staged.commit(Icn::new(1));

        let liveness: Vec<(Item, bool)> = diff
            .changes
            .iter()
            .map(|c| (c.item, c.changes_liveness()))
            .collect();
        assert_eq!(liveness, vec![(kept, false), (cleared, true), (created, true)]);
    }

    #[test]
    fn alive_items_follow_edits() {
        let mut base = StoreState::default();
        base.put(Item::new(2), Some(AttributeMap::new().with(&attr(), 1)));
        base.next_item = 3;

        let mut staged = StagedStore::new(Arc::new(base));
        assert_eq!(staged.alive_items(), vec![Item::new(2)]);
        staged.set(Item::new(1), &attr(), Some(Value::Int(1)));
        assert_eq!(staged.alive_items(), vec![Item::new(1), Item::new(2)]);
        staged.clear(Item::new(2));
        assert_eq!(staged.alive_items(), vec![Item::new(1)]);
    }

    #[test]
    fn reverted_edit_is_not_a_change() {
        let mut base = StoreState::default();
        let item = Item::new(1);
        base.put(item, Some(AttributeMap::new().with(&attr(), 1)));
        base.next_item = 2;

        let mut staged = StagedStore::new(Arc::new(base));
        staged.set(item, &attr(), Some(Value::Int(2)));
        staged.set(item, &attr(), Some(Value::Int(1)));
        let (_, diff) = staged.commit(Icn::new(1));
        assert!(diff.is_empty());
    }

    #[test]
    fn clear_removes_identity() {
        let mut staged = StagedStore::new(Arc::new(StoreState::default()));
        let item = staged.allocate();
        staged.set(item, &ID, Some(Value::Text("x".into())));
        assert_eq!(staged.identity("x"), Some(item));
        assert!(staged.clear(item));
        assert_eq!(staged.identity("x"), None);
        assert!(!staged.is_alive(item));
        assert!(staged.alive_items().is_empty());
    }
}
