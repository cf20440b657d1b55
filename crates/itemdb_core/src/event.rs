//! Incremental change events.

use crate::error::{CoreError, CoreResult};
use crate::types::Item;
use std::sync::{Arc, LazyLock};

static EMPTY: LazyLock<DbEvent> = LazyLock::new(|| DbEvent {
    added: Arc::from([]),
    removed: Arc::from([]),
    changed: Arc::from([]),
    affected: Arc::from([]),
});

/// The delta between two versions of a sorted item set.
///
/// `added`, `removed` and `changed` are sorted, unique and pairwise disjoint.
/// `affected` is their sorted union. Cloning shares the underlying arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEvent {
    added: Arc<[Item]>,
    removed: Arc<[Item]>,
    changed: Arc<[Item]>,
    affected: Arc<[Item]>,
}

impl DbEvent {
    /// The shared empty event.
    #[must_use]
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// Returns true if this event shares storage with [`DbEvent::empty`].
    #[must_use]
    pub fn is_canonical_empty(&self) -> bool {
        Arc::ptr_eq(&self.affected, &EMPTY.affected)
    }

    /// An event reporting `items` as changed. `items` must be sorted and
    /// unique.
    #[must_use]
    pub fn changed_only(items: Vec<Item>) -> Self {
        if items.is_empty() {
            return Self::empty();
        }
        let changed: Arc<[Item]> = items.into();
        Self {
            added: Arc::from([]),
            removed: Arc::from([]),
            affected: Arc::clone(&changed),
            changed,
        }
    }

    fn from_parts(added: Vec<Item>, removed: Vec<Item>, changed: Vec<Item>) -> Self {
        if added.is_empty() && removed.is_empty() && changed.is_empty() {
            return Self::empty();
        }
        let mut affected = Vec::with_capacity(added.len() + removed.len() + changed.len());
        affected.extend_from_slice(&added);
        affected.extend_from_slice(&removed);
        affected.extend_from_slice(&changed);
        affected.sort_unstable();
        Self {
            added: added.into(),
            removed: removed.into(),
            changed: changed.into(),
            affected: affected.into(),
        }
    }

    /// Classifies `affected` items against the old set `current` and the
    /// new matches `accepted`.
    ///
    /// All inputs are sorted and unique; `accepted` must be a subset of
    /// `affected`. An item only in `current` is removed, only in `accepted`
    /// is added, in both is changed, in neither is ignored. A missing
    /// `current` counts as empty. When given, `current` is rewritten to the
    /// new set.
    ///
    /// # Errors
    ///
    /// With `check` set, a consistency error if the result breaks the event
    /// invariants.
    pub fn create(
        current: Option<&mut Vec<Item>>,
        affected: &[Item],
        accepted: &[Item],
        check: bool,
    ) -> CoreResult<Self> {
        if affected.is_empty() {
            return Ok(Self::empty());
        }
        let old: &[Item] = match current.as_deref() {
            Some(current) => current,
            None => &[],
        };

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        // Both cursors only move forward: each search starts where the last
        // one ended.
        let (mut ci, mut ai) = (0, 0);
        for &item in affected {
            let in_current = match old[ci..].binary_search(&item) {
                Ok(pos) => {
                    ci += pos + 1;
                    true
                }
                Err(pos) => {
                    ci += pos;
                    false
                }
            };
            let in_accepted = match accepted[ai..].binary_search(&item) {
                Ok(pos) => {
                    ai += pos + 1;
                    true
                }
                Err(pos) => {
                    ai += pos;
                    false
                }
            };
            match (in_current, in_accepted) {
                (true, true) => changed.push(item),
                (true, false) => removed.push(item),
                (false, true) => added.push(item),
                (false, false) => {}
            }
        }

        let event = Self::from_parts(added, removed, changed);
        if check {
            event.check_invariants(old, affected, accepted)?;
        }
        if let Some(current) = current {
            if !event.added.is_empty() || !event.removed.is_empty() {
                *current = merge_sorted(current, &event.added, &event.removed);
            }
        }
        Ok(event)
    }

    fn check_invariants(&self, old: &[Item], affected: &[Item], accepted: &[Item]) -> CoreResult<()> {
        for part in [&self.added, &self.removed, &self.changed] {
            if part.windows(2).any(|w| w[0] >= w[1]) {
                return Err(CoreError::consistency("event part is not sorted and unique"));
            }
        }
        if self.affected.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CoreError::consistency("event parts overlap"));
        }
        let expected: Vec<Item> = affected
            .iter()
            .copied()
            .filter(|item| old.binary_search(item).is_ok() || accepted.binary_search(item).is_ok())
            .collect();
        if expected.as_slice() != &*self.affected {
            return Err(CoreError::consistency(
                "event does not cover the affected items present before or after",
            ));
        }
        Ok(())
    }

    /// Items that entered the set.
    #[must_use]
    pub fn added(&self) -> &[Item] {
        &self.added
    }

    /// Items that left the set.
    #[must_use]
    pub fn removed(&self) -> &[Item] {
        &self.removed
    }

    /// Items that stayed in the set but changed.
    #[must_use]
    pub fn changed(&self) -> &[Item] {
        &self.changed
    }

    /// Union of the three parts, sorted.
    #[must_use]
    pub fn affected(&self) -> &[Item] {
        &self.affected
    }

    /// Returns true if nothing happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }
}

/// `(current ∪ added) \ removed`, all sorted.
fn merge_sorted(current: &[Item], added: &[Item], removed: &[Item]) -> Vec<Item> {
    let mut out = Vec::with_capacity(current.len() + added.len());
    let (mut i, mut j) = (0, 0);
    while i < current.len() || j < added.len() {
        let next = match (current.get(i), added.get(j)) {
            (Some(&c), Some(&a)) if a < c => {
                j += 1;
                a
            }
            (Some(&c), Some(&a)) => {
                i += 1;
                if a == c {
                    j += 1;
                }
                c
            }
            (Some(&c), None) => {
                i += 1;
                c
            }
            (None, Some(&a)) => {
                j += 1;
                a
            }
            (None, None) => break,
        };
        if removed.binary_search(&next).is_err() {
            out.push(next);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::btree_set;
    use proptest::prelude::*;

    fn items(raw: &[i64]) -> Vec<Item> {
        raw.iter().copied().map(Item::new).collect()
    }

    #[test]
    fn empty_affected_is_the_canonical_empty_event() {
        let mut current = items(&[1, 2]);
        let event = DbEvent::create(Some(&mut current), &[], &[], true).unwrap();
        assert!(event.is_canonical_empty());
        assert_eq!(current, items(&[1, 2]));
        assert!(DbEvent::changed_only(Vec::new()).is_canonical_empty());
    }

    #[test]
    fn classifies_and_rewrites_current() {
        let mut current = items(&[1, 3, 5]);
        let event = DbEvent::create(
            Some(&mut current),
            &items(&[2, 3, 4, 5]),
            &items(&[2, 3]),
            true,
        )
        .unwrap();
        assert_eq!(event.added(), items(&[2]).as_slice());
        assert_eq!(event.removed(), items(&[5]).as_slice());
        assert_eq!(event.changed(), items(&[3]).as_slice());
        assert_eq!(event.affected(), items(&[2, 3, 5]).as_slice());
        assert_eq!(current, items(&[1, 2, 3]));
    }

    #[test]
    fn missing_current_counts_as_empty() {
        let event = DbEvent::create(None, &items(&[1, 2]), &items(&[2]), true).unwrap();
        assert_eq!(event.added(), items(&[2]).as_slice());
        assert!(event.removed().is_empty());
    }

    #[test]
    fn untouched_items_produce_an_empty_event() {
        let mut current = items(&[1]);
        let event = DbEvent::create(Some(&mut current), &items(&[7]), &[], true).unwrap();
        assert!(event.is_empty());
    }

    fn sorted(max: i64) -> impl Strategy<Value = Vec<Item>> {
        btree_set(1..max, 0..40).prop_map(|s| s.into_iter().map(Item::new).collect())
    }

    proptest! {
        #[test]
        fn event_invariants_hold(
            current in sorted(80),
            affected in sorted(80),
            extra in sorted(80),
        ) {
            // accepted ⊆ affected
            let accepted: Vec<Item> = affected
                .iter()
                .copied()
                .filter(|i| extra.binary_search(i).is_ok())
                .collect();
            let mut rewritten = current.clone();
            let event = DbEvent::create(Some(&mut rewritten), &affected, &accepted, true).unwrap();

            for &item in event.added() {
                prop_assert!(current.binary_search(&item).is_err());
                prop_assert!(accepted.binary_search(&item).is_ok());
            }
            for &item in event.removed() {
                prop_assert!(current.binary_search(&item).is_ok());
                prop_assert!(accepted.binary_search(&item).is_err());
            }
            for &item in event.changed() {
                prop_assert!(current.binary_search(&item).is_ok());
                prop_assert!(accepted.binary_search(&item).is_ok());
            }
            let total = event.added().len() + event.removed().len() + event.changed().len();
            prop_assert_eq!(total, event.affected().len());

            let expected: Vec<Item> = current
                .iter()
                .copied()
                .filter(|i| affected.binary_search(i).is_err())
                .chain(accepted.iter().copied())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            prop_assert_eq!(rewritten, expected);
        }
    }
}
