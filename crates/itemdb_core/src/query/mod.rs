//! Queries over a transaction snapshot.
//!
//! # Usage
//!
//! ```rust,ignore
//! let open = reader.query(BoolExpr::equals(&STATUS, "open"));
//! let items = open.copy_items_sorted();
//! let by_owner = open.distribution(&OWNER);
//! ```

mod expr;

pub use expr::{BoolExpr, ItemPredicate, Predicate};

use crate::attribute::system::ID;
use crate::attribute::{Attribute, Value};
use crate::transaction::DbReader;
use crate::types::Item;
use std::collections::BTreeMap;

/// A [`BoolExpr`] bound to one transaction's snapshot.
#[derive(Debug, Clone)]
pub struct Query<'t> {
    reader: DbReader<'t>,
    expr: BoolExpr,
}

impl<'t> Query<'t> {
    pub(crate) fn new(reader: DbReader<'t>, expr: BoolExpr) -> Self {
        Self { reader, expr }
    }

    /// The expression.
    #[must_use]
    pub fn expression(&self) -> &BoolExpr {
        &self.expr
    }

    /// Returns true if `item` matches.
    #[must_use]
    pub fn matches(&self, item: Item) -> bool {
        self.reader.is_alive(item) && self.expr.evaluate(item, &self.reader)
    }

    /// Every matching item, ascending.
    ///
    /// Evaluates the expression on every live item. The sorted live list is
    /// built once per snapshot and shared with [`Query::count`].
    #[must_use]
    pub fn copy_items_sorted(&self) -> Vec<Item> {
        self.reader
            .items()
            .into_iter()
            .filter(|&item| self.expr.evaluate(item, &self.reader))
            .collect()
    }

    /// The matching subset of `candidates`, in candidate order.
    ///
    /// Candidates are expected sorted; the result then is too. Only the
    /// candidates are evaluated.
    #[must_use]
    pub fn filter_items_sorted(&self, candidates: &[Item]) -> Vec<Item> {
        candidates
            .iter()
            .copied()
            .filter(|&item| self.matches(item))
            .collect()
    }

    /// Folds over matching items in ascending order.
    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, Item, &DbReader<'t>) -> A) -> A {
        self.copy_items_sorted()
            .into_iter()
            .fold(init, |acc, item| f(acc, item, &self.reader))
    }

    /// Number of matching items.
    #[must_use]
    pub fn count(&self) -> usize {
        self.reader
            .items()
            .into_iter()
            .filter(|&item| self.expr.evaluate(item, &self.reader))
            .count()
    }

    /// Matching items grouped by their value of `attribute`.
    #[must_use]
    pub fn distribution(&self, attribute: &Attribute) -> BTreeMap<Option<Value>, usize> {
        self.fold(BTreeMap::new(), |mut counts, item, reader| {
            *counts.entry(reader.get_value(item, attribute)).or_insert(0) += 1;
            counts
        })
    }

    /// The first matching item whose `attribute` equals `key`.
    #[must_use]
    pub fn item_by_key(&self, attribute: &Attribute, key: &Value) -> Option<Item> {
        if attribute == &*ID {
            if let Value::Text(id) = key {
                return self.reader.find_identity(id).filter(|&item| self.matches(item));
            }
        }
        self.reader.items().into_iter().find(|&item| {
            self.reader.get_value(item, attribute).as_ref() == Some(key)
                && self.expr.evaluate(item, &self.reader)
        })
    }

    /// Lowest matching item.
    #[must_use]
    pub fn first(&self) -> Option<Item> {
        self.reader
            .items()
            .into_iter()
            .find(|&item| self.expr.evaluate(item, &self.reader))
    }
}
