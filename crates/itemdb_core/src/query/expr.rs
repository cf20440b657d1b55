//! Boolean expressions over item predicates.

use crate::attribute::{Attribute, Value};
use crate::transaction::DbReader;
use crate::types::Item;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A user-defined item test.
pub trait ItemPredicate: Send + Sync + fmt::Debug {
    /// Returns true if `item` matches in the reader's snapshot.
    fn accept(&self, item: Item, reader: &DbReader<'_>) -> bool;

    /// Attributes whose change can flip the result, or `None` if unknown.
    ///
    /// `None` forces re-evaluation after every write.
    fn affecting_attributes(&self) -> Option<Vec<Attribute>> {
        None
    }
}

/// A single test on one item's trunk values.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// The value equals `value`.
    Equals {
        /// Tested attribute.
        attribute: Attribute,
        /// Expected value.
        value: Value,
    },
    /// The attribute has a value.
    NotNull(Attribute),
    /// The value is one of `values`.
    InValues {
        /// Tested attribute.
        attribute: Attribute,
        /// Accepted values.
        values: BTreeSet<Value>,
    },
    /// A set or list value contains `element`.
    Contains {
        /// Tested attribute.
        attribute: Attribute,
        /// Required element.
        element: Value,
    },
    /// Custom test.
    Custom(Arc<dyn ItemPredicate>),
}

impl Predicate {
    fn accept(&self, item: Item, reader: &DbReader<'_>) -> bool {
        match self {
            Predicate::Equals { attribute, value } => {
                reader.get_value(item, attribute).as_ref() == Some(value)
            }
            Predicate::NotNull(attribute) => reader.get_value(item, attribute).is_some(),
            Predicate::InValues { attribute, values } => reader
                .get_value(item, attribute)
                .is_some_and(|v| values.contains(&v)),
            Predicate::Contains { attribute, element } => reader
                .get_value(item, attribute)
                .is_some_and(|v| v.contains(element)),
            Predicate::Custom(predicate) => predicate.accept(item, reader),
        }
    }

    fn affecting_attributes(&self) -> Option<Vec<Attribute>> {
        match self {
            Predicate::Equals { attribute, .. }
            | Predicate::NotNull(attribute)
            | Predicate::InValues { attribute, .. }
            | Predicate::Contains { attribute, .. } => Some(vec![attribute.clone()]),
            Predicate::Custom(predicate) => predicate.affecting_attributes(),
        }
    }
}

/// A boolean combination of [`Predicate`]s.
///
/// ```rust,ignore
/// let open = BoolExpr::equals(&STATUS, "open").and(BoolExpr::not_null(&OWNER));
/// ```
#[derive(Debug, Clone)]
pub enum BoolExpr {
    /// Always or never matches.
    Const(bool),
    /// A single predicate.
    Term(Predicate),
    /// Negation.
    Not(Box<BoolExpr>),
    /// All operands match. Empty matches everything.
    And(Vec<BoolExpr>),
    /// Some operand matches. Empty matches nothing.
    Or(Vec<BoolExpr>),
}

impl BoolExpr {
    /// Matches every item.
    #[must_use]
    pub const fn all() -> Self {
        BoolExpr::Const(true)
    }

    /// Matches no item.
    #[must_use]
    pub const fn none() -> Self {
        BoolExpr::Const(false)
    }

    /// `attribute == value`.
    #[must_use]
    pub fn equals(attribute: &Attribute, value: impl Into<Value>) -> Self {
        BoolExpr::Term(Predicate::Equals {
            attribute: attribute.clone(),
            value: value.into(),
        })
    }

    /// `attribute` has a value.
    #[must_use]
    pub fn not_null(attribute: &Attribute) -> Self {
        BoolExpr::Term(Predicate::NotNull(attribute.clone()))
    }

    /// `attribute` is one of `values`.
    #[must_use]
    pub fn in_values<V: Into<Value>>(attribute: &Attribute, values: impl IntoIterator<Item = V>) -> Self {
        BoolExpr::Term(Predicate::InValues {
            attribute: attribute.clone(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// `attribute` is a set or list containing `element`.
    #[must_use]
    pub fn contains(attribute: &Attribute, element: impl Into<Value>) -> Self {
        BoolExpr::Term(Predicate::Contains {
            attribute: attribute.clone(),
            element: element.into(),
        })
    }

    /// A custom predicate.
    #[must_use]
    pub fn custom(predicate: impl ItemPredicate + 'static) -> Self {
        BoolExpr::Term(Predicate::Custom(Arc::new(predicate)))
    }

    /// `self && other`.
    #[must_use]
    pub fn and(self, other: BoolExpr) -> Self {
        match self {
            BoolExpr::And(mut operands) => {
                operands.push(other);
                BoolExpr::And(operands)
            }
            first => BoolExpr::And(vec![first, other]),
        }
    }

    /// `self || other`.
    #[must_use]
    pub fn or(self, other: BoolExpr) -> Self {
        match self {
            BoolExpr::Or(mut operands) => {
                operands.push(other);
                BoolExpr::Or(operands)
            }
            first => BoolExpr::Or(vec![first, other]),
        }
    }

    /// `!self`.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            BoolExpr::Not(inner) => *inner,
            BoolExpr::Const(value) => BoolExpr::Const(!value),
            other => BoolExpr::Not(Box::new(other)),
        }
    }

    /// Evaluates against `item` in the reader's snapshot.
    #[must_use]
    pub fn evaluate(&self, item: Item, reader: &DbReader<'_>) -> bool {
        match self {
            BoolExpr::Const(value) => *value,
            BoolExpr::Term(predicate) => predicate.accept(item, reader),
            BoolExpr::Not(inner) => !inner.evaluate(item, reader),
            BoolExpr::And(operands) => operands.iter().all(|e| e.evaluate(item, reader)),
            BoolExpr::Or(operands) => operands.iter().any(|e| e.evaluate(item, reader)),
        }
    }

    /// Union of the attributes every term depends on.
    ///
    /// `None` if any term declines to say.
    #[must_use]
    pub fn affecting_attributes(&self) -> Option<BTreeSet<Attribute>> {
        let mut attributes = BTreeSet::new();
        self.collect_affecting(&mut attributes)?;
        Some(attributes)
    }

    fn collect_affecting(&self, into: &mut BTreeSet<Attribute>) -> Option<()> {
        match self {
            BoolExpr::Const(_) => Some(()),
            BoolExpr::Term(predicate) => {
                into.extend(predicate.affecting_attributes()?);
                Some(())
            }
            BoolExpr::Not(inner) => inner.collect_affecting(into),
            BoolExpr::And(operands) | BoolExpr::Or(operands) => operands
                .iter()
                .try_for_each(|operand| operand.collect_affecting(into)),
        }
    }
}
