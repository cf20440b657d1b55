//! Per-transaction attribute classification.

use super::Transaction;
use crate::attribute::system::IS_SHADOWABLE;
use crate::attribute::{Attribute, ScalarType, Value};
use crate::error::CoreResult;
use std::cell::RefCell;
use std::collections::HashMap;

/// Memoized "is shadowable" answers for one transaction.
#[derive(Debug, Default)]
pub(crate) struct AttributeInfo {
    known: RefCell<HashMap<Attribute, bool>>,
}

impl AttributeInfo {
    pub(crate) fn is_shadowable(&self, tx: &Transaction, attribute: &Attribute) -> CoreResult<bool> {
        if let Some(&known) = self.known.borrow().get(attribute) {
            return Ok(known);
        }
        let shadowable = Self::resolve(tx, attribute)?;
        self.known
            .borrow_mut()
            .insert(attribute.clone(), shadowable);
        Ok(shadowable)
    }

    fn resolve(tx: &Transaction, attribute: &Attribute) -> CoreResult<bool> {
        if attribute.scalar_type() == ScalarType::AttributeMap {
            return Ok(false);
        }
        let item = match tx.find_identity(attribute.id()) {
            Some(item) => item,
            None if tx.is_writable() => tx.materialize(attribute)?,
            None => {
                // Re-resolved by the next transaction that can materialize it.
                tracing::trace!(
                    attribute = attribute.id(),
                    "unmaterialized attribute treated as write-through"
                );
                return Ok(false);
            }
        };
        Ok(matches!(
            tx.raw_value(item, &IS_SHADOWABLE),
            Some(Value::Bool(true))
        ))
    }
}
