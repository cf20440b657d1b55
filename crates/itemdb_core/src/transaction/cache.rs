//! Key-typed per-transaction side table.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Typed key into a [`TransactionCache`].
///
/// Declare keys as constants next to the helper that owns the state:
///
/// ```rust,ignore
/// static SEEN: CacheKey<RefCell<HashSet<Item>>> = CacheKey::new("merge.seen");
/// let seen = reader.transaction_cache().get_or_init(&SEEN, Default::default);
/// ```
pub struct CacheKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheKey<T> {
    /// Creates a key. Keys with the same name and value type are the same key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for CacheKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.name)
    }
}

/// State memoized once per transaction and dropped with it.
///
/// Values are handed out as `Rc<T>`; use interior mutability inside `T` for
/// state that changes during the transaction.
#[derive(Default)]
pub struct TransactionCache {
    entries: RefCell<HashMap<(TypeId, &'static str), Rc<dyn Any>>>,
}

impl TransactionCache {
    /// Returns the value under `key`, creating it with `init` on first use.
    ///
    /// `init` runs without any borrow held, so it may use the cache itself.
    pub fn get_or_init<T: 'static>(&self, key: &CacheKey<T>, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        let fresh = Rc::new(init());
        let erased: Rc<dyn Any> = fresh.clone();
        let mut entries = self.entries.borrow_mut();
        let stored = entries
            .entry((TypeId::of::<T>(), key.name))
            .or_insert(erased);
        Rc::clone(stored).downcast::<T>().unwrap_or(fresh)
    }

    /// Returns the value under `key` if present.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &CacheKey<T>) -> Option<Rc<T>> {
        let entries = self.entries.borrow();
        let stored = entries.get(&(TypeId::of::<T>(), key.name))?;
        Rc::clone(stored).downcast::<T>().ok()
    }

    /// Removes the value under `key`.
    pub fn remove<T: 'static>(&self, key: &CacheKey<T>) -> Option<Rc<T>> {
        let stored = self
            .entries
            .borrow_mut()
            .remove(&(TypeId::of::<T>(), key.name))?;
        stored.downcast::<T>().ok()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TransactionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.entries.borrow().keys().map(|(_, n)| *n).collect();
        f.debug_struct("TransactionCache")
            .field("entries", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    static COUNTER: CacheKey<Cell<u32>> = CacheKey::new("counter");
    static LABEL: CacheKey<String> = CacheKey::new("counter");

    #[test]
    fn init_runs_once() {
        let cache = TransactionCache::default();
        let mut inits = 0;
        for _ in 0..3 {
            let counter = cache.get_or_init(&COUNTER, || {
                inits += 1;
                Cell::new(0)
            });
            counter.set(counter.get() + 1);
        }
        assert_eq!(inits, 1);
        assert_eq!(cache.get(&COUNTER).unwrap().get(), 3);
    }

    #[test]
    fn same_name_different_type_is_a_different_key() {
        let cache = TransactionCache::default();
        cache.get_or_init(&COUNTER, || Cell::new(7));
        let label = cache.get_or_init(&LABEL, || "seven".to_string());
        assert_eq!(label.as_str(), "seven");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn init_may_reenter() {
        let cache = TransactionCache::default();
        let label = cache.get_or_init(&LABEL, || {
            let counter = cache.get_or_init(&COUNTER, || Cell::new(1));
            format!("n={}", counter.get())
        });
        assert_eq!(label.as_str(), "n=1");
        assert!(cache.remove(&COUNTER).is_some());
        assert!(cache.get(&COUNTER).is_none());
    }
}
