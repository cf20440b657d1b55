//! Database listeners and live queries.
//!
//! Both are notified from a foreground read scheduled after each successful
//! write, against the snapshot that write committed.

use crate::attribute::Attribute;
use crate::event::DbEvent;
use crate::query::BoolExpr;
use crate::shadow::ShadowKind;
use crate::stats::DatabaseStats;
use crate::store::CommitDiff;
use crate::transaction::DbReader;
use crate::types::{Icn, Item};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Controls how long a subscription stays attached.
///
/// Clones share the flag; ending any clone ends them all.
#[derive(Debug, Clone, Default)]
pub struct Lifespan(Arc<AtomicBool>);

impl Lifespan {
    /// A lifespan that lasts until [`Lifespan::end`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A lifespan nobody is expected to end.
    #[must_use]
    pub fn forever() -> Self {
        Self::default()
    }

    /// Detaches everything registered with this lifespan.
    pub fn end(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Receives every committed change as a changed-only event.
pub trait DbListener: Send + Sync {
    /// Called once per successful write that changed anything.
    fn on_database_changed(&self, event: &DbEvent, reader: &DbReader<'_>);
}

impl<F> DbListener for F
where
    F: Fn(&DbEvent, &DbReader<'_>) + Send + Sync,
{
    fn on_database_changed(&self, event: &DbEvent, reader: &DbReader<'_>) {
        self(event, reader);
    }
}

/// Receives changes to a live query's result set.
pub trait LiveQueryListener: Send + Sync {
    /// The first call reports the whole initial set as changed. Later calls
    /// report the delta caused by the write that committed at `icn`.
    fn on_query_changed(&self, event: &DbEvent, icn: Icn, reader: &DbReader<'_>);
}

impl<F> LiveQueryListener for F
where
    F: Fn(&DbEvent, Icn, &DbReader<'_>) + Send + Sync,
{
    fn on_query_changed(&self, event: &DbEvent, icn: Icn, reader: &DbReader<'_>) {
        self(event, icn, reader);
    }
}

#[derive(Debug, Default)]
struct LiveState {
    items: Vec<Item>,
    icn: Icn,
    initialized: bool,
}

pub(crate) struct LiveQueryInner {
    expr: BoolExpr,
    affecting: Option<BTreeSet<Attribute>>,
    listener: Arc<dyn LiveQueryListener>,
    lifespan: Lifespan,
    state: RwLock<LiveState>,
}

/// A query whose result set is kept current after every write.
///
/// Accessors are thread-safe and read the last delivered state.
#[derive(Clone)]
pub struct LiveQuery {
    inner: Arc<LiveQueryInner>,
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("LiveQuery")
            .field("expr", &self.inner.expr)
            .field("items", &state.items.len())
            .field("icn", &state.icn)
            .field("initialized", &state.initialized)
            .finish()
    }
}

impl LiveQuery {
    pub(crate) fn new(
        lifespan: Lifespan,
        expr: BoolExpr,
        listener: Arc<dyn LiveQueryListener>,
    ) -> Self {
        let affecting = expr.affecting_attributes();
        Self {
            inner: Arc::new(LiveQueryInner {
                expr,
                affecting,
                listener,
                lifespan,
                state: RwLock::new(LiveState::default()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> Arc<LiveQueryInner> {
        Arc::clone(&self.inner)
    }

    /// The query expression.
    #[must_use]
    pub fn expression(&self) -> &BoolExpr {
        &self.inner.expr
    }

    /// Current matches, ascending.
    #[must_use]
    pub fn copy_items(&self) -> Vec<Item> {
        self.inner.state.read().items.clone()
    }

    /// Number of current matches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.state.read().items.len()
    }

    /// Folds over current matches in ascending order.
    pub fn fold<A>(&self, init: A, f: impl FnMut(A, &Item) -> A) -> A {
        self.inner.state.read().items.iter().fold(init, f)
    }

    /// Returns true if `item` currently matches.
    #[must_use]
    pub fn contains(&self, item: Item) -> bool {
        self.inner.state.read().items.binary_search(&item).is_ok()
    }

    /// ICN the result set reflects.
    #[must_use]
    pub fn icn(&self) -> Icn {
        self.inner.state.read().icn
    }

    /// Returns true after the initial delivery.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.state.read().initialized
    }

    /// Returns true if the write that committed at `icn` is reflected.
    #[must_use]
    pub fn is_transaction_result_visible(&self, icn: Icn) -> bool {
        let state = self.inner.state.read();
        state.initialized && state.icn >= icn
    }

    /// Returns true until the lifespan ends.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.lifespan.is_ended()
    }
}

/// Registered listeners and live queries.
pub(crate) struct LiveQueryManager {
    listeners: RwLock<Vec<(Lifespan, Arc<dyn DbListener>)>>,
    queries: RwLock<Vec<Arc<LiveQueryInner>>>,
    check_invariants: bool,
    stats: Arc<DatabaseStats>,
}

impl LiveQueryManager {
    pub(crate) fn new(check_invariants: bool, stats: Arc<DatabaseStats>) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            queries: RwLock::new(Vec::new()),
            check_invariants,
            stats,
        }
    }

    pub(crate) fn add_listener(&self, lifespan: Lifespan, listener: Arc<dyn DbListener>) {
        self.listeners.write().push((lifespan, listener));
    }

    pub(crate) fn register(&self, query: Arc<LiveQueryInner>) {
        self.queries.write().push(query);
    }

    pub(crate) fn query_count(&self) -> usize {
        self.queries.read().len()
    }

    /// Computes and delivers the initial result set.
    pub(crate) fn initialize(&self, query: &LiveQueryInner, reader: &DbReader<'_>) {
        if query.lifespan.is_ended() {
            return;
        }
        let items = reader.query(query.expr.clone()).copy_items_sorted();
        let icn = reader.icn();
        {
            let mut state = query.state.write();
            state.items = items.clone();
            state.icn = icn;
            state.initialized = true;
        }
        self.deliver(query, &DbEvent::changed_only(items), icn, reader);
    }

    /// Notifies everything still attached about the write committed at `icn`.
    ///
    /// `reader` reads the snapshot that write produced.
    pub(crate) fn dispatch(&self, reader: &DbReader<'_>, icn: Icn, diff: &CommitDiff) {
        self.listeners.write().retain(|(lifespan, _)| !lifespan.is_ended());
        self.queries.write().retain(|q| !q.lifespan.is_ended());

        let changed = diff.items();
        let listeners: Vec<Arc<dyn DbListener>> =
            self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        if !listeners.is_empty() {
            let event = DbEvent::changed_only(changed.clone());
            for listener in listeners {
                self.stats.record_notification();
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
                    listener.on_database_changed(&event, reader);
                }));
                if delivered.is_err() {
                    tracing::error!(%icn, "database listener panicked");
                }
            }
        }

        let queries: Vec<Arc<LiveQueryInner>> = self.queries.read().clone();
        for query in queries {
            if let Some(event) = self.update(&query, reader, icn, diff) {
                self.deliver(&query, &event, icn, reader);
            }
        }
    }

    fn update(
        &self,
        query: &LiveQueryInner,
        reader: &DbReader<'_>,
        icn: Icn,
        diff: &CommitDiff,
    ) -> Option<DbEvent> {
        let mut state = query.state.write();
        // Uninitialized queries read a snapshot that already has this write.
        if !state.initialized || state.icn >= icn {
            return None;
        }
        let candidates: Vec<Item> = match &query.affecting {
            None => diff.items(),
            Some(affecting) => diff
                .changes
                .iter()
                // Every query requires a live item; shadow writes move the
                // sync state even when trunk is untouched.
                .filter(|c| {
                    c.changes_liveness()
                        || c.attributes
                            .iter()
                            .any(|a| affecting.contains(a) || ShadowKind::of_attribute(a).is_some())
                })
                .map(|c| c.item)
                .collect(),
        };
        if candidates.is_empty() {
            state.icn = icn;
            return None;
        }
        let accepted = reader.query(query.expr.clone()).filter_items_sorted(&candidates);
        match DbEvent::create(
            Some(&mut state.items),
            &candidates,
            &accepted,
            self.check_invariants,
        ) {
            Ok(event) => {
                state.icn = icn;
                (!event.is_empty()).then_some(event)
            }
            Err(error) => {
                tracing::error!(%icn, %error, "live query update failed, rebuilding result set");
                let items = reader.query(query.expr.clone()).copy_items_sorted();
                state.items = items.clone();
                state.icn = icn;
                Some(DbEvent::changed_only(items))
            }
        }
    }

    fn deliver(&self, query: &LiveQueryInner, event: &DbEvent, icn: Icn, reader: &DbReader<'_>) {
        if query.lifespan.is_ended() {
            return;
        }
        self.stats.record_notification();
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            query.listener.on_query_changed(event, icn, reader);
        }));
        if delivered.is_err() {
            tracing::error!(%icn, "live query listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Value;
    use crate::store::StoreState;
    use crate::transaction::{CancelToken, Transaction};
    use crate::types::TransactionId;
    use parking_lot::Mutex;

    fn a() -> Attribute {
        Attribute::int("t:a", "A")
    }

    fn b() -> Attribute {
        Attribute::int("t:b", "B")
    }

    /// Commits `edit` on top of `state`.
    fn commit(
        state: &Arc<StoreState>,
        icn: u64,
        edit: impl FnOnce(&crate::transaction::DbWriter<'_>),
    ) -> (Arc<StoreState>, CommitDiff) {
        let tx = Transaction::new(TransactionId::new(icn), Arc::clone(state), true, CancelToken::new());
        edit(&tx.writer().unwrap());
        let committed = tx.into_committed(Icn::new(icn));
        (Arc::new(committed.state), committed.diff)
    }

    fn read<R>(state: &Arc<StoreState>, f: impl FnOnce(&DbReader<'_>) -> R) -> R {
        let tx = Transaction::new(TransactionId::new(0), Arc::clone(state), false, CancelToken::new());
        f(&tx.reader())
    }

    type Log = Arc<Mutex<Vec<(Vec<Item>, Vec<Item>, Vec<Item>)>>>;

    fn recording() -> (Log, Arc<dyn LiveQueryListener>) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let listener = move |event: &DbEvent, _icn: Icn, _reader: &DbReader<'_>| {
            sink.lock().push((
                event.added().to_vec(),
                event.removed().to_vec(),
                event.changed().to_vec(),
            ));
        };
        (log, Arc::new(listener))
    }

    #[test]
    fn initial_delivery_then_incremental_updates() {
        let stats = Arc::new(DatabaseStats::new());
        let manager = LiveQueryManager::new(true, stats);
        let (state, _) = commit(&Arc::default(), 1, |w| {
            for v in [1, 2, 1] {
                let item = w.next_item().unwrap();
                w.set(item, &a(), v).unwrap();
            }
        });

        let (log, listener) = recording();
        let query = LiveQuery::new(Lifespan::new(), BoolExpr::equals(&a(), 1), listener);
        manager.register(query.inner());
        read(&state, |r| manager.initialize(&query.inner(), r));
        assert_eq!(query.copy_items(), vec![Item::new(1), Item::new(3)]);
        assert!(query.is_transaction_result_visible(Icn::new(1)));

        let (state, diff) = commit(&state, 2, |w| {
            w.set(Item::new(1), &a(), 5).unwrap();
            w.set(Item::new(2), &a(), 1).unwrap();
        });
        read(&state, |r| manager.dispatch(r, Icn::new(2), &diff));

        assert_eq!(query.copy_items(), vec![Item::new(2), Item::new(3)]);
        assert!(query.contains(Item::new(2)));
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].2, vec![Item::new(1), Item::new(3)]);
        assert_eq!(log[1], (vec![Item::new(2)], vec![Item::new(1)], vec![]));
    }

    #[test]
    fn unrelated_attributes_do_not_notify() {
        let manager = LiveQueryManager::new(true, Arc::new(DatabaseStats::new()));
        let (state, _) = commit(&Arc::default(), 1, |w| {
            let item = w.next_item().unwrap();
            w.set(item, &a(), 1).unwrap();
        });
        let (log, listener) = recording();
        let query = LiveQuery::new(Lifespan::new(), BoolExpr::equals(&a(), 1), listener);
        manager.register(query.inner());
        read(&state, |r| manager.initialize(&query.inner(), r));

        let (state, diff) = commit(&state, 2, |w| {
            w.set_value(Item::new(1), &b(), Some(Value::Int(9))).unwrap();
        });
        read(&state, |r| manager.dispatch(r, Icn::new(2), &diff));

        assert_eq!(log.lock().len(), 1);
        assert_eq!(query.icn(), Icn::new(2));
    }

    #[test]
    fn ended_lifespans_detach() {
        let manager = LiveQueryManager::new(true, Arc::new(DatabaseStats::new()));
        let lifespan = Lifespan::new();
        let (_, listener) = recording();
        let query = LiveQuery::new(lifespan.clone(), BoolExpr::all(), listener);
        manager.register(query.inner());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.add_listener(
            lifespan.clone(),
            Arc::new(move |_: &DbEvent, _: &DbReader<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        lifespan.end();

        let (state, diff) = commit(&Arc::default(), 1, |w| {
            let item = w.next_item().unwrap();
            w.set(item, &a(), 1).unwrap();
        });
        read(&state, |r| manager.dispatch(r, Icn::new(1), &diff));
        assert_eq!(manager.query_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!query.is_active());
    }

    #[test]
    fn created_and_cleared_items_reach_attribute_free_queries() {
        let manager = LiveQueryManager::new(true, Arc::new(DatabaseStats::new()));
        let (all_log, all_listener) = recording();
        let (neg_log, neg_listener) = recording();
        let all = LiveQuery::new(Lifespan::new(), BoolExpr::all(), all_listener);
        let negated = LiveQuery::new(
            Lifespan::new(),
            BoolExpr::equals(&a(), 1).negate(),
            neg_listener,
        );
        manager.register(all.inner());
        manager.register(negated.inner());
        let state: Arc<StoreState> = Arc::default();
        read(&state, |r| {
            manager.initialize(&all.inner(), r);
            manager.initialize(&negated.inner(), r);
        });

        let (state, diff) = commit(&state, 1, |w| {
            let item = w.next_item().unwrap();
            w.set_value(item, &b(), Some(Value::Int(7))).unwrap();
        });
        read(&state, |r| manager.dispatch(r, Icn::new(1), &diff));
        assert_eq!(all.copy_items(), vec![Item::new(1)]);
        assert_eq!(negated.copy_items(), vec![Item::new(1)]);

        let (state, diff) = commit(&state, 2, |w| {
            w.clear_item(Item::new(1)).unwrap();
        });
        read(&state, |r| manager.dispatch(r, Icn::new(2), &diff));
        assert_eq!(all.count(), 0);
        assert_eq!(negated.count(), 0);

        for log in [all_log, neg_log] {
            let log = log.lock();
            assert_eq!(log.len(), 3);
            assert_eq!(log[1], (vec![Item::new(1)], vec![], vec![]));
            assert_eq!(log[2], (vec![], vec![Item::new(1)], vec![]));
        }
    }

    #[test]
    fn failed_delta_rebuilds_the_result_set() {
        let manager = LiveQueryManager::new(true, Arc::new(DatabaseStats::new()));
        let (log, listener) = recording();
        let query = LiveQuery::new(Lifespan::new(), BoolExpr::equals(&a(), 1), listener);
        manager.register(query.inner());
        read(&Arc::default(), |r| manager.initialize(&query.inner(), r));

        let (state, mut diff) = commit(&Arc::default(), 1, |w| {
            for _ in 0..2 {
                let item = w.next_item().unwrap();
                w.set(item, &a(), 1).unwrap();
            }
        });
        // Out-of-order changes make the delta fail its consistency check.
        diff.changes.reverse();
        read(&state, |r| manager.dispatch(r, Icn::new(1), &diff));

        assert_eq!(query.copy_items(), vec![Item::new(1), Item::new(2)]);
        assert!(query.is_transaction_result_visible(Icn::new(1)));
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1], (vec![], vec![], vec![Item::new(1), Item::new(2)]));
    }

    #[test]
    fn stale_commits_are_skipped() {
        let manager = LiveQueryManager::new(true, Arc::new(DatabaseStats::new()));
        let (state, diff) = commit(&Arc::default(), 1, |w| {
            let item = w.next_item().unwrap();
            w.set(item, &a(), 1).unwrap();
        });
        let (log, listener) = recording();
        let query = LiveQuery::new(Lifespan::new(), BoolExpr::equals(&a(), 1), listener);
        manager.register(query.inner());
        read(&state, |r| {
            manager.initialize(&query.inner(), r);
            manager.dispatch(r, Icn::new(1), &diff);
        });
        assert_eq!(log.lock().len(), 1);
        assert_eq!(query.count(), 1);
    }
}
