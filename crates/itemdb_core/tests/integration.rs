//! Integration tests for the item store through its public API.

use itemdb_core::{
    Attribute, AttributeMap, BaseShadowPolicy, BoolExpr, Branch, Config, CoreError, CoreResult,
    Database, DbEvent, DbReader, DbWriter, Gate, Icn, Item, Lifespan, ShadowableChangeListener,
    ShadowKind, SyncState, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tempfile::tempdir;

static A: LazyLock<Attribute> = LazyLock::new(|| Attribute::int("test:a", "A").shadowable());
static B: LazyLock<Attribute> = LazyLock::new(|| Attribute::text("test:b", "B").shadowable());
static NOTE: LazyLock<Attribute> = LazyLock::new(|| Attribute::text("test:note", "Note"));

/// Everything a live query listener has been told, in order.
#[derive(Default)]
struct Recorded {
    events: Mutex<Vec<(DbEvent, Icn)>>,
}

impl Recorded {
    fn take(&self) -> Vec<(DbEvent, Icn)> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

fn record(recorded: &Arc<Recorded>) -> impl Fn(&DbEvent, Icn, &DbReader<'_>) + Send + Sync {
    let recorded = Arc::clone(recorded);
    move |event: &DbEvent, icn: Icn, _: &DbReader<'_>| {
        recorded.events.lock().unwrap().push((event.clone(), icn));
    }
}

fn create_with_a(db: &Database, value: i32) -> Item {
    db.write_foreground(move |w| {
        let writer = w.create_item()?;
        writer.set(&A, value)?;
        Ok(writer.item())
    })
    .wait()
    .unwrap()
}

#[test]
fn new_item_then_conflicting_download() {
    let db = Database::open_in_memory().unwrap();
    let item = create_with_a(&db, 1);

    let state = db
        .read_foreground(move |r| Ok(r.sync_state(item)))
        .wait()
        .unwrap();
    assert_eq!(state, SyncState::New);

    let recorded = Arc::new(Recorded::default());
    let query = db.live_query(Lifespan::new(), BoolExpr::equals(&A, 1), record(&recorded));
    db.flush();
    let initial = recorded.take();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].0.changed(), &[item]);
    assert_eq!(query.copy_items(), vec![item]);

    let state = db
        .write_foreground(move |w| {
            let shadows = w.shadows();
            shadows.set_download(item, Some(AttributeMap::new().with(&A, 2)))?;
            shadows.merge_download(item)
        })
        .wait()
        .unwrap();
    assert_eq!(state, SyncState::Conflict);
    db.flush();

    // Trunk still has A = 1: the item stays in the set and is reported once.
    let events = recorded.take();
    assert_eq!(events.len(), 1);
    let (event, icn) = &events[0];
    assert_eq!(event.changed(), &[item]);
    assert!(event.added().is_empty());
    assert!(event.removed().is_empty());
    assert_eq!(*icn, db.icn());
    assert!(query.contains(item));
}

#[test]
fn new_item_then_matching_download_is_edited() {
    let db = Database::open_in_memory().unwrap();
    let item = create_with_a(&db, 1);

    let state = db
        .write_foreground(move |w| {
            let shadows = w.shadows();
            shadows.set_download(item, Some(AttributeMap::new().with(&A, 1)))?;
            shadows.merge_download(item)
        })
        .wait()
        .unwrap();
    assert_eq!(state, SyncState::Edited);
}

#[test]
fn server_write_on_new_item_then_merge() {
    let db = Database::open_in_memory().unwrap();
    let conflicting = create_with_a(&db, 1);
    let matching = create_with_a(&db, 2);

    let (download, states) = db
        .write_foreground(move |w| {
            w.change_server(conflicting)?.set(&A, 2)?;
            w.change_server(matching)?.set(&A, 2)?;
            let download = w.shadows().download(conflicting);
            let states = (
                w.shadows().merge_download(conflicting)?,
                w.shadows().merge_download(matching)?,
            );
            Ok((download, states))
        })
        .wait()
        .unwrap();

    assert_eq!(download, Some(AttributeMap::new().with(&A, 2)));
    assert_eq!(states, (SyncState::Conflict, SyncState::Edited));
}

#[test]
fn accepted_remote_change_removes_item_from_query() {
    let db = Database::open_in_memory().unwrap();
    let item = db
        .write_foreground(|w| {
            let item = w.next_item()?;
            w.set(item, &A, 1)?;
            Ok(item)
        })
        .wait()
        .unwrap();

    let recorded = Arc::new(Recorded::default());
    let query = db.live_query(Lifespan::new(), BoolExpr::equals(&A, 1), record(&recorded));
    db.flush();
    recorded.take();

    db.write_foreground(move |w| {
        w.change_server(item)?.set(&A, 2)?;
        w.shadows().merge_download(item)
    })
    .wait()
    .unwrap();
    db.flush();

    let events = recorded.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0.removed(), &[item]);
    assert_eq!(query.count(), 0);
}

#[test]
fn live_query_initial_delivery() {
    let db = Database::open_in_memory().unwrap();
    let first = create_with_a(&db, 1);
    let second = create_with_a(&db, 1);
    create_with_a(&db, 3);

    let recorded = Arc::new(Recorded::default());
    let query = db.live_query(Lifespan::new(), BoolExpr::equals(&A, 1), record(&recorded));
    db.flush();

    let events = recorded.take();
    assert_eq!(events.len(), 1);
    let (event, icn) = &events[0];
    assert_eq!(event.changed(), &[first, second]);
    assert!(event.added().is_empty());
    assert_eq!(query.count(), 2);
    assert_eq!(query.copy_items(), vec![first, second]);
    assert!(query.is_initialized());
    assert!(query.is_transaction_result_visible(*icn));
}

#[test]
fn live_query_tracks_added_and_removed() {
    let db = Database::open_in_memory().unwrap();
    let recorded = Arc::new(Recorded::default());
    let query = db.live_query(Lifespan::new(), BoolExpr::equals(&A, 1), record(&recorded));
    db.flush();
    recorded.take();

    let item = create_with_a(&db, 1);
    db.flush();
    let events = recorded.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0.added(), &[item]);

    // A write-through attribute outside the expression does not notify.
    db.write_foreground(move |w| w.set(item, &NOTE, "later"))
        .wait()
        .unwrap();
    db.flush();
    assert!(recorded.take().is_empty());

    db.write_foreground(move |w| w.change_item(item)?.set(&A, 5))
        .wait()
        .unwrap();
    db.flush();
    let events = recorded.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0.removed(), &[item]);
    assert_eq!(query.count(), 0);
}

#[test]
fn live_queries_without_terms_follow_item_lifetime() {
    let db = Database::open_in_memory().unwrap();
    let ignore = |_: &DbEvent, _: Icn, _: &DbReader<'_>| {};
    let all = db.live_query(Lifespan::new(), BoolExpr::all(), ignore);
    let not_one = db.live_query(Lifespan::new(), BoolExpr::equals(&A, 1).negate(), ignore);
    db.flush();

    let item = db
        .write_foreground(|w| {
            let item = w.next_item()?;
            w.set(item, &NOTE, "only a note")?;
            Ok(item)
        })
        .wait()
        .unwrap();
    db.flush();
    assert_eq!(all.copy_items(), vec![item]);
    assert_eq!(not_one.copy_items(), vec![item]);

    let icn = db
        .write_foreground(move |w| w.clear_item(item))
        .wait()
        .map(|_| db.icn())
        .unwrap();
    db.flush();
    assert_eq!(all.count(), 0);
    assert_eq!(not_one.count(), 0);
    assert!(all.is_transaction_result_visible(icn));
}

#[test]
fn ended_lifespan_stops_delivery() {
    let db = Database::open_in_memory().unwrap();
    let lifespan = Lifespan::new();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    db.add_listener(lifespan.clone(), move |event: &DbEvent, _: &DbReader<'_>| {
        seen.fetch_add(event.changed().len(), Ordering::SeqCst);
    });

    create_with_a(&db, 1);
    db.flush();
    assert!(count.load(Ordering::SeqCst) >= 1);

    lifespan.end();
    let before = count.load(Ordering::SeqCst);
    create_with_a(&db, 2);
    db.flush();
    assert_eq!(count.load(Ordering::SeqCst), before);
}

struct CountingPolicy(Arc<AtomicUsize>);

impl ShadowableChangeListener for CountingPolicy {
    fn before_shadowable_changed(
        &self,
        writer: &DbWriter<'_>,
        item: Item,
        is_new: bool,
    ) -> CoreResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        BaseShadowPolicy.before_shadowable_changed(writer, item, is_new)
    }
}

#[test]
fn first_shadowable_write_triggers_once() {
    let db = Database::open_in_memory().unwrap();
    let item = db
        .write_foreground(|w| {
            let item = w.next_item()?;
            w.set(item, &A, 1)?;
            w.set(item, &B, "x")?;
            Ok(item)
        })
        .wait()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let state = db
        .write_foreground(move |w| {
            w.set_shadowable_listener(CountingPolicy(counter))?;
            let writer = w.change_item(item)?;
            writer.set(&A, 2)?;
            writer.set(&B, "y")?;
            writer.set(&A, 3)?;
            Ok(w.sync_state(item))
        })
        .wait()
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state, SyncState::Edited);
    let base = db
        .read_foreground(move |r| Ok(r.shadow(item, ShadowKind::Base)))
        .wait()
        .unwrap();
    assert_eq!(base, Some(AttributeMap::new().with(&A, 1).with(&B, "x")));
}

#[test]
fn write_through_and_shadowable_round_trip() {
    let db = Database::open_in_memory().unwrap();
    let item = db
        .write_foreground(|w| {
            let item = w.next_item()?;
            w.set(item, &A, 1)?;
            Ok(item)
        })
        .wait()
        .unwrap();

    let (trunk_a, server_a, trunk_note, server_note) = db
        .write_foreground(move |w| {
            let server = w.write_item(item, Branch::Server)?;
            server.set(&A, 7)?;
            server.set(&NOTE, "shared")?;
            let trunk = w.read_item(item, Branch::Trunk)?;
            Ok((
                trunk.get::<i32>(&A)?,
                server.get::<i32>(&A)?,
                trunk.get::<String>(&NOTE)?,
                server.get::<String>(&NOTE)?,
            ))
        })
        .wait()
        .unwrap();

    assert_eq!(trunk_a, Some(1));
    assert_eq!(server_a, Some(7));
    assert_eq!(trunk_note.as_deref(), Some("shared"));
    assert_eq!(server_note.as_deref(), Some("shared"));
}

#[test]
fn cancelled_write_never_runs() {
    let db = Database::open_in_memory().unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let blocker = db.write_background(move |_| {
        release_rx.recv_timeout(Duration::from_secs(5)).ok();
        Ok(())
    });

    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    let pending = db.write_background(move |w| {
        flag.fetch_add(1, Ordering::SeqCst);
        let item = w.next_item()?;
        w.set(item, &A, 1)
    });
    let (failure_tx, failure_rx) = mpsc::channel();
    pending.on_failure(Gate::Straight, move |error| {
        failure_tx.send(matches!(error, CoreError::Cancelled)).ok();
    });
    pending.cancel();
    release_tx.send(()).unwrap();

    blocker.wait().unwrap();
    assert!(matches!(pending.wait(), Err(CoreError::Cancelled)));
    assert!(failure_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(db.icn(), Icn::ZERO);
}

#[test]
fn foreground_read_runs_while_main_is_busy() {
    let db = Database::open_in_memory().unwrap();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let writer = db.write_background(move |w| {
        started_tx.send(()).ok();
        release_rx.recv_timeout(Duration::from_secs(5)).ok();
        let item = w.next_item()?;
        w.set(item, &A, 1)
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let icn = db.read_foreground(|r| Ok(r.icn())).wait().unwrap();
    assert_eq!(icn, Icn::ZERO);
    assert!(!writer.is_done());

    release_tx.send(()).unwrap();
    assert!(writer.wait().unwrap());
    assert_eq!(db.icn(), Icn::new(1));
}

#[test]
fn cancellation_stops_a_running_write() {
    let db = Database::open_in_memory().unwrap();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let running = db.write_background(move |w| {
        started_tx.send(()).ok();
        go_rx.recv_timeout(Duration::from_secs(5)).ok();
        let item = w.next_item()?;
        w.set(item, &A, 1)?;
        w.check_cancelled()?;
        w.set(item, &B, "unreachable")
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    running.cancel();
    go_tx.send(()).unwrap();

    assert!(matches!(running.wait(), Err(CoreError::Cancelled)));
    assert_eq!(running.commit_icn(), None);
    assert_eq!(db.icn(), Icn::ZERO);
    let items = db.read_foreground(|r| Ok(r.items())).wait().unwrap();
    assert!(items.is_empty());
}

#[test]
fn failed_write_reports_and_queue_continues() {
    let db = Database::open_in_memory().unwrap();
    let failed = db.write_foreground(|w| -> CoreResult<()> {
        let item = w.next_item()?;
        w.set(item, &A, 1)?;
        panic!("boom");
    });
    let (done_tx, done_rx) = mpsc::channel();
    failed.finally(Gate::Dedicated, move |ok| {
        done_tx.send(ok).ok();
    });
    assert!(failed.wait().is_err());
    assert!(!done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    assert_eq!(db.icn(), Icn::ZERO);

    let item = create_with_a(&db, 4);
    let value = db
        .read_background(move |r| r.get::<i32>(item, &A))
        .wait()
        .unwrap();
    assert_eq!(value, Some(4));
}

#[test]
fn journal_replays_on_reopen() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("db");

    let item = {
        let db = Database::open_with_config(&path, Config::new().thread_prefix("replay")).unwrap();
        let item = create_with_a(&db, 1);
        db.write_foreground(move |w| {
            w.set(item, &NOTE, "kept")?;
            w.shadows().request_upload(item)
        })
        .wait()
        .unwrap();
        db.close();
        item
    };

    let db = Database::open(&path).unwrap();
    assert_eq!(db.icn(), Icn::new(2));
    let (a, note, state, task) = db
        .read_foreground(move |r| {
            Ok((
                r.get_value(item, &A),
                r.get::<String>(item, &NOTE)?,
                r.sync_state(item),
                r.shadow(item, ShadowKind::UploadTask),
            ))
        })
        .wait()
        .unwrap();
    assert_eq!(a, Some(Value::Int(1)));
    assert_eq!(note.as_deref(), Some("kept"));
    assert_eq!(state, SyncState::New);
    assert_eq!(task, Some(AttributeMap::new().with(&A, 1)));

    let next = create_with_a(&db, 2);
    assert!(next > item);
}

#[test]
fn second_open_is_locked() {
    let temp = tempdir().unwrap();
    let _db = Database::open(temp.path()).unwrap();
    assert!(matches!(
        Database::open(temp.path()),
        Err(CoreError::DatabaseLocked)
    ));
}
