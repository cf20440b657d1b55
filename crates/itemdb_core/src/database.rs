//! Database facade: scheduling, commit and recovery.

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::dump;
use crate::error::{CoreError, CoreResult};
use crate::journal::{CommitRecord, Journal};
use crate::live::{DbListener, Lifespan, LiveQuery, LiveQueryListener, LiveQueryManager};
use crate::query::BoolExpr;
use crate::scheduler::{CallbackGate, DbPriority, DbResult, JobQueue, Outcome};
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::{CommitDiff, StoreState};
use crate::transaction::{CancelToken, DbReader, DbWriter, PostCommit, Transaction};
use crate::types::{Icn, TransactionId};
use itemdb_storage::{FileBackend, StorageBackend};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The main database handle.
///
/// All work goes through transactions submitted to two worker queues:
/// writes and background reads run on *main*, foreground reads on *view*.
/// Each transaction sees a private snapshot; a write publishes a new snapshot
/// atomically when its closure returns `Ok`.
///
/// ```rust,ignore
/// let db = Database::open_in_memory()?;
/// let item = db
///     .write_foreground(|w| {
///         let item = w.create_item()?;
///         item.set(&TITLE, "hello")?;
///         Ok(item.item())
///     })
///     .wait()?;
/// let title = db
///     .read_foreground(move |r| r.get::<String>(item, &TITLE))
///     .wait()?;
/// ```
pub struct Database {
    shared: Arc<Shared>,
    /// Holds the directory lock. None for in-memory databases.
    dir: Option<DatabaseDir>,
}

struct Shared {
    config: Config,
    snapshot: RwLock<Arc<StoreState>>,
    journal: Option<Journal>,
    next_txid: AtomicU64,
    main: JobQueue,
    view: JobQueue,
    gate: Arc<CallbackGate>,
    live: LiveQueryManager,
    stats: Arc<DatabaseStats>,
    is_open: AtomicBool,
}

/// A successful commit, ready for callbacks and notification.
struct Published {
    icn: Icn,
    state: Arc<StoreState>,
    diff: CommitDiff,
    post_commit: Vec<PostCommit>,
}

impl Database {
    /// Opens a database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Fails if worker threads cannot be spawned.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::start(Config::default(), StoreState::default(), None, None)
    }

    /// Opens or creates a database directory with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Database::open_with_config`].
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens or creates a database directory.
    ///
    /// Locks the directory, replays the journal and starts the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - another handle has the directory locked (`DatabaseLocked`)
    /// - the journal is corrupt
    /// - I/O errors occur
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let journal = Journal::new(Box::new(backend), config.sync_on_commit);
        let state = journal.replay()?;
        tracing::info!(path = %path.display(), icn = %state.icn, "database opened");
        Self::start(config, state, Some(journal), Some(dir))
    }

    /// Opens a database journaling to `backend`.
    ///
    /// # Errors
    ///
    /// Fails if the journal is corrupt or workers cannot be spawned.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let journal = Journal::new(backend, config.sync_on_commit);
        let state = journal.replay()?;
        Self::start(config, state, Some(journal), None)
    }

    fn start(
        config: Config,
        state: StoreState,
        journal: Option<Journal>,
        dir: Option<DatabaseDir>,
    ) -> CoreResult<Self> {
        let stats = Arc::new(DatabaseStats::new());
        let shared = Shared {
            main: JobQueue::start(&config.main_thread_name)?,
            view: JobQueue::start(&config.view_thread_name)?,
            gate: Arc::new(CallbackGate::start(&config.gate_thread_name)?),
            live: LiveQueryManager::new(config.check_event_invariants, Arc::clone(&stats)),
            snapshot: RwLock::new(Arc::new(state)),
            journal,
            next_txid: AtomicU64::new(1),
            stats,
            is_open: AtomicBool::new(true),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
            dir,
        })
    }

    /// Submits a read transaction.
    ///
    /// Foreground reads run on the view queue, background reads on main.
    pub fn read<T, F>(&self, priority: DbPriority, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbReader<'_>) -> CoreResult<T> + Send + 'static,
    {
        let result = self.shared.new_result();
        let handle = result.clone();
        let shared = Arc::clone(&self.shared);
        let job = Box::new(move || shared.run_read(&handle, f));
        let queue = if priority.is_foreground() {
            &self.shared.view
        } else {
            &self.shared.main
        };
        self.shared.submit(queue, priority, job, &result);
        result
    }

    /// Submits a write transaction on the main queue.
    ///
    /// The closure's changes commit when it returns `Ok`; on error, panic or
    /// cancellation nothing is committed.
    pub fn write<T, F>(&self, priority: DbPriority, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbWriter<'_>) -> CoreResult<T> + Send + 'static,
    {
        let result = self.shared.new_result();
        let handle = result.clone();
        let shared = Arc::clone(&self.shared);
        let job = Box::new(move || shared.run_write(&handle, f));
        self.shared.submit(&self.shared.main, priority, job, &result);
        result
    }

    /// [`Database::read`] at foreground priority.
    pub fn read_foreground<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbReader<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.read(DbPriority::FOREGROUND, f)
    }

    /// [`Database::read`] at background priority.
    pub fn read_background<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbReader<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.read(DbPriority::BACKGROUND, f)
    }

    /// [`Database::write`] at foreground priority.
    pub fn write_foreground<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbWriter<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.write(DbPriority::FOREGROUND, f)
    }

    /// [`Database::write`] at background priority.
    pub fn write_background<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbWriter<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.write(DbPriority::BACKGROUND, f)
    }

    /// Calls `listener` after every write that changed anything, until
    /// `lifespan` ends.
    pub fn add_listener(&self, lifespan: Lifespan, listener: impl DbListener + 'static) {
        self.shared.live.add_listener(lifespan, Arc::new(listener));
    }

    /// Registers a live query.
    ///
    /// The full match set is delivered as a changed event from a foreground
    /// read; afterwards `listener` receives the delta of each relevant write.
    pub fn live_query(
        &self,
        lifespan: Lifespan,
        expr: BoolExpr,
        listener: impl LiveQueryListener + 'static,
    ) -> LiveQuery {
        let query = LiveQuery::new(lifespan, expr, Arc::new(listener));
        self.shared.live.register(query.inner());
        let inner = query.inner();
        let shared = Arc::clone(&self.shared);
        self.read(DbPriority::FOREGROUND, move |reader| {
            shared.live.initialize(&inner, reader);
            Ok(())
        });
        query
    }

    /// Writes a text dump of the current snapshot to `out`.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from `out`.
    pub fn dump(&self, out: &mut dyn std::io::Write) -> CoreResult<()> {
        self.with_snapshot(|reader| dump::dump(reader, out))
    }

    /// Writes a text dump of the current snapshot to a file.
    ///
    /// # Errors
    ///
    /// Returns I/O errors.
    pub fn dump_to_path(&self, path: &Path) -> CoreResult<()> {
        self.with_snapshot(|reader| dump::dump_to_path(reader, path))
    }

    /// Text dump of the current snapshot.
    ///
    /// # Errors
    ///
    /// See [`dump::dump_to_string`].
    pub fn dump_to_string(&self) -> CoreResult<String> {
        self.with_snapshot(dump::dump_to_string)
    }

    /// Runs `f` on the calling thread against the latest snapshot.
    ///
    /// Used by tooling that does not need queue ordering.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&DbReader<'_>) -> R) -> R {
        let tx = Transaction::new(
            self.shared.next_txid(),
            self.shared.snapshot(),
            false,
            CancelToken::new(),
        );
        f(&tx.reader())
    }

    /// Blocks until every transaction submitted so far, and the
    /// notifications it caused, has finished.
    pub fn flush(&self) {
        self.shared.main.flush();
        self.shared.view.flush();
    }

    /// ICN of the latest committed snapshot.
    #[must_use]
    pub fn icn(&self) -> Icn {
        self.shared.snapshot().icn
    }

    /// Counters since open.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The database directory, for on-disk databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns true until [`Database::close`].
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::Acquire)
    }

    /// Stops accepting work, finishes what is queued and stops the workers.
    ///
    /// Work submitted afterwards fails with `DatabaseClosed`.
    pub fn close(&self) {
        if !self.shared.is_open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.main.stop();
        self.shared.view.stop();
        self.shared.gate.stop();
        tracing::info!(icn = %self.icn(), "database closed");
    }
}

impl Shared {
    fn next_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::Relaxed))
    }

    fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.snapshot.read())
    }

    fn new_result<T: Send + Sync + 'static>(&self) -> DbResult<T> {
        DbResult::new(CancelToken::new(), Arc::clone(&self.gate))
    }

    fn submit<T: Send + Sync + 'static>(
        &self,
        queue: &JobQueue,
        priority: DbPriority,
        job: Box<dyn FnOnce() + Send>,
        result: &DbResult<T>,
    ) {
        if !self.is_open.load(Ordering::Acquire) || queue.submit(priority.rank(), job).is_err() {
            result.complete(Outcome::Failure(Arc::new(CoreError::DatabaseClosed)), None);
        }
    }

    fn failed<T>(&self, error: CoreError) -> Outcome<T> {
        if error.is_cancelled() {
            self.stats.record_cancellation();
            return Outcome::Cancelled;
        }
        self.stats.record_failure();
        if error.is_consistency() {
            tracing::error!(%error, "transaction aborted by consistency violation");
        } else {
            tracing::warn!(%error, "transaction failed");
        }
        Outcome::Failure(Arc::new(error))
    }

    fn run_read<T, F>(&self, handle: &DbResult<T>, f: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbReader<'_>) -> CoreResult<T>,
    {
        if handle.is_cancelled() {
            self.stats.record_cancellation();
            handle.complete(Outcome::Cancelled, None);
            return;
        }
        self.stats.record_read();
        let tx = Transaction::new(self.next_txid(), self.snapshot(), false, handle.cancel_token());
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| f(&tx.reader()))) {
            Ok(Ok(value)) => Outcome::Success(Arc::new(value)),
            Ok(Err(error)) => self.failed(error),
            Err(payload) => self.failed(panicked(payload.as_ref())),
        };
        handle.complete(outcome, None);
    }

    fn run_write<T, F>(self: &Arc<Self>, handle: &DbResult<T>, f: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(&DbWriter<'_>) -> CoreResult<T>,
    {
        if handle.is_cancelled() {
            self.stats.record_cancellation();
            handle.complete(Outcome::Cancelled, None);
            return;
        }
        self.stats.record_write();
        let tx = Transaction::new(self.next_txid(), self.snapshot(), true, handle.cancel_token());
        tracing::debug!(txn = %tx.id(), "write started");
        let body = panic::catch_unwind(AssertUnwindSafe(|| {
            let writer = tx.writer()?;
            let value = f(&writer)?;
            tx.check_cancelled()?;
            Ok(value)
        }));
        let value = match body {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => return handle.complete(self.failed(error), None),
            Err(payload) => return handle.complete(self.failed(panicked(payload.as_ref())), None),
        };

        match self.commit(tx) {
            Ok(None) => handle.complete(Outcome::Success(Arc::new(value)), None),
            Ok(Some(published)) => {
                let Published {
                    icn,
                    state,
                    diff,
                    post_commit,
                } = published;
                for PostCommit { gate, callback } in post_commit {
                    self.gate.execute(gate, Box::new(move || callback(icn)));
                }
                handle.complete(Outcome::Success(Arc::new(value)), Some(icn));
                self.notify(icn, state, diff);
            }
            Err(error) => handle.complete(self.failed(error), None),
        }
    }

    /// Journals and publishes a write. `None` if it changed nothing.
    fn commit(&self, tx: Transaction) -> CoreResult<Option<Published>> {
        if !tx.has_changes() {
            self.stats.record_empty_write();
            return Ok(None);
        }
        let txid = tx.id();
        let current = self.snapshot();
        let icn = current.icn.next();
        let committed = tx.into_committed(icn);
        if committed.diff.is_empty() && committed.state.next_item == current.next_item {
            self.stats.record_empty_write();
            return Ok(None);
        }

        if let Some(journal) = &self.journal {
            let record = CommitRecord::new(icn, committed.state.next_item, &committed.diff);
            journal.append(&record)?;
        }
        let state = Arc::new(committed.state);
        *self.snapshot.write() = Arc::clone(&state);
        self.stats.record_commit(committed.diff.changes.len());
        tracing::debug!(txn = %txid, %icn, items = committed.diff.changes.len(), "committed");

        Ok(Some(Published {
            icn,
            state,
            diff: committed.diff,
            post_commit: committed.post_commit,
        }))
    }

    /// Schedules listener and live-query notification for a commit.
    fn notify(self: &Arc<Self>, icn: Icn, state: Arc<StoreState>, diff: CommitDiff) {
        if diff.is_empty() {
            return;
        }
        let shared = Arc::clone(self);
        let job = Box::new(move || {
            let tx = Transaction::new(shared.next_txid(), state, false, CancelToken::new());
            shared.live.dispatch(&tx.reader(), icn, &diff);
        });
        if self.view.submit(DbPriority::FOREGROUND.rank(), job).is_err() {
            tracing::debug!(%icn, "notification dropped on shutdown");
        }
    }
}

fn panicked(payload: &(dyn Any + Send)) -> CoreError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    CoreError::Panicked { message }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("icn", &self.icn())
            .field("live_queries", &self.shared.live.query_count())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}
