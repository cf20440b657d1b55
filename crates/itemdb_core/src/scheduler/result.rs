//! Result handles for submitted transactions.

use super::gate::{CallbackGate, Gate};
use super::queue::Job;
use crate::error::{CoreError, CoreResult};
use crate::transaction::CancelToken;
use crate::types::Icn;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;

/// How a transaction ended.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Success(Arc<T>),
    Failure(Arc<CoreError>),
    Cancelled,
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Success(value) => Outcome::Success(Arc::clone(value)),
            Outcome::Failure(error) => Outcome::Failure(Arc::clone(error)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}

type SuccessFn<T> = Box<dyn FnOnce(&T) + Send>;
type FailureFn = Box<dyn FnOnce(&CoreError) + Send>;
type FinallyFn = Box<dyn FnOnce(bool) + Send>;

enum Callback<T> {
    Success(Gate, SuccessFn<T>),
    Failure(Gate, FailureFn),
    Finally(Gate, FinallyFn),
}

struct ResultState<T> {
    outcome: Option<Outcome<T>>,
    icn: Option<Icn>,
    callbacks: Vec<Callback<T>>,
}

struct ResultInner<T> {
    state: Mutex<ResultState<T>>,
    done: Condvar,
    cancel: CancelToken,
    gate: Arc<CallbackGate>,
}

/// Handle to a submitted read or write.
///
/// Clones refer to the same transaction. Callbacks registered after
/// completion run immediately in their gate.
///
/// ```rust,ignore
/// let result = db.write_foreground(|w| { /* ... */ Ok(()) });
/// result
///     .on_success(Gate::Dedicated, |_| println!("saved"))
///     .on_failure(Gate::Straight, |e| eprintln!("failed: {e}"));
/// let icn = result.wait().map(|_| result.commit_icn());
/// ```
pub struct DbResult<T> {
    inner: Arc<ResultInner<T>>,
}

impl<T> Clone for DbResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for DbResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let status = match state.outcome {
            None => "pending",
            Some(Outcome::Success(_)) => "success",
            Some(Outcome::Failure(_)) => "failure",
            Some(Outcome::Cancelled) => "cancelled",
        };
        f.debug_struct("DbResult")
            .field("status", &status)
            .field("icn", &state.icn)
            .finish()
    }
}

impl<T: Send + Sync + 'static> DbResult<T> {
    pub(crate) fn new(cancel: CancelToken, gate: Arc<CallbackGate>) -> Self {
        Self {
            inner: Arc::new(ResultInner {
                state: Mutex::new(ResultState {
                    outcome: None,
                    icn: None,
                    callbacks: Vec::new(),
                }),
                done: Condvar::new(),
                cancel,
                gate,
            }),
        }
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.inner.cancel.clone()
    }

    /// Records the outcome and runs pending callbacks. Later calls are
    /// ignored.
    pub(crate) fn complete(&self, outcome: Outcome<T>, icn: Option<Icn>) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome.clone());
            state.icn = icn;
            self.inner.done.notify_all();
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            self.dispatch(callback, &outcome);
        }
    }

    fn dispatch(&self, callback: Callback<T>, outcome: &Outcome<T>) {
        let (gate, job): (Gate, Job) = match (callback, outcome) {
            (Callback::Success(gate, f), Outcome::Success(value)) => {
                let value = Arc::clone(value);
                (gate, Box::new(move || f(&value)) as Job)
            }
            (Callback::Failure(gate, f), Outcome::Failure(error)) => {
                let error = Arc::clone(error);
                (gate, Box::new(move || f(&error)) as Job)
            }
            (Callback::Failure(gate, f), Outcome::Cancelled) => {
                (gate, Box::new(move || f(&CoreError::Cancelled)) as Job)
            }
            (Callback::Finally(gate, f), outcome) => {
                let success = matches!(outcome, Outcome::Success(_));
                (gate, Box::new(move || f(success)) as Job)
            }
            _ => return,
        };
        self.inner.gate.execute(gate, job);
    }

    fn register(&self, callback: Callback<T>) -> &Self {
        let outcome = {
            let mut state = self.inner.state.lock();
            let Some(outcome) = state.outcome.clone() else {
                state.callbacks.push(callback);
                return self;
            };
            outcome
        };
        self.dispatch(callback, &outcome);
        self
    }

    /// Runs `f` with the closure's return value after success.
    pub fn on_success(&self, gate: Gate, f: impl FnOnce(&T) + Send + 'static) -> &Self {
        self.register(Callback::Success(gate, Box::new(f)))
    }

    /// Runs `f` after failure or cancellation.
    pub fn on_failure(&self, gate: Gate, f: impl FnOnce(&CoreError) + Send + 'static) -> &Self {
        self.register(Callback::Failure(gate, Box::new(f)))
    }

    /// Runs `f` after any outcome; the flag tells whether it succeeded.
    pub fn finally(&self, gate: Gate, f: impl FnOnce(bool) + Send + 'static) -> &Self {
        self.register(Callback::Finally(gate, Box::new(f)))
    }

    /// Requests cancellation. A transaction that has not started will not
    /// run; a running one stops at its next cancellation check.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Returns true once cancellation was requested or the transaction
    /// ended cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || matches!(self.inner.state.lock().outcome, Some(Outcome::Cancelled))
    }

    /// Returns true once the transaction has ended.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// ICN of the commit, for writes that changed something.
    #[must_use]
    pub fn commit_icn(&self) -> Option<Icn> {
        self.inner.state.lock().icn
    }

    fn wait_outcome(&self) -> Outcome<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Blocks until the transaction ends.
    pub fn wait_for_completion(&self) {
        self.wait_outcome();
    }

    /// Blocks and returns a shared handle to the closure's return value.
    ///
    /// # Errors
    ///
    /// `Cancelled` after cancellation, `TransactionFailed` wrapping the
    /// fault after a failure.
    pub fn wait_shared(&self) -> CoreResult<Arc<T>> {
        match self.wait_outcome() {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(CoreError::transaction_failed(error)),
            Outcome::Cancelled => Err(CoreError::Cancelled),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DbResult<T> {
    /// Blocks and returns the closure's return value.
    ///
    /// # Errors
    ///
    /// See [`DbResult::wait_shared`].
    pub fn wait(&self) -> CoreResult<T> {
        self.wait_shared().map(|value| T::clone(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handle() -> DbResult<u32> {
        let gate = Arc::new(CallbackGate::start("test-result-gate").unwrap());
        DbResult::new(CancelToken::new(), gate)
    }

    #[test]
    fn callbacks_run_once_on_success() {
        let result = handle();
        let hits = Arc::new(AtomicUsize::new(0));
        let (h1, h2, h3) = (hits.clone(), hits.clone(), hits.clone());
        result
            .on_success(Gate::Straight, move |v| {
                assert_eq!(*v, 7);
                h1.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(Gate::Straight, move |_| {
                h2.fetch_add(100, Ordering::SeqCst);
            })
            .finally(Gate::Straight, move |ok| {
                assert!(ok);
                h3.fetch_add(10, Ordering::SeqCst);
            });

        result.complete(Outcome::Success(Arc::new(7)), Some(Icn::new(3)));
        result.complete(Outcome::Cancelled, None);

        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(result.wait().unwrap(), 7);
        assert_eq!(result.commit_icn(), Some(Icn::new(3)));
    }

    #[test]
    fn late_callbacks_run_immediately() {
        let result = handle();
        result.complete(Outcome::Failure(Arc::new(CoreError::ReadOnly)), None);
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        result.on_failure(Gate::Straight, move |e| {
            assert!(matches!(e, CoreError::ReadOnly));
            s.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.wait(),
            Err(CoreError::TransactionFailed { .. })
        ));
    }

    #[test]
    fn cancellation_reaches_failure_callbacks() {
        let result = handle();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        result.on_failure(Gate::Straight, move |e| {
            assert!(e.is_cancelled());
            s.fetch_add(1, Ordering::SeqCst);
        });
        result.cancel();
        assert!(result.is_cancelled());
        result.complete(Outcome::Cancelled, None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(matches!(result.wait(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn wait_blocks_until_completion() {
        let result = handle();
        let completer = result.clone();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            completer.complete(Outcome::Success(Arc::new(1)), None);
        });
        assert_eq!(result.wait().unwrap(), 1);
        worker.join().unwrap();
    }
}
