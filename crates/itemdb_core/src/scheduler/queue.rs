//! A prioritized single-worker job queue.

use crate::error::CoreResult;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    rank: i64,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher rank first, then lower sequence (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
    running: bool,
    stopping: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

/// Jobs run one at a time on a dedicated thread, highest rank first.
pub(crate) struct JobQueue {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl JobQueue {
    /// Spawns the worker thread.
    pub(crate) fn start(name: &str) -> CoreResult<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&worker_shared))?;
        tracing::debug!(queue = name, "queue started");
        Ok(Self {
            name: name.to_string(),
            shared,
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Enqueues `job`. Hands it back if the queue is stopping.
    pub(crate) fn submit(&self, rank: i64, job: Job) -> Result<(), Job> {
        let mut state = self.shared.state.lock();
        if state.stopping {
            return Err(job);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedJob { rank, seq, job });
        self.shared.available.notify_one();
        Ok(())
    }

    /// Returns true when called from this queue's worker.
    pub(crate) fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Blocks until every job submitted so far has finished.
    ///
    /// Returns immediately on the worker thread itself.
    pub(crate) fn flush(&self) {
        if self.is_worker_thread() {
            return;
        }
        let mut state = self.shared.state.lock();
        while !state.heap.is_empty() || state.running {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Number of jobs waiting to run.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// Stops accepting jobs, drains the queue and joins the worker.
    pub(crate) fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return;
            }
            state.stopping = true;
            self.shared.available.notify_all();
        }
        if self.is_worker_thread() {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!(queue = %self.name, "queue worker panicked");
            }
        }
        tracing::debug!(queue = %self.name, "queue stopped");
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(next) = state.heap.pop() {
                    state.running = true;
                    break next.job;
                }
                if state.stopping {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("job panicked outside its transaction");
        }
        let mut state = shared.state.lock();
        state.running = false;
        if state.heap.is_empty() {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn higher_rank_runs_first_then_fifo() {
        let queue = JobQueue::start("test-queue").unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (out_tx, out_rx) = mpsc::channel();

        // Hold the worker so the rest queue up.
        queue
            .submit(0, Box::new(move || gate_rx.recv().unwrap()))
            .ok()
            .unwrap();
        for (rank, label) in [(1, "low-a"), (5, "high"), (1, "low-b")] {
            let out = out_tx.clone();
            queue
                .submit(rank, Box::new(move || out.send(label).unwrap()))
                .ok()
                .unwrap();
        }
        gate_tx.send(()).unwrap();
        queue.flush();

        let order: Vec<&str> = out_rx.try_iter().collect();
        assert_eq!(order, vec!["high", "low-a", "low-b"]);
    }

    #[test]
    fn panics_do_not_stop_the_worker() {
        let queue = JobQueue::start("test-panic").unwrap();
        let (tx, rx) = mpsc::channel();
        queue.submit(0, Box::new(|| panic!("boom"))).ok().unwrap();
        queue.submit(0, Box::new(move || tx.send(1).unwrap())).ok().unwrap();
        queue.flush();
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn stop_drains_then_rejects() {
        let queue = JobQueue::start("test-stop").unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            queue.submit(0, Box::new(move || tx.send(i).unwrap())).ok().unwrap();
        }
        queue.stop();
        assert_eq!(rx.try_iter().count(), 10);
        assert!(queue.submit(0, Box::new(|| {})).is_err());
        assert_eq!(queue.pending(), 0);
    }
}
