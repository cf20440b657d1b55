//! Where result callbacks run.

use super::queue::Job;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Execution context for a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gate {
    /// Inline, on whichever thread completes the work (or registers the
    /// callback, if the work is already complete).
    #[default]
    Straight,
    /// On the database's dedicated callback thread, in submission order.
    Dedicated,
}

enum GateMsg {
    Run(Job),
    Stop,
}

/// The dedicated callback thread.
pub(crate) struct CallbackGate {
    sender: Mutex<Option<Sender<GateMsg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackGate {
    pub(crate) fn start(name: &str) -> CoreResult<Self> {
        let (sender, receiver) = mpsc::channel::<GateMsg>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok(GateMsg::Run(job)) = receiver.recv() {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                    tracing::error!("callback panicked");
                }
            }
        })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Runs `job` in the context `gate` names.
    ///
    /// Dedicated jobs run inline once the gate has stopped.
    pub(crate) fn execute(&self, gate: Gate, job: Job) {
        let job = match gate {
            Gate::Straight => job,
            Gate::Dedicated => match self.sender.lock().as_ref() {
                Some(sender) => match sender.send(GateMsg::Run(job)) {
                    Ok(()) => return,
                    Err(mpsc::SendError(GateMsg::Run(job))) => job,
                    Err(_) => return,
                },
                None => job,
            },
        };
        job();
    }

    /// Runs what is already queued, then joins the thread.
    pub(crate) fn stop(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(GateMsg::Stop);
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("callback gate panicked");
            }
        }
    }
}

impl Drop for CallbackGate {
    fn drop(&mut self) {
        self.stop();
    }
}
