//! Transaction scheduling.
//!
//! Two single-worker queues run all transactions:
//!
//! - **main** runs every write and background reads, so writes never overlap;
//! - **view** runs foreground reads, so UI-facing reads are not stuck behind
//!   long writes.
//!
//! Within a queue foreground work outranks background work. Results are
//! reported through a [`DbResult`], whose callbacks run either inline
//! ([`Gate::Straight`]) or on a dedicated callback thread
//! ([`Gate::Dedicated`]).

mod gate;
mod priority;
mod queue;
mod result;

pub use gate::Gate;
pub use priority::{DbPriority, PriorityClass};
pub use result::DbResult;

pub(crate) use gate::CallbackGate;
pub(crate) use queue::JobQueue;
pub(crate) use result::Outcome;
