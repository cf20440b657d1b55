//! Database statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let db = Database::open_in_memory()?;
//! db.write_foreground(|w| { w.next_item(); Ok(()) }).wait()?;
//!
//! let stats = db.stats();
//! println!("commits: {}", stats.commits);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler and commit counters.
///
/// All counters are atomic and can be read while transactions run.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    empty_writes: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
    items_changed: AtomicU64,
    notifications: AtomicU64,
}

impl DatabaseStats {
    /// Creates a zeroed stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, items_changed: usize) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.items_changed
            .fetch_add(items_changed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_write(&self) {
        self.empty_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            empty_writes: self.empty_writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            items_changed: self.items_changed.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Read transactions executed.
    pub reads: u64,
    /// Write transactions executed.
    pub writes: u64,
    /// Writes that committed changes.
    pub commits: u64,
    /// Writes that finished without changing anything.
    pub empty_writes: u64,
    /// Transactions that failed.
    pub failures: u64,
    /// Transactions that were cancelled.
    pub cancellations: u64,
    /// Item changes across all commits.
    pub items_changed: u64,
    /// Listener and live query deliveries.
    pub notifications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = DatabaseStats::new();
        stats.record_write();
        stats.record_commit(3);
        stats.record_commit(2);
        stats.record_cancellation();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.commits, 2);
        assert_eq!(snapshot.items_changed, 5);
        assert_eq!(snapshot.cancellations, 1);
        assert_eq!(snapshot.failures, 0);
    }
}
