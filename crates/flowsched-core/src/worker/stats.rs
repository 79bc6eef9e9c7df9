//! Per-worker counters and the public worker description.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::affinity::CpuSet;
use crate::priority::NativePriority;
use crate::wait::{WaitMode, WaitState};
use crate::worker::UnitId;

/// Counters updated by a worker thread.
///
/// Only the owning worker writes; readers get a relaxed snapshot.
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    polling_entries: AtomicU64,
    yielding_entries: AtomicU64,
    blocked_entries: AtomicU64,
    wakeups: AtomicU64,
    panics: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts entry into an idle state.
    pub(crate) fn record_transition(&self, state: WaitState) {
        let counter = match state {
            WaitState::Polling => &self.polling_entries,
            WaitState::Yielding => &self.yielding_entries,
            WaitState::Blocked => &self.blocked_entries,
            WaitState::Active | WaitState::Shutdown => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            polling_entries: self.polling_entries.load(Ordering::Relaxed),
            yielding_entries: self.yielding_entries.load(Ordering::Relaxed),
            blocked_entries: self.blocked_entries.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    /// Work iterations executed
    pub iterations: u64,
    /// Times the worker entered `Polling`
    pub polling_entries: u64,
    /// Times the worker entered `Yielding`
    pub yielding_entries: u64,
    /// Times the worker entered `Blocked`
    pub blocked_entries: u64,
    /// Blocked waits ended by a notification rather than the recheck timeout
    pub wakeups: u64,
    /// Iterations that panicked
    pub panics: u64,
}

/// Description of one worker of a pool.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    /// Process-unique worker id
    pub worker_id: u64,
    /// OS thread name
    pub name: String,
    /// Assigned units in round-robin order
    pub units: Vec<UnitId>,
    /// CPU set the worker is pinned to
    pub cpus: CpuSet,
    /// Native priority requested for the worker
    pub priority: NativePriority,
    /// Idle behavior
    pub wait_mode: WaitMode,
    /// Current wait state
    pub state: WaitState,
    /// Counters at the time of the call
    pub stats: WorkerStatsSnapshot,
}
