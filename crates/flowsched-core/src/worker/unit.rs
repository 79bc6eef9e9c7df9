//! Work units and their scheduling slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::wait::WakeSignal;

/// A unit of work supplied by the engine (one per block).
///
/// A worker calls [`is_ready`](Self::is_ready) while scanning and
/// [`work`](Self::work) for one iteration when it returns true. The two are
/// never called concurrently for the same unit.
pub trait WorkUnit: Send + Sync {
    /// Returns true if an iteration of [`work`](Self::work) can make progress.
    fn is_ready(&self) -> bool;

    /// Performs one iteration.
    fn work(&self);

    /// Returns a name for logs.
    fn name(&self) -> &str {
        "work-unit"
    }
}

/// Identifier of a registered work unit, unique within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) u64);

impl UnitId {
    /// Returns the raw id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// No worker owns the slot.
pub(crate) const DETACHED: u64 = 0;

/// Scheduling state of one registered unit.
///
/// `owner` says which worker may start iterations; `running_on` says which
/// worker is inside one. A worker starts an iteration only after winning
/// `running_on` and seeing itself as owner afterwards, so an iteration never
/// overlaps another on the same unit and never starts once the unit moved.
pub(crate) struct UnitSlot {
    id: UnitId,
    unit: Arc<dyn WorkUnit>,
    owner: AtomicU64,
    running_on: AtomicU64,
    signal: RwLock<Arc<WakeSignal>>,
    /// Threads parked in `wait_idle`
    idle_waiters: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cond: Condvar,
}

impl UnitSlot {
    pub(crate) fn new(id: UnitId, unit: Arc<dyn WorkUnit>) -> Self {
        Self {
            id,
            unit,
            owner: AtomicU64::new(DETACHED),
            running_on: AtomicU64::new(DETACHED),
            signal: RwLock::new(Arc::new(WakeSignal::new())),
            idle_waiters: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle_cond: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> UnitId {
        self.id
    }

    pub(crate) fn unit(&self) -> &dyn WorkUnit {
        &*self.unit
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner.load(Ordering::SeqCst)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running_on.load(Ordering::SeqCst) != DETACHED
    }

    /// Hands the slot to `worker` and wakes it.
    pub(crate) fn assign(&self, worker: u64, signal: &Arc<WakeSignal>) {
        *self.signal.write() = Arc::clone(signal);
        self.owner.store(worker, Ordering::SeqCst);
        signal.notify();
    }

    /// Stops new iterations from starting.
    pub(crate) fn detach(&self) {
        self.owner.store(DETACHED, Ordering::SeqCst);
    }

    /// Claims the slot for one iteration on `worker`.
    pub(crate) fn try_begin(&self, worker: u64) -> bool {
        if self.owner.load(Ordering::SeqCst) != worker {
            return false;
        }
        if self
            .running_on
            .compare_exchange(DETACHED, worker, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.owner.load(Ordering::SeqCst) != worker {
            self.finish();
            return false;
        }
        true
    }

    /// Releases the claim taken by [`try_begin`](Self::try_begin).
    pub(crate) fn finish(&self) {
        self.running_on.store(DETACHED, Ordering::SeqCst);
        if self.idle_waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.idle_lock.lock();
            self.idle_cond.notify_all();
        }
    }

    /// Wakes the owning worker.
    pub(crate) fn notify(&self) {
        self.signal.read().notify();
    }

    /// Waits until no iteration is in flight.
    ///
    /// Returns at once when called from inside the in-flight iteration.
    pub(crate) fn wait_idle(&self, current_worker: Option<u64>) {
        let idle = |running: u64| running == DETACHED || Some(running) == current_worker;
        if idle(self.running_on.load(Ordering::SeqCst)) {
            return;
        }

        // Registered before the re-check so `finish` cannot miss us
        self.idle_waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.idle_lock.lock();
        while !idle(self.running_on.load(Ordering::SeqCst)) {
            self.idle_cond.wait(&mut guard);
        }
        drop(guard);
        self.idle_waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for UnitSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitSlot")
            .field("id", &self.id)
            .field("name", &self.unit.name())
            .field("owner", &self.owner())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle a producer uses to signal that a unit became ready.
///
/// Holding a notifier does not keep the unit registered; notifying a
/// deregistered unit is a no-op.
#[derive(Debug, Clone)]
pub struct WorkNotifier {
    slot: Arc<UnitSlot>,
}

impl WorkNotifier {
    pub(crate) fn new(slot: Arc<UnitSlot>) -> Self {
        Self { slot }
    }

    /// Wakes the worker that currently owns the unit.
    pub fn notify(&self) {
        self.slot.notify();
    }

    /// Returns the unit's id.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.slot.id()
    }
}
