//! # Worker Threads
//!
//! A worker is one OS thread bound to a CPU set, a native priority and a
//! [`WaitStrategy`]. It polls its assigned units round-robin:
//!
//! 1. Scan units in order, starting after the last one that ran
//! 2. Run one iteration of the first ready unit
//! 3. If a full scan finds nothing ready, ask the wait strategy what to do
//!
//! The pool owns the assignment table; a worker only sees its own unit list,
//! republished whenever its assignment epoch changes.

mod stats;
mod unit;

pub use stats::{WorkerInfo, WorkerStats, WorkerStatsSnapshot};
pub use unit::{UnitId, WorkNotifier, WorkUnit};

pub(crate) use unit::UnitSlot;

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::affinity::CpuSet;
use crate::platform::ThreadControl;
use crate::priority::NativePriority;
use crate::wait::{IdleAction, IdleBudget, WaitMode, WaitState, WaitStrategy, WakeSignal};
use crate::{Error, Result};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// (pool id, worker id) of the worker running on this thread.
    static CURRENT_WORKER: Cell<Option<(u64, u64)>> = const { Cell::new(None) };
}

/// Returns the (pool id, worker id) of the calling thread, if it is a worker.
pub(crate) fn current_worker() -> Option<(u64, u64)> {
    CURRENT_WORKER.with(Cell::get)
}

/// Settings shared by every worker of a pool.
#[derive(Debug, Clone)]
pub(crate) struct WorkerConfig {
    pub(crate) pool_id: u64,
    pub(crate) cpus: CpuSet,
    pub(crate) priority: NativePriority,
    pub(crate) wait_mode: WaitMode,
    pub(crate) budget: IdleBudget,
}

/// State shared between a worker thread and the pool.
struct WorkerShared {
    uid: u64,
    name: String,
    stop: AtomicBool,
    started: AtomicBool,
    signal: Arc<WakeSignal>,
    /// Published unit list, replaced wholesale by the pool
    units: Mutex<Arc<[Arc<UnitSlot>]>>,
    /// Bumped after every publish
    epoch: AtomicU64,
    state: AtomicU8,
    stats: WorkerStats,
}

/// Pool-side handle of a worker thread.
pub(crate) struct WorkerThread {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
    config: WorkerConfig,
    /// Assigned units in round-robin order; mutated under the table lock
    assigned: Vec<Arc<UnitSlot>>,
}

impl WorkerThread {
    /// Spawns a worker with no units and waits until it is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadCreationFailure`] if the OS refuses the thread.
    pub(crate) fn spawn(config: &WorkerConfig, control: &Arc<dyn ThreadControl>) -> Result<Self> {
        let uid = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let empty: Arc<[Arc<UnitSlot>]> = Arc::from(Vec::new());
        let shared = Arc::new(WorkerShared {
            uid,
            name: format!("flowsched-w{uid}"),
            stop: AtomicBool::new(false),
            started: AtomicBool::new(false),
            signal: Arc::new(WakeSignal::new()),
            units: Mutex::new(empty),
            epoch: AtomicU64::new(0),
            state: AtomicU8::new(WaitState::Active as u8),
            stats: WorkerStats::default(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_control = Arc::clone(control);
        let thread_config = config.clone();
        let thread = control
            .spawn(
                shared.name.clone(),
                Box::new(move || worker_main(&thread_shared, &*thread_control, &thread_config)),
            )
            .map_err(|e| Error::ThreadCreationFailure {
                worker_id: uid,
                message: e.to_string(),
            })?;

        // Wait for thread to signal it's running
        while !shared.started.load(Ordering::Acquire) && !thread.is_finished() {
            thread::yield_now();
        }

        Ok(Self {
            shared,
            thread: Some(thread),
            config: config.clone(),
            assigned: Vec::new(),
        })
    }

    /// Returns the worker id.
    pub(crate) fn uid(&self) -> u64 {
        self.shared.uid
    }

    /// Returns the number of assigned units.
    pub(crate) fn load(&self) -> usize {
        self.assigned.len()
    }

    /// Appends `slot` to the round-robin order and hands it to this worker.
    pub(crate) fn push(&mut self, slot: Arc<UnitSlot>) {
        slot.assign(self.shared.uid, &self.shared.signal);
        self.assigned.push(slot);
        self.publish();
    }

    /// Removes the unit from this worker's list.
    pub(crate) fn remove(&mut self, id: UnitId) -> Option<Arc<UnitSlot>> {
        let index = self.assigned.iter().position(|slot| slot.id() == id)?;
        let slot = self.assigned.remove(index);
        self.publish();
        Some(slot)
    }

    /// Removes the unit best suited to move elsewhere: the last one not
    /// mid-iteration, or the last one if all are busy.
    pub(crate) fn take_movable(&mut self) -> Option<Arc<UnitSlot>> {
        let index = self
            .assigned
            .iter()
            .rposition(|slot| !slot.is_running())
            .or_else(|| self.assigned.len().checked_sub(1))?;
        let slot = self.assigned.remove(index);
        self.publish();
        Some(slot)
    }

    /// Removes every unit.
    pub(crate) fn take_all(&mut self) -> Vec<Arc<UnitSlot>> {
        let slots = std::mem::take(&mut self.assigned);
        self.publish();
        slots
    }

    fn publish(&self) {
        let snapshot: Arc<[Arc<UnitSlot>]> = self.assigned.iter().cloned().collect();
        *self.shared.units.lock() = snapshot;
        self.shared.epoch.fetch_add(1, Ordering::Release);
        self.shared.signal.notify();
    }

    /// Asks the thread to leave its loop after the current iteration.
    pub(crate) fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.signal.notify();
    }

    /// Returns true when called on this worker's own thread.
    pub(crate) fn is_current(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Waits for the thread to exit. A worker never joins itself.
    pub(crate) fn join(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!(worker = self.shared.uid, "worker thread panicked");
        }
    }

    /// Returns a description of this worker.
    pub(crate) fn info(&self) -> WorkerInfo {
        WorkerInfo {
            worker_id: self.shared.uid,
            name: self.shared.name.clone(),
            units: self.assigned.iter().map(|slot| slot.id()).collect(),
            cpus: self.config.cpus.clone(),
            priority: self.config.priority,
            wait_mode: self.config.wait_mode,
            state: WaitState::from(self.shared.state.load(Ordering::Acquire)),
            stats: self.shared.stats.snapshot(),
        }
    }
}

/// Main function for a worker thread.
fn worker_main(shared: &WorkerShared, control: &dyn ThreadControl, config: &WorkerConfig) {
    CURRENT_WORKER.with(|current| current.set(Some((config.pool_id, shared.uid))));

    if config.cpus.is_restricted() {
        if let Err(e) = control.set_affinity(&config.cpus) {
            tracing::warn!(
                worker = shared.uid,
                cpus = ?config.cpus.cpus(),
                "failed to set CPU affinity, running unpinned: {e}"
            );
        }
    }
    if !config.priority.is_normal() {
        if let Err(e) = control.set_priority(&config.priority) {
            tracing::warn!(
                worker = shared.uid,
                priority = ?config.priority,
                "failed to set thread priority, using default scheduling: {e}"
            );
        }
    }

    shared.started.store(true, Ordering::Release);
    tracing::debug!(worker = shared.uid, mode = %config.wait_mode, "worker started");

    let mut strategy = WaitStrategy::new(config.wait_mode, config.budget);
    let mut units: Arc<[Arc<UnitSlot>]> = Arc::from(Vec::new());
    let mut seen_epoch = u64::MAX;
    let mut cursor = 0usize;

    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        let epoch = shared.epoch.load(Ordering::Acquire);
        if epoch != seen_epoch {
            seen_epoch = epoch;
            units = Arc::clone(&shared.units.lock());
        }

        if run_next(shared, &units, &mut cursor) {
            strategy.on_work_found();
            publish_state(shared, &strategy);
            continue;
        }

        let action = strategy.on_idle();
        publish_state(shared, &strategy);
        match action {
            IdleAction::Spin => std::hint::spin_loop(),
            IdleAction::Yield => thread::yield_now(),
            IdleAction::Block => {
                if shared.signal.wait(&shared.stop, config.budget.recheck_interval) {
                    shared.stats.record_wakeup();
                }
                strategy.on_wake();
                publish_state(shared, &strategy);
            }
            IdleAction::Exit => break,
        }
    }

    strategy.on_shutdown();
    publish_state(shared, &strategy);
    tracing::debug!(worker = shared.uid, "worker stopped");
}

/// Runs one iteration of the next ready unit. Returns false after a full
/// scan without work.
fn run_next(shared: &WorkerShared, units: &[Arc<UnitSlot>], cursor: &mut usize) -> bool {
    let len = units.len();
    for offset in 0..len {
        let index = (*cursor + offset) % len;
        let slot = &units[index];
        if !slot.try_begin(shared.uid) {
            continue;
        }

        // Both calls run user code; the claim is released whatever happens
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let ready = slot.unit().is_ready();
            if ready {
                slot.unit().work();
            }
            ready
        }));
        slot.finish();
        match outcome {
            Ok(false) => continue,
            Ok(true) => shared.stats.record_iteration(),
            Err(_) => {
                shared.stats.record_panic();
                tracing::error!(
                    worker = shared.uid,
                    unit = %slot.id(),
                    name = slot.unit().name(),
                    "work unit panicked"
                );
            }
        }

        *cursor = (index + 1) % len;
        return true;
    }
    false
}

fn publish_state(shared: &WorkerShared, strategy: &WaitStrategy) {
    let state = strategy.state();
    let previous = shared.state.swap(state as u8, Ordering::AcqRel);
    if previous != state as u8 {
        shared.stats.record_transition(state);
    }
}
