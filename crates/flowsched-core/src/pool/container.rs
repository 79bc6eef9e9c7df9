//! Shared pool state behind every [`ThreadPool`](super::ThreadPool) handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use super::assign::{place_unit, rebalance_move, retire_candidate, target_workers, Placement};
use crate::affinity::plan_affinity;
use crate::config::ThreadPoolSpec;
use crate::platform::Platform;
use crate::priority::map_priority;
use crate::worker::{
    current_worker, UnitId, UnitSlot, WorkNotifier, WorkUnit, WorkerConfig, WorkerInfo,
    WorkerThread,
};
use crate::{Error, Result};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Workers of one pool and their assignments, guarded by the table lock.
#[derive(Default)]
struct AssignmentTable {
    workers: Vec<WorkerThread>,
    num_units: usize,
    next_unit_id: u64,
}

impl AssignmentTable {
    fn loads(&self) -> Vec<usize> {
        self.workers.iter().map(WorkerThread::load).collect()
    }

    fn worker_of(&self, slot: &UnitSlot) -> Option<usize> {
        let owner = slot.owner();
        self.workers.iter().position(|w| w.uid() == owner)
    }

    /// Retires surplus workers and evens out loads. Returns the retired
    /// workers, which the caller stops and joins after releasing the lock.
    fn rebalance(&mut self, num_threads: usize) -> Vec<WorkerThread> {
        let target = target_workers(num_threads, self.num_units);
        let mut retired = Vec::new();

        while self.workers.len() > target {
            let Some(index) = retire_candidate(&self.loads()) else {
                break;
            };
            let mut worker = self.workers.remove(index);
            let orphans = worker.take_all();
            for slot in orphans {
                let loads = self.loads();
                if let Placement::Existing(to) = place_unit(&loads, loads.len()) {
                    self.workers[to].push(slot);
                }
            }
            retired.push(worker);
        }

        while let Some((from, to)) = rebalance_move(&self.loads()) {
            let Some(slot) = self.workers[from].take_movable() else {
                break;
            };
            tracing::debug!(
                unit = %slot.id(),
                from = self.workers[from].uid(),
                to = self.workers[to].uid(),
                "moving work unit"
            );
            self.workers[to].push(slot);
        }

        retired
    }
}

/// Container for the workers of one pool.
///
/// Created from a validated [`ThreadPoolSpec`]; lives as long as the
/// longest-lived [`ThreadPool`](super::ThreadPool) handle and shuts the
/// workers down when dropped.
pub struct PoolContainer {
    id: u64,
    spec: ThreadPoolSpec,
    platform: Platform,
    worker_config: WorkerConfig,
    table: Mutex<AssignmentTable>,
    /// Registered units by id; written under the table lock, read without it
    units: RwLock<HashMap<UnitId, Arc<UnitSlot>>>,
    /// Workers stopped from their own thread, joined by a later shutdown
    deferred: Mutex<Vec<WorkerThread>>,
    shut_down: AtomicBool,
    shutdown_done: Mutex<bool>,
    shutdown_cond: Condvar,
}

impl PoolContainer {
    /// Creates a container for `spec` on `platform`.
    ///
    /// Affinity is planned here so an impossible CPU or NUMA target is
    /// reported when the pool is built. No threads are started until the
    /// first unit is registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] if the spec is invalid, or
    /// [`Error::InvalidAffinityTarget`] if the host lacks a requested target.
    pub fn new(spec: ThreadPoolSpec, platform: Platform) -> Result<Self> {
        spec.validate()?;
        let cpus = plan_affinity(spec.affinity_mode(), spec.affinity(), platform.topology())?;
        let priority = map_priority(spec.priority(), platform.priority_bounds());
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            pool = id,
            num_threads = spec.num_threads(),
            wait_mode = %spec.wait_mode(),
            affinity = %spec.affinity_mode(),
            "created thread pool"
        );

        let worker_config = WorkerConfig {
            pool_id: id,
            cpus,
            priority,
            wait_mode: spec.wait_mode(),
            budget: spec.idle_budget(),
        };

        Ok(Self {
            id,
            spec,
            platform,
            worker_config,
            table: Mutex::new(AssignmentTable::default()),
            units: RwLock::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            shutdown_done: Mutex::new(false),
            shutdown_cond: Condvar::new(),
        })
    }

    /// Returns the process-unique id of this pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the spec the pool was built from.
    #[must_use]
    pub fn spec(&self) -> &ThreadPoolSpec {
        &self.spec
    }

    /// Returns the platform the pool runs on.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Returns true once [`shutdown`](Self::shutdown) has started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Registers units, all or nothing.
    ///
    /// Existing assignments are left alone; new units extend the round-robin
    /// order, starting new workers while the pool is below its target size.
    /// Workers are started without holding the table lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolShutDown`] after shutdown, or
    /// [`Error::ThreadCreationFailure`] if a worker cannot be started. On
    /// failure every worker started by this call is stopped and joined and
    /// none of the units are registered.
    pub fn register_batch(&self, units: Vec<Arc<dyn WorkUnit>>) -> Result<Vec<UnitId>> {
        let mut fresh: Vec<WorkerThread> = Vec::new();
        loop {
            let mut table = self.table.lock();
            if self.is_shut_down() {
                drop(table);
                self.stop_and_join(fresh);
                return Err(Error::PoolShutDown);
            }

            let target = target_workers(self.spec.num_threads(), table.num_units + units.len());
            let needed = target.saturating_sub(table.workers.len());
            if needed <= fresh.len() {
                let unused = fresh.split_off(needed);
                let ids = self.assign_batch(&mut table, fresh, units);
                drop(table);
                self.stop_and_join(unused);
                return Ok(ids);
            }
            drop(table);

            while fresh.len() < needed {
                match WorkerThread::spawn(&self.worker_config, self.platform.thread_control()) {
                    Ok(worker) => fresh.push(worker),
                    Err(e) => {
                        tracing::warn!(pool = self.id, "registration rolled back: {e}");
                        self.stop_and_join(fresh);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Adds `fresh` workers and places every unit on the least-loaded worker.
    ///
    /// `fresh` holds exactly the workers the pool is short of, so each of
    /// them receives at least one unit.
    fn assign_batch(
        &self,
        table: &mut AssignmentTable,
        fresh: Vec<WorkerThread>,
        units: Vec<Arc<dyn WorkUnit>>,
    ) -> Vec<UnitId> {
        table.workers.extend(fresh);
        let mut directory = self.units.write();
        let mut added = Vec::with_capacity(units.len());

        for unit in units {
            table.next_unit_id += 1;
            let id = UnitId(table.next_unit_id);
            let slot = Arc::new(UnitSlot::new(id, unit));

            let loads = table.loads();
            let Placement::Existing(index) = place_unit(&loads, loads.len()) else {
                unreachable!("a non-empty batch always has a worker");
            };

            tracing::debug!(
                pool = self.id,
                unit = %id,
                name = slot.unit().name(),
                worker = table.workers[index].uid(),
                "registered work unit"
            );
            directory.insert(id, Arc::clone(&slot));
            table.num_units += 1;
            table.workers[index].push(slot);
            added.push(id);
        }
        added
    }

    /// Removes a unit and rebalances the remaining ones.
    ///
    /// Waits for an in-flight iteration of the unit to finish, unless called
    /// from inside that iteration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWorkUnit`] if `id` is not registered.
    pub fn deregister(&self, id: UnitId) -> Result<()> {
        let (slot, retired) = {
            let mut table = self.table.lock();
            let slot = self
                .units
                .write()
                .remove(&id)
                .ok_or(Error::UnknownWorkUnit(id))?;
            table.num_units -= 1;
            let index = table.worker_of(&slot);
            slot.detach();
            if let Some(index) = index {
                table.workers[index].remove(id);
            }
            let retired = if self.is_shut_down() {
                Vec::new()
            } else {
                table.rebalance(self.spec.num_threads())
            };
            (slot, retired)
        };

        slot.wait_idle(self.current_worker_id());
        tracing::debug!(
            pool = self.id,
            unit = %id,
            retired = retired.len(),
            "deregistered work unit"
        );
        self.stop_and_join(retired);
        Ok(())
    }

    /// Signals that a unit has become ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWorkUnit`] if `id` is not registered.
    pub fn notify(&self, id: UnitId) -> Result<()> {
        let units = self.units.read();
        let slot = units.get(&id).ok_or(Error::UnknownWorkUnit(id))?;
        slot.notify();
        Ok(())
    }

    /// Returns a producer-side notifier for a unit.
    #[must_use]
    pub fn notifier(&self, id: UnitId) -> Option<WorkNotifier> {
        self.units
            .read()
            .get(&id)
            .map(|slot| WorkNotifier::new(Arc::clone(slot)))
    }

    /// Returns the number of running workers.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.table.lock().workers.len()
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn num_units(&self) -> usize {
        self.units.read().len()
    }

    /// Describes every worker, in assignment order.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.table.lock().workers.iter().map(WorkerThread::info).collect()
    }

    /// Stops every worker and waits for them to exit.
    ///
    /// Idempotent. In-flight iterations finish; no new iteration starts.
    /// Called from one of this pool's workers, the calling worker is not
    /// joined and exits after its current iteration; the next call from
    /// outside the pool, or dropping the pool, joins it.
    pub fn shutdown(&self) {
        let outside = self.current_worker_id().is_none();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            if outside {
                let mut done = self.shutdown_done.lock();
                while !*done {
                    self.shutdown_cond.wait(&mut done);
                }
                drop(done);
                self.join_deferred();
            }
            return;
        }

        let workers = std::mem::take(&mut self.table.lock().workers);
        tracing::info!(pool = self.id, workers = workers.len(), "shutting down thread pool");
        self.stop_and_join(workers);

        *self.shutdown_done.lock() = true;
        self.shutdown_cond.notify_all();
    }

    /// Stops `workers` and joins all but the calling thread's own worker,
    /// which is kept for [`join_deferred`](Self::join_deferred).
    fn stop_and_join(&self, workers: Vec<WorkerThread>) {
        for worker in &workers {
            worker.request_stop();
        }
        let mut own = Vec::new();
        for mut worker in workers {
            if worker.is_current() {
                own.push(worker);
            } else {
                worker.join();
            }
        }
        if !own.is_empty() {
            self.deferred.lock().extend(own);
        }
    }

    fn join_deferred(&self) {
        let workers = std::mem::take(&mut *self.deferred.lock());
        if !workers.is_empty() {
            tracing::debug!(pool = self.id, workers = workers.len(), "joining self-stopped workers");
        }
        for mut worker in workers {
            worker.join();
        }
    }

    /// Worker id of the calling thread if it is one of this pool's workers.
    fn current_worker_id(&self) -> Option<u64> {
        current_worker()
            .filter(|&(pool, _)| pool == self.id)
            .map(|(_, worker)| worker)
    }
}

impl Drop for PoolContainer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PoolContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolContainer")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
