//! Pools on a synthetic host whose OS calls can be recorded or refused.

mod common;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use common::{as_units, init_tracing, wait_until, CountingUnit};
use flowsched_core::{
    AffinityMode, CpuSet, Error, NativePriority, NumaTopology, Platform, PriorityBounds,
    SchedClass, ThreadControl, ThreadPool, ThreadPoolSpec,
};
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Records affinity/priority requests; refuses them and spawns on demand.
#[derive(Default)]
struct FakeControl {
    spawn_budget: Option<usize>,
    spawn_delay: Duration,
    spawned: AtomicUsize,
    refuse: bool,
    affinity_calls: Mutex<Vec<CpuSet>>,
    priority_calls: Mutex<Vec<NativePriority>>,
}

impl ThreadControl for FakeControl {
    fn spawn(&self, name: String, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        let n = self.spawned.fetch_add(1, Ordering::AcqRel);
        if self.spawn_budget.is_some_and(|budget| n >= budget) {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"));
        }
        std::thread::sleep(self.spawn_delay);
        std::thread::Builder::new().name(name).spawn(body)
    }

    fn set_affinity(&self, cpus: &CpuSet) -> io::Result<()> {
        self.affinity_calls.lock().push(cpus.clone());
        if self.refuse {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    fn set_priority(&self, priority: &NativePriority) -> io::Result<()> {
        self.priority_calls.lock().push(*priority);
        if self.refuse {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }
}

fn host() -> NumaTopology {
    NumaTopology::from_nodes(vec![vec![0, 1], vec![2, 3]])
}

fn platform(control: &Arc<FakeControl>) -> Platform {
    Platform::detect()
        .with_topology(host())
        .with_priority_bounds(PriorityBounds {
            realtime_min: 1,
            realtime_max: 99,
            background_min: 1,
            background_max: 19,
        })
        .with_thread_control(Arc::clone(control) as Arc<dyn ThreadControl>)
}

#[test]
fn test_spawn_failure_rolls_back_batch() {
    init_tracing();
    let control = Arc::new(FakeControl {
        spawn_budget: Some(3),
        ..Default::default()
    });
    let pool = ThreadPool::with_platform(&ThreadPoolSpec::default(), platform(&control)).unwrap();

    let first: Vec<_> = (0..2).map(|i| CountingUnit::new(&format!("a{i}"), true)).collect();
    let ids = pool.register_all(as_units(&first)).unwrap();
    assert_eq!(pool.num_workers(), 2);

    let second: Vec<_> = (0..3).map(|i| CountingUnit::new(&format!("b{i}"), true)).collect();
    let err = pool.register_all(as_units(&second)).unwrap_err();
    assert!(matches!(err, Error::ThreadCreationFailure { .. }), "{err}");

    // Only the first batch remains, on the workers it started with
    assert_eq!(pool.num_workers(), 2);
    assert_eq!(pool.num_units(), 2);
    let assigned: Vec<_> = pool.workers().into_iter().flat_map(|w| w.units).collect();
    assert_eq!(assigned, ids);

    // Units of the failed batch stop running
    let frozen: Vec<u64> = second.iter().map(|u| u.iterations()).collect();
    std::thread::sleep(Duration::from_millis(20));
    let after: Vec<u64> = second.iter().map(|u| u.iterations()).collect();
    assert_eq!(frozen, after);

    assert!(wait_until(TIMEOUT, || first.iter().all(|u| u.iterations() > 0)));
}

#[test]
fn test_refused_affinity_and_priority_degrade() {
    init_tracing();
    let control = Arc::new(FakeControl {
        refuse: true,
        ..Default::default()
    });
    let spec = ThreadPoolSpec::builder()
        .num_threads(1)
        .priority(0.5)
        .cpus(vec![1, 3])
        .build()
        .unwrap();
    let pool = ThreadPool::with_platform(&spec, platform(&control)).unwrap();
    let unit = CountingUnit::new("runs-anyway", true);
    pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || unit.iterations() > 0));
    assert_eq!(control.affinity_calls.lock()[0].cpus(), &[1, 3]);
    assert_eq!(
        control.priority_calls.lock()[0],
        NativePriority {
            class: SchedClass::RealTime,
            level: 50,
        }
    );

    let info = &pool.workers()[0];
    assert_eq!(info.cpus.cpus(), &[1, 3]);
    assert_eq!(info.priority.level, 50);
}

#[test]
fn test_numa_affinity_resolves_node_cpus() {
    init_tracing();
    let control = Arc::new(FakeControl::default());
    let spec = ThreadPoolSpec::builder()
        .num_threads(2)
        .numa_nodes(vec![1])
        .priority(-1.0)
        .build()
        .unwrap();
    let pool = ThreadPool::with_platform(&spec, platform(&control)).unwrap();
    let units: Vec<_> = (0..2).map(|i| CountingUnit::new(&format!("n{i}"), true)).collect();
    pool.register_all(as_units(&units)).unwrap();

    assert!(wait_until(TIMEOUT, || control.affinity_calls.lock().len() == 2));
    for cpus in control.affinity_calls.lock().iter() {
        assert_eq!(cpus.cpus(), &[2, 3]);
    }
    let priority = control.priority_calls.lock()[0];
    assert_eq!(priority.class, SchedClass::Background);
    assert_eq!(priority.level, 19);
}

#[test]
fn test_default_scheduling_skips_os_calls() {
    init_tracing();
    let control = Arc::new(FakeControl::default());
    let pool = ThreadPool::with_platform(&ThreadPoolSpec::with_threads(1), platform(&control)).unwrap();
    let unit = CountingUnit::new("plain", true);
    pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || unit.iterations() > 0));
    assert!(control.affinity_calls.lock().is_empty());
    assert!(control.priority_calls.lock().is_empty());
}

#[test]
fn test_invalid_affinity_target_at_construction() {
    init_tracing();
    let control = Arc::new(FakeControl::default());

    let spec = ThreadPoolSpec::builder().cpus(vec![0, 5]).build().unwrap();
    let err = ThreadPool::with_platform(&spec, platform(&control)).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAffinityTarget {
            mode: AffinityMode::Cpu,
            target: 5,
            available: 4,
        }
    ));

    let spec = ThreadPoolSpec::builder().numa_nodes(vec![2]).build().unwrap();
    let err = ThreadPool::with_platform(&spec, platform(&control)).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAffinityTarget {
            mode: AffinityMode::Numa,
            target: 2,
            ..
        }
    ));

    // Nothing was spawned for the rejected pools
    assert_eq!(control.spawned.load(Ordering::Acquire), 0);
}

#[test]
fn test_notify_not_blocked_by_worker_start() {
    init_tracing();
    let control = Arc::new(FakeControl {
        spawn_delay: Duration::from_millis(300),
        ..Default::default()
    });
    let pool = ThreadPool::with_platform(&ThreadPoolSpec::default(), platform(&control)).unwrap();
    let first = CountingUnit::new("first", false);
    let id = pool.register(first.clone()).unwrap();

    // Thread-per-block: the second unit needs a new worker
    let registering = {
        let pool = pool.clone();
        std::thread::spawn(move || pool.register(CountingUnit::new("second", false)))
    };
    assert!(wait_until(TIMEOUT, || control.spawned.load(Ordering::Acquire) == 2));

    let start = Instant::now();
    pool.notify(id).unwrap();
    assert!(pool.notifier(id).is_some());
    assert_eq!(pool.num_units(), 1);
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(100), "notify took {elapsed:?}");

    registering.join().unwrap().unwrap();
    assert_eq!(pool.num_units(), 2);
    assert_eq!(pool.num_workers(), 2);
}

#[test]
fn test_concurrent_registrations_share_started_workers() {
    init_tracing();
    let control = Arc::new(FakeControl {
        spawn_delay: Duration::from_millis(50),
        ..Default::default()
    });
    let spec = ThreadPoolSpec::with_threads(2);
    let pool = ThreadPool::with_platform(&spec, platform(&control)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pool = pool.clone();
            std::thread::spawn(move || pool.register(CountingUnit::new(&format!("c{i}"), true)))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Surplus workers started by racing calls were stopped again
    assert_eq!(pool.num_units(), 4);
    assert_eq!(pool.num_workers(), 2);
    let loads: Vec<usize> = pool.workers().iter().map(|w| w.units.len()).collect();
    assert_eq!(loads, vec![2, 2]);
}
