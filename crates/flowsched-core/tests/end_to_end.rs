//! A single spinning worker serving a mix of ready and idle units.

mod common;

use std::time::Duration;

use common::{as_units, init_tracing, wait_until, CountingUnit};
use flowsched_core::{AffinityMode, ThreadPool, ThreadPoolSpec, WaitMode};

#[test]
fn test_single_worker_runs_only_ready_unit() {
    init_tracing();
    let spec = ThreadPoolSpec::from_json(
        r#"{"numThreads": 1, "priority": 0.0, "affinityMode": "ALL", "yieldMode": "SPIN"}"#,
    )
    .unwrap();
    assert_eq!(spec.wait_mode(), WaitMode::Spin);
    assert_eq!(spec.affinity_mode(), AffinityMode::All);
    assert!(spec.priority().abs() < f64::EPSILON);

    let idle = CountingUnit::new("idle", false);
    let busy = CountingUnit::new("busy", true);
    let pool = ThreadPool::with_units(&spec, as_units(&[idle.clone(), busy.clone()])).unwrap();
    assert_eq!(pool.num_workers(), 1);

    assert!(wait_until(Duration::from_secs(10), || busy.iterations() >= 1_000));
    assert_eq!(idle.iterations(), 0);

    // Both ran on the same worker once the idle one becomes ready
    idle.set_ready(true);
    assert!(wait_until(Duration::from_secs(10), || idle.iterations() > 0));
    assert_eq!(idle.threads(), busy.threads());

    pool.shutdown();
    let frozen = (idle.iterations(), busy.iterations());
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!((idle.iterations(), busy.iterations()), frozen);
}

#[test]
fn test_round_robin_is_fair() {
    init_tracing();
    let spec = ThreadPoolSpec::builder()
        .num_threads(1)
        .wait_mode(WaitMode::Spin)
        .build()
        .unwrap();
    let units: Vec<_> = (0..3)
        .map(|i| CountingUnit::new(&format!("u{i}"), true))
        .collect();
    let pool = ThreadPool::with_units(&spec, as_units(&units)).unwrap();

    assert!(wait_until(Duration::from_secs(10), || units[2].iterations() >= 300));
    pool.shutdown();

    let counts: Vec<u64> = units.iter().map(|u| u.iterations()).collect();
    let (min, max) = (counts.iter().min().unwrap(), counts.iter().max().unwrap());
    assert!(max - min <= 1, "counts {counts:?}");
}
