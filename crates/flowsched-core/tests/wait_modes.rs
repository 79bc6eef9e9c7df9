//! Observable idle behavior of each wait mode.

mod common;

use std::time::Duration;

use common::{init_tracing, wait_until, CountingUnit};
use flowsched_core::{IdleBudget, ThreadPool, ThreadPoolSpec, WaitMode, WaitState};

const TIMEOUT: Duration = Duration::from_secs(10);

fn pool(mode: WaitMode) -> ThreadPool {
    let spec = ThreadPoolSpec::builder()
        .num_threads(1)
        .wait_mode(mode)
        .idle_budget(IdleBudget {
            spin_polls: 64,
            yield_rounds: 4,
            recheck_interval: Duration::from_millis(5),
        })
        .build()
        .unwrap();
    ThreadPool::new(&spec).unwrap()
}

#[test]
fn test_spin_never_blocks() {
    init_tracing();
    let pool = pool(WaitMode::Spin);
    let unit = CountingUnit::new("idle", false);
    pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || pool.workers()[0].stats.polling_entries > 0));
    std::thread::sleep(Duration::from_millis(50));

    let info = &pool.workers()[0];
    assert_eq!(info.wait_mode, WaitMode::Spin);
    assert_eq!(info.state, WaitState::Polling);
    assert_eq!(info.stats.blocked_entries, 0);
    assert_eq!(info.stats.yielding_entries, 0);
}

#[test]
fn test_condition_never_polls() {
    init_tracing();
    let pool = pool(WaitMode::Condition);
    let unit = CountingUnit::new("idle", false);
    let id = pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || pool.workers()[0].stats.blocked_entries > 2));
    unit.set_ready(true);
    pool.notify(id).unwrap();
    assert!(wait_until(TIMEOUT, || unit.iterations() > 0));
    unit.set_ready(false);
    std::thread::sleep(Duration::from_millis(20));

    let stats = pool.workers()[0].stats;
    assert_eq!(stats.polling_entries, 0);
    assert_eq!(stats.yielding_entries, 0);
}

#[test]
fn test_hybrid_escalates_to_blocked() {
    init_tracing();
    let pool = pool(WaitMode::Hybrid);
    let unit = CountingUnit::new("idle", false);
    let id = pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || {
        let stats = pool.workers()[0].stats;
        stats.polling_entries > 0 && stats.yielding_entries > 0 && stats.blocked_entries > 0
    }));

    // A notified unit is picked up promptly from the blocked state
    unit.set_ready(true);
    let notifier = pool.notifier(id).unwrap();
    notifier.notify();
    assert!(wait_until(TIMEOUT, || unit.iterations() > 0));
}

#[test]
fn test_condition_wakes_without_notify() {
    // The recheck interval bounds the cost of a missed signal
    init_tracing();
    let pool = pool(WaitMode::Condition);
    let unit = CountingUnit::new("quiet", false);
    pool.register(unit.clone()).unwrap();

    assert!(wait_until(TIMEOUT, || pool.workers()[0].stats.blocked_entries > 0));
    unit.set_ready(true);
    assert!(wait_until(TIMEOUT, || unit.iterations() > 0));
}
