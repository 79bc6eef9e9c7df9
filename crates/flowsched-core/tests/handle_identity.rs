//! Handle identity and null-handle behavior.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{init_tracing, CountingUnit};
use flowsched_core::{Error, PoolContainer, Platform, ThreadPool, ThreadPoolSpec};

#[test]
fn test_same_spec_different_pools() {
    init_tracing();
    let spec = ThreadPoolSpec::with_threads(2);
    let first = ThreadPool::new(&spec).unwrap();
    let second = ThreadPool::new(&spec).unwrap();

    assert_ne!(first, second);
    assert_eq!(first, first.clone());
    assert_eq!(first.spec(), second.spec());
}

#[test]
fn test_null_equals_null() {
    assert_eq!(ThreadPool::null(), ThreadPool::default());
    assert_ne!(ThreadPool::null(), ThreadPool::new(&ThreadPoolSpec::default()).unwrap());
}

#[test]
fn test_null_rejects_registration() {
    let pool = ThreadPool::null();
    let result = pool.register(CountingUnit::new("a", true));
    assert!(matches!(result, Err(Error::NullPool)));
    assert_eq!(pool.num_units(), 0);
}

#[test]
fn test_adopted_container_is_same_pool() {
    init_tracing();
    let container = Arc::new(
        PoolContainer::new(ThreadPoolSpec::with_threads(1), Platform::detect()).unwrap(),
    );
    let a = ThreadPool::from_container(Arc::clone(&container));
    let b: ThreadPool = container.into();
    assert_eq!(a, b);

    let id = a.register(CountingUnit::new("a", false)).unwrap();
    assert_eq!(b.num_units(), 1);
    b.deregister(id).unwrap();
    assert_eq!(a.num_units(), 0);
}

#[test]
fn test_handles_as_map_keys() {
    let spec = ThreadPoolSpec::with_threads(1);
    let a = ThreadPool::new(&spec).unwrap();
    let b = ThreadPool::new(&spec).unwrap();

    let mut blocks: HashMap<ThreadPool, Vec<&str>> = HashMap::new();
    for (pool, block) in [(&a, "source"), (&b, "sink"), (&a, "filter")] {
        blocks.entry(pool.clone()).or_default().push(block);
    }
    assert_eq!(blocks[&a], vec!["source", "filter"]);
    assert_eq!(blocks[&b], vec!["sink"]);
}

#[test]
fn test_handles_cross_threads() {
    init_tracing();
    let pool = ThreadPool::new(&ThreadPoolSpec::with_threads(1)).unwrap();
    let clone = pool.clone();
    let id = std::thread::spawn(move || clone.register(CountingUnit::new("remote", false)))
        .join()
        .unwrap()
        .unwrap();
    assert!(pool.notifier(id).is_some());
}
