//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flowsched_core::WorkUnit;
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber once per test binary; `RUST_LOG` controls it.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A unit that counts its iterations and records the thread that ran them.
pub struct CountingUnit {
    name: String,
    ready: AtomicBool,
    iterations: AtomicU64,
    threads: Mutex<Vec<String>>,
    work_delay: Duration,
}

impl CountingUnit {
    pub fn new(name: &str, ready: bool) -> Arc<Self> {
        Self::with_delay(name, ready, Duration::ZERO)
    }

    pub fn with_delay(name: &str, ready: bool, work_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ready: AtomicBool::new(ready),
            iterations: AtomicU64::new(0),
            threads: Mutex::new(Vec::new()),
            work_delay,
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    /// Thread names seen, deduplicated in order of first appearance.
    pub fn threads(&self) -> Vec<String> {
        self.threads.lock().clone()
    }
}

impl WorkUnit for CountingUnit {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn work(&self) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        {
            let mut threads = self.threads.lock();
            if !threads.contains(&name) {
                threads.push(name);
            }
        }
        if !self.work_delay.is_zero() {
            thread::sleep(self.work_delay);
        }
        self.iterations.fetch_add(1, Ordering::AcqRel);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Upcasts for `register_all`.
pub fn as_units(units: &[Arc<CountingUnit>]) -> Vec<Arc<dyn WorkUnit>> {
    units
        .iter()
        .map(|unit| Arc::clone(unit) as Arc<dyn WorkUnit>)
        .collect()
}
