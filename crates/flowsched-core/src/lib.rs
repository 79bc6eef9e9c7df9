//! # `flowsched` Core
//!
//! The thread-scheduling core of a streaming dataflow engine. It decides how
//! many OS threads execute a graph of blocks, how those threads are bound to
//! CPU/NUMA resources, which priority class they run under, and how an idle
//! thread waits for new work.
//!
//! This crate provides:
//! - **Config**: [`ThreadPoolSpec`], an immutable validated pool description
//! - **Priority**: mapping of a normalized priority onto native scheduling classes
//! - **Affinity**: planning of CPU sets from CPU or NUMA node lists
//! - **Wait**: the idle state machine (spin / hybrid / block-on-signal)
//! - **Worker**: OS threads polling their assigned work units round-robin
//! - **Pool**: the shared [`ThreadPool`] handle and its container
//!
//! ## Modes
//!
//! | `num_threads` | Behavior |
//! |---------------|----------|
//! | `0` | Thread-per-block: one dedicated worker per registered unit |
//! | `N > 0` | Pool: `min(N, units)` workers share the units round-robin |
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowsched_core::{ThreadPool, ThreadPoolSpec, WaitMode};
//!
//! let spec = ThreadPoolSpec::builder()
//!     .num_threads(2)
//!     .wait_mode(WaitMode::Hybrid)
//!     .build()?;
//! let pool = ThreadPool::new(&spec)?;
//!
//! let id = pool.register(block)?;
//! // Producer side: a block became ready
//! pool.notify(id)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)] // Allowed selectively at OS call sites
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod affinity;
pub mod config;
mod error;
pub mod placement;
pub mod platform;
pub mod pool;
pub mod priority;
pub mod topology;
pub mod wait;
pub mod worker;

pub use affinity::{plan_affinity, CpuSet};
pub use config::{AffinityMode, ThreadPoolDescription, ThreadPoolSpec, ThreadPoolSpecBuilder};
pub use error::Error;
pub use placement::{PoolGroup, PoolPlacement};
pub use platform::{OsThreadControl, Platform, ThreadControl};
pub use pool::{PoolContainer, ThreadPool};
pub use priority::{map_priority, NativePriority, PriorityBounds, SchedClass};
pub use topology::NumaTopology;
pub use wait::{IdleAction, IdleBudget, WaitMode, WaitState, WaitStrategy, WakeSignal};
pub use worker::{
    UnitId, WorkNotifier, WorkUnit, WorkerInfo, WorkerStats, WorkerStatsSnapshot,
};

/// Result type for flowsched-core operations
pub type Result<T> = std::result::Result<T, Error>;
