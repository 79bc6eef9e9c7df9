//! # Scheduler Error Types
//!
//! Spec errors are raised while building a [`ThreadPoolSpec`](crate::ThreadPoolSpec);
//! host-dependent errors are raised when a pool is instantiated.

use crate::config::AffinityMode;
use crate::worker::UnitId;

/// Errors that can occur while configuring or running a thread pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Out-of-range priority, unrecognized mode name, or malformed affinity list
    #[error("Invalid thread pool spec: {0}")]
    InvalidThreadPoolSpec(String),

    /// A CPU or NUMA node named in the affinity list does not exist on this host
    #[error("Invalid affinity target: {mode} {target} (host has {available})")]
    InvalidAffinityTarget {
        /// Affinity mode the target was interpreted under
        mode: AffinityMode,
        /// The requested CPU index or NUMA node id
        target: usize,
        /// Number of CPUs or NUMA nodes available on the host
        available: usize,
    },

    /// The OS refused to spawn a worker thread
    #[error("Failed to spawn worker {worker_id}: {message}")]
    ThreadCreationFailure {
        /// Id the worker would have had
        worker_id: u64,
        /// Error message
        message: String,
    },

    /// The pool has been shut down and accepts no more work
    #[error("Thread pool has been shut down")]
    PoolShutDown,

    /// The operation requires a non-null pool handle
    #[error("Operation on a null thread pool")]
    NullPool,

    /// The work unit is not registered with this pool
    #[error("Unknown work unit: {0}")]
    UnknownWorkUnit(UnitId),
}
