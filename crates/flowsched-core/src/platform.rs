//! # Platform Seam
//!
//! Everything a pool needs from the host, bundled so tests can substitute a
//! synthetic topology, fixed priority bounds, or a [`ThreadControl`] that
//! records or rejects OS calls.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::affinity::{self, CpuSet};
use crate::priority::{self, NativePriority, PriorityBounds};
use crate::topology::NumaTopology;

/// Thread-level OS operations used by workers.
///
/// `set_affinity` and `set_priority` are called on the worker thread itself,
/// before it runs any unit.
pub trait ThreadControl: Send + Sync {
    /// Spawns a named OS thread running `body`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    fn spawn(&self, name: String, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(body)
    }

    /// Pins the calling thread to `cpus`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the request is refused.
    fn set_affinity(&self, cpus: &CpuSet) -> io::Result<()>;

    /// Applies `priority` to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the request is refused.
    fn set_priority(&self, priority: &NativePriority) -> io::Result<()>;
}

/// [`ThreadControl`] backed by the real OS calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsThreadControl;

impl ThreadControl for OsThreadControl {
    fn set_affinity(&self, cpus: &CpuSet) -> io::Result<()> {
        affinity::apply_current_thread(cpus)
    }

    fn set_priority(&self, priority: &NativePriority) -> io::Result<()> {
        priority::apply_current_thread(priority)
    }
}

/// Host description and OS access for a pool.
#[derive(Clone)]
pub struct Platform {
    topology: NumaTopology,
    bounds: PriorityBounds,
    control: Arc<dyn ThreadControl>,
}

impl Platform {
    /// Detects the host topology and priority ranges and uses the real OS.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            topology: NumaTopology::detect(),
            bounds: PriorityBounds::detect(),
            control: Arc::new(OsThreadControl),
        }
    }

    /// Replaces the topology.
    #[must_use]
    pub fn with_topology(mut self, topology: NumaTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Replaces the priority ranges.
    #[must_use]
    pub fn with_priority_bounds(mut self, bounds: PriorityBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Replaces the OS thread operations.
    #[must_use]
    pub fn with_thread_control(mut self, control: Arc<dyn ThreadControl>) -> Self {
        self.control = control;
        self
    }

    /// Returns the host topology.
    #[must_use]
    pub fn topology(&self) -> &NumaTopology {
        &self.topology
    }

    /// Returns the priority ranges.
    #[must_use]
    pub fn priority_bounds(&self) -> &PriorityBounds {
        &self.bounds
    }

    /// Returns the OS thread operations.
    #[must_use]
    pub fn thread_control(&self) -> &Arc<dyn ThreadControl> {
        &self.control
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("topology", &self.topology)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}
