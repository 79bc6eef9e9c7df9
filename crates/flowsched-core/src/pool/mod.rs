//! # Thread Pool Handle
//!
//! [`ThreadPool`] is a cheap, cloneable handle to a [`PoolContainer`]. Two
//! handles are equal when they refer to the same container (or are both
//! null), which lets the engine tell whether two blocks share a pool.
//!
//! The container, and with it every worker thread, lives until the last
//! handle is dropped; the drop stops and joins the workers.

mod assign;
mod container;

pub use container::PoolContainer;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::ThreadPoolSpec;
use crate::platform::Platform;
use crate::worker::{UnitId, WorkNotifier, WorkUnit, WorkerInfo};
use crate::{Error, Result};

/// Shared handle to a pool of worker threads. May be null.
#[derive(Clone, Default)]
pub struct ThreadPool {
    container: Option<Arc<PoolContainer>>,
}

impl ThreadPool {
    /// Returns a null handle that refers to no pool.
    #[must_use]
    pub fn null() -> Self {
        Self::default()
    }

    /// Creates a pool for `spec` on the detected host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] or
    /// [`Error::InvalidAffinityTarget`] if the pool cannot be built here.
    pub fn new(spec: &ThreadPoolSpec) -> Result<Self> {
        Self::with_platform(spec, Platform::detect())
    }

    /// Creates a pool for `spec` on an explicit platform.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::new`].
    pub fn with_platform(spec: &ThreadPoolSpec, platform: Platform) -> Result<Self> {
        let container = PoolContainer::new(spec.clone(), platform)?;
        Ok(Self::from_container(Arc::new(container)))
    }

    /// Creates a pool and registers `units` with it.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::new`] and [`ThreadPool::register_all`].
    pub fn with_units<I>(spec: &ThreadPoolSpec, units: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn WorkUnit>>,
    {
        let pool = Self::new(spec)?;
        pool.register_all(units)?;
        Ok(pool)
    }

    /// Adopts an existing container without re-validating it.
    #[must_use]
    pub fn from_container(container: Arc<PoolContainer>) -> Self {
        Self {
            container: Some(container),
        }
    }

    /// Returns the underlying container, or `None` for a null handle.
    #[must_use]
    pub fn container(&self) -> Option<&Arc<PoolContainer>> {
        self.container.as_ref()
    }

    /// Returns true if this handle refers to a pool.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.container.is_some()
    }

    fn live(&self) -> Result<&PoolContainer> {
        self.container.as_deref().ok_or(Error::NullPool)
    }

    /// Registers one unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPool`], [`Error::PoolShutDown`] or
    /// [`Error::ThreadCreationFailure`].
    pub fn register(&self, unit: Arc<dyn WorkUnit>) -> Result<UnitId> {
        let ids = self.live()?.register_batch(vec![unit])?;
        ids.into_iter().next().ok_or(Error::PoolShutDown)
    }

    /// Registers several units, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`ThreadPool::register`]; on error no unit of the batch stays
    /// registered.
    pub fn register_all<I>(&self, units: I) -> Result<Vec<UnitId>>
    where
        I: IntoIterator<Item = Arc<dyn WorkUnit>>,
    {
        self.live()?.register_batch(units.into_iter().collect())
    }

    /// Removes a unit, waiting for its in-flight iteration to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPool`] or [`Error::UnknownWorkUnit`].
    pub fn deregister(&self, id: UnitId) -> Result<()> {
        self.live()?.deregister(id)
    }

    /// Signals that a unit has become ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullPool`] or [`Error::UnknownWorkUnit`].
    pub fn notify(&self, id: UnitId) -> Result<()> {
        self.live()?.notify(id)
    }

    /// Returns a cloneable notifier for a unit, for use by producers.
    #[must_use]
    pub fn notifier(&self, id: UnitId) -> Option<WorkNotifier> {
        self.container.as_ref()?.notifier(id)
    }

    /// Stops and joins every worker. A no-op on a null handle.
    pub fn shutdown(&self) {
        if let Some(container) = &self.container {
            container.shutdown();
        }
    }

    /// Returns the number of running workers (0 for a null handle).
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.container.as_deref().map_or(0, PoolContainer::num_workers)
    }

    /// Returns the number of registered units (0 for a null handle).
    #[must_use]
    pub fn num_units(&self) -> usize {
        self.container.as_deref().map_or(0, PoolContainer::num_units)
    }

    /// Describes every worker (empty for a null handle).
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.container
            .as_deref()
            .map_or_else(Vec::new, PoolContainer::workers)
    }

    /// Returns the spec of the pool, or `None` for a null handle.
    #[must_use]
    pub fn spec(&self) -> Option<&ThreadPoolSpec> {
        self.container.as_deref().map(PoolContainer::spec)
    }
}

impl PartialEq for ThreadPool {
    fn eq(&self, other: &Self) -> bool {
        match (&self.container, &other.container) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for ThreadPool {}

impl Hash for ThreadPool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.container
            .as_ref()
            .map(|c| Arc::as_ptr(c) as usize)
            .hash(state);
    }
}

impl From<Arc<PoolContainer>> for ThreadPool {
    fn from(container: Arc<PoolContainer>) -> Self {
        Self::from_container(container)
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => f
                .debug_struct("ThreadPool")
                .field("id", &container.id())
                .field("spec", container.spec())
                .finish(),
            None => f.write_str("ThreadPool(null)"),
        }
    }
}
