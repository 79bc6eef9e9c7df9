//! # Thread Pool Configuration
//!
//! [`ThreadPoolSpec`] is the immutable, validated description of a pool.
//! It can be built three ways:
//!
//! - [`ThreadPoolSpec::default()`] - every field at its documented default
//! - [`ThreadPoolSpec::with_threads`] - defaults plus an explicit thread count
//! - [`ThreadPoolSpec::from_json`] / [`ThreadPoolSpec::from_description`] -
//!   a structured description with all-optional keys
//!
//! ## Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `num_threads` | `0` (thread-per-block) |
//! | `priority` | `0.0` (default OS scheduling) |
//! | `affinity_mode` | `ALL` |
//! | `affinity` | empty |
//! | `wait_mode` | `CONDITION` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowsched_core::{ThreadPoolSpec, WaitMode};
//!
//! let spec = ThreadPoolSpec::builder()
//!     .num_threads(4)
//!     .priority(0.5)
//!     .cpus(vec![0, 2, 4, 6])
//!     .wait_mode(WaitMode::Spin)
//!     .build()?;
//! ```

mod description;

pub use description::ThreadPoolDescription;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::wait::{IdleBudget, WaitMode};
use crate::{Error, Result};

/// How the affinity list of a pool is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AffinityMode {
    /// Every logical CPU; the OS is free to place threads anywhere.
    #[default]
    All,
    /// The list names CPU indices.
    Cpu,
    /// The list names NUMA node ids; the CPU set is the union of their CPUs.
    Numa,
}

impl AffinityMode {
    /// Returns the name used in structured pool descriptions.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AffinityMode::All => "ALL",
            AffinityMode::Cpu => "CPU",
            AffinityMode::Numa => "NUMA",
        }
    }

    /// Returns true if this mode needs an affinity list.
    #[must_use]
    pub fn requires_list(self) -> bool {
        !matches!(self, AffinityMode::All)
    }
}

impl fmt::Display for AffinityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AffinityMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(AffinityMode::All),
            "CPU" => Ok(AffinityMode::Cpu),
            "NUMA" => Ok(AffinityMode::Numa),
            other => Err(Error::InvalidThreadPoolSpec(format!(
                "unknown affinity mode '{other}' (expected ALL, CPU or NUMA)"
            ))),
        }
    }
}

/// Immutable, validated thread pool configuration.
///
/// Fields are private; every constructor validates, so a `ThreadPoolSpec`
/// value always satisfies its invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadPoolSpec {
    /// 0 = thread-per-block, >0 = fixed pool size (clamped to unit count)
    num_threads: usize,
    /// Normalized priority in [-1.0, 1.0]
    priority: f64,
    /// Interpretation of `affinity`
    affinity_mode: AffinityMode,
    /// CPU indices or NUMA node ids
    affinity: Vec<usize>,
    /// Idle behavior of every worker
    wait_mode: WaitMode,
    /// Hybrid escalation and blocked-wait bounds
    idle_budget: IdleBudget,
}

impl Default for ThreadPoolSpec {
    fn default() -> Self {
        Self {
            num_threads: 0,
            priority: 0.0,
            affinity_mode: AffinityMode::All,
            affinity: Vec::new(),
            wait_mode: WaitMode::Condition,
            idle_budget: IdleBudget::default(),
        }
    }
}

impl ThreadPoolSpec {
    /// Creates a spec with defaults except for the thread count.
    #[must_use]
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Self::default()
        }
    }

    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ThreadPoolSpecBuilder {
        ThreadPoolSpecBuilder::default()
    }

    /// Builds a spec from a structured description.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] for unrecognized mode names,
    /// negative or duplicate affinity entries, or an out-of-range priority.
    pub fn from_description(description: &ThreadPoolDescription) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(num_threads) = description.num_threads {
            let num_threads = usize::try_from(num_threads).map_err(|_| {
                Error::InvalidThreadPoolSpec(format!("numThreads {num_threads} is too large"))
            })?;
            builder = builder.num_threads(num_threads);
        }
        if let Some(priority) = description.priority {
            builder = builder.priority(priority);
        }
        if let Some(mode) = &description.affinity_mode {
            builder = builder.affinity_mode(mode.parse()?);
        }
        if let Some(affinity) = &description.affinity {
            let targets = affinity
                .iter()
                .map(|&entry| {
                    usize::try_from(entry).map_err(|_| {
                        Error::InvalidThreadPoolSpec(format!(
                            "affinity entry {entry} must be a non-negative integer"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            builder = builder.affinity(targets);
        }
        if let Some(mode) = &description.yield_mode {
            builder = builder.wait_mode(mode.parse()?);
        }

        builder.build()
    }

    /// Parses a JSON description such as
    /// `{"numThreads": 2, "priority": 0.5, "affinityMode": "CPU", "affinity": [0, 2], "yieldMode": "SPIN"}`.
    ///
    /// Unrecognized keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] on malformed JSON, type
    /// mismatches, or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let description = ThreadPoolDescription::from_json(json)?;
        Self::from_description(&description)
    }

    /// Returns the structured description of this spec, with every field set.
    #[must_use]
    pub fn to_description(&self) -> ThreadPoolDescription {
        // usize -> u64/i64 is lossless for any real CPU or node index
        #[allow(clippy::cast_possible_wrap)]
        let affinity = self.affinity.iter().map(|&t| t as i64).collect();
        ThreadPoolDescription {
            num_threads: Some(self.num_threads as u64),
            priority: Some(self.priority),
            affinity_mode: Some(self.affinity_mode.as_str().to_string()),
            affinity: Some(affinity),
            yield_mode: Some(self.wait_mode.as_str().to_string()),
        }
    }

    /// Serializes this spec as a JSON description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        self.to_description().to_json()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] if an invariant does not hold.
    pub fn validate(&self) -> Result<()> {
        if !self.priority.is_finite() || !(-1.0..=1.0).contains(&self.priority) {
            return Err(Error::InvalidThreadPoolSpec(format!(
                "priority {} is outside [-1.0, 1.0]",
                self.priority
            )));
        }

        if self.affinity_mode.requires_list() {
            if self.affinity.is_empty() {
                return Err(Error::InvalidThreadPoolSpec(format!(
                    "affinity mode {} requires a non-empty affinity list",
                    self.affinity_mode
                )));
            }
            let mut seen = HashSet::with_capacity(self.affinity.len());
            for &target in &self.affinity {
                if !seen.insert(target) {
                    return Err(Error::InvalidThreadPoolSpec(format!(
                        "duplicate affinity entry {target}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Returns the configured thread count (0 = thread-per-block).
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Returns true if every unit gets a dedicated worker.
    #[must_use]
    pub fn is_thread_per_block(&self) -> bool {
        self.num_threads == 0
    }

    /// Returns the normalized priority.
    #[must_use]
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Returns the affinity mode.
    #[must_use]
    pub fn affinity_mode(&self) -> AffinityMode {
        self.affinity_mode
    }

    /// Returns the affinity list (CPU indices or NUMA node ids).
    #[must_use]
    pub fn affinity(&self) -> &[usize] {
        &self.affinity
    }

    /// Returns the wait mode.
    #[must_use]
    pub fn wait_mode(&self) -> WaitMode {
        self.wait_mode
    }

    /// Returns the idle budget.
    #[must_use]
    pub fn idle_budget(&self) -> IdleBudget {
        self.idle_budget
    }
}

/// Builder for `ThreadPoolSpec`.
#[derive(Debug, Default)]
pub struct ThreadPoolSpecBuilder {
    num_threads: Option<usize>,
    priority: Option<f64>,
    affinity_mode: Option<AffinityMode>,
    affinity: Option<Vec<usize>>,
    wait_mode: Option<WaitMode>,
    idle_budget: Option<IdleBudget>,
}

impl ThreadPoolSpecBuilder {
    /// Sets the thread count (0 = thread-per-block).
    #[must_use]
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Sets the normalized priority (-1.0 to 1.0).
    #[must_use]
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the affinity mode.
    #[must_use]
    pub fn affinity_mode(mut self, mode: AffinityMode) -> Self {
        self.affinity_mode = Some(mode);
        self
    }

    /// Sets the affinity list.
    #[must_use]
    pub fn affinity(mut self, targets: Vec<usize>) -> Self {
        self.affinity = Some(targets);
        self
    }

    /// Pins the pool to the given CPUs (convenience method).
    #[must_use]
    pub fn cpus(self, cpus: Vec<usize>) -> Self {
        self.affinity_mode(AffinityMode::Cpu).affinity(cpus)
    }

    /// Pins the pool to the CPUs of the given NUMA nodes (convenience method).
    #[must_use]
    pub fn numa_nodes(self, nodes: Vec<usize>) -> Self {
        self.affinity_mode(AffinityMode::Numa).affinity(nodes)
    }

    /// Sets the wait mode.
    #[must_use]
    pub fn wait_mode(mut self, mode: WaitMode) -> Self {
        self.wait_mode = Some(mode);
        self
    }

    /// Sets the idle budget.
    #[must_use]
    pub fn idle_budget(mut self, budget: IdleBudget) -> Self {
        self.idle_budget = Some(budget);
        self
    }

    /// Builds and validates the spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidThreadPoolSpec`] if the result is invalid.
    pub fn build(self) -> Result<ThreadPoolSpec> {
        let defaults = ThreadPoolSpec::default();
        let spec = ThreadPoolSpec {
            num_threads: self.num_threads.unwrap_or(defaults.num_threads),
            priority: self.priority.unwrap_or(defaults.priority),
            affinity_mode: self.affinity_mode.unwrap_or(defaults.affinity_mode),
            affinity: self.affinity.unwrap_or(defaults.affinity),
            wait_mode: self.wait_mode.unwrap_or(defaults.wait_mode),
            idle_budget: self.idle_budget.unwrap_or(defaults.idle_budget),
        };
        spec.validate()?;
        Ok(spec)
    }
}
