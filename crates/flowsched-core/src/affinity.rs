//! # Affinity Planning
//!
//! Turns a pool's affinity mode and list into the concrete set of logical
//! CPUs its workers may run on.
//!
//! - `ALL` - unrestricted; the list is ignored and nothing is applied
//! - `CPU` - the listed CPU indices
//! - `NUMA` - the union of the CPUs of the listed nodes
//!
//! Every target is checked against the host topology, so an impossible
//! request fails when the pool is built rather than on a worker thread.

use std::io;

use crate::config::AffinityMode;
use crate::topology::NumaTopology;
use crate::{Error, Result};

/// A set of logical CPUs a worker is allowed to run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CpuSet {
    /// Sorted, deduplicated CPU indices (empty when unrestricted)
    cpus: Vec<usize>,
    restricted: bool,
}

impl CpuSet {
    /// The set of every CPU; applying it is a no-op.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// A set restricted to `cpus`.
    #[must_use]
    pub fn restricted(mut cpus: Vec<usize>) -> Self {
        cpus.sort_unstable();
        cpus.dedup();
        Self {
            cpus,
            restricted: true,
        }
    }

    /// Returns the CPU indices in ascending order.
    #[must_use]
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Returns the number of CPUs in a restricted set (0 when unrestricted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Returns true if a restricted set names no CPUs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Returns true unless this is the unrestricted set.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Returns true if a worker pinned to this set may run on `cpu`.
    #[must_use]
    pub fn contains(&self, cpu: usize) -> bool {
        !self.restricted || self.cpus.binary_search(&cpu).is_ok()
    }
}

/// Resolves an affinity request against the host topology.
///
/// # Errors
///
/// Returns [`Error::InvalidAffinityTarget`] for a CPU index beyond the host's
/// CPU count, or for a NUMA node that does not exist or has no CPUs.
pub fn plan_affinity(
    mode: AffinityMode,
    targets: &[usize],
    topology: &NumaTopology,
) -> Result<CpuSet> {
    match mode {
        AffinityMode::All => Ok(CpuSet::unrestricted()),
        AffinityMode::Cpu => {
            let available = topology.num_cpus();
            if let Some(&target) = targets.iter().find(|&&cpu| cpu >= available) {
                return Err(Error::InvalidAffinityTarget {
                    mode,
                    target,
                    available,
                });
            }
            Ok(CpuSet::restricted(targets.to_vec()))
        }
        AffinityMode::Numa => {
            let mut cpus = Vec::new();
            for &node in targets {
                let node_cpus = topology.cpus_for_node(node);
                if node_cpus.is_empty() {
                    return Err(Error::InvalidAffinityTarget {
                        mode,
                        target: node,
                        available: topology.num_nodes(),
                    });
                }
                cpus.extend_from_slice(node_cpus);
            }
            Ok(CpuSet::restricted(cpus))
        }
    }
}

/// Pins the calling thread to `set`.
///
/// An unrestricted set is not applied.
///
/// # Errors
///
/// Returns the OS error if the affinity call fails, or
/// [`io::ErrorKind::Unsupported`] on platforms without thread affinity.
pub fn apply_current_thread(set: &CpuSet) -> io::Result<()> {
    if !set.is_restricted() {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};
        use std::mem;

        let max_cpu = usize::try_from(CPU_SETSIZE).unwrap_or(1024);

        // SAFETY: cpu_set_t is plain data, zero-initialized and cleared with
        // CPU_ZERO. CPU_SET is only called with indices below CPU_SETSIZE.
        // Pid 0 refers to the calling thread.
        #[allow(unsafe_code)]
        unsafe {
            let mut mask: cpu_set_t = mem::zeroed();
            CPU_ZERO(&mut mask);
            for &cpu in set.cpus().iter().filter(|&&cpu| cpu < max_cpu) {
                CPU_SET(cpu, &mut mask);
            }

            if sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &mask) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(target_os = "windows")]
    {
        use winapi::shared::basetsd::DWORD_PTR;
        use winapi::um::processthreadsapi::GetCurrentThread;
        use winapi::um::winbase::SetThreadAffinityMask;

        let mask: DWORD_PTR = set
            .cpus()
            .iter()
            .filter(|&&cpu| cpu < DWORD_PTR::BITS as usize)
            .fold(0, |mask, &cpu| mask | (1 << cpu));

        // SAFETY: GetCurrentThread returns a pseudo-handle that doesn't need
        // to be closed. The mask only names CPUs that fit in the word.
        #[allow(unsafe_code)]
        unsafe {
            if SetThreadAffinityMask(GetCurrentThread(), mask) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread affinity is not supported on this platform",
        ))
    }
}
