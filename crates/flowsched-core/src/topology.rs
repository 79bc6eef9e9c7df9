//! # NUMA Topology Detection
//!
//! Detects which logical CPUs belong to which NUMA node, using:
//! 1. sysfs parsing on Linux (`/sys/devices/system/node/`)
//! 2. Single-node fallback on other platforms, or when sysfs is unusable
//!
//! The affinity planner resolves `NUMA` affinity lists against this map, and
//! `CPU` lists against [`NumaTopology::num_cpus`].

use std::io;
use std::path::Path;

/// NUMA topology information for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaTopology {
    /// Number of NUMA nodes (highest node id + 1)
    num_nodes: usize,
    /// CPUs per node (index = node ID); sparse node ids leave empty entries
    cpus_per_node: Vec<Vec<usize>>,
    /// Total number of logical CPUs
    num_cpus: usize,
    /// CPU to NUMA node mapping
    cpu_to_node: Vec<usize>,
}

impl NumaTopology {
    /// Detect the host's NUMA topology.
    ///
    /// This method never fails - it falls back to a single-node topology
    /// if detection fails.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            match Self::from_sysfs_root(Path::new("/sys")) {
                Ok(topo) => return topo,
                Err(e) => {
                    tracing::debug!("NUMA sysfs detection failed ({e}), using single node");
                }
            }
        }

        Self::single_node_fallback()
    }

    /// Reads the topology from a sysfs tree rooted at `root` (normally `/sys`).
    ///
    /// # Errors
    ///
    /// Returns an error if the node directory is missing or lists no nodes.
    pub fn from_sysfs_root(root: &Path) -> io::Result<Self> {
        use std::fs;

        let node_path = root.join("devices/system/node");
        let mut node_ids: Vec<usize> = Vec::new();
        for entry in fs::read_dir(&node_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(id) = name_str.strip_prefix("node") {
                if let Ok(node_id) = id.parse::<usize>() {
                    node_ids.push(node_id);
                }
            }
        }

        if node_ids.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no NUMA nodes found in sysfs",
            ));
        }
        node_ids.sort_unstable();
        let num_nodes = node_ids.last().map_or(1, |m| m + 1);

        let mut cpus_per_node = vec![Vec::new(); num_nodes];
        for node_id in &node_ids {
            let cpulist_path = node_path.join(format!("node{node_id}")).join("cpulist");
            if let Ok(cpulist) = fs::read_to_string(&cpulist_path) {
                cpus_per_node[*node_id] = Self::parse_cpulist(cpulist.trim());
            }
        }

        let online = fs::read_to_string(root.join("devices/system/cpu/online"))
            .map(|s| Self::parse_cpulist(s.trim()))
            .unwrap_or_default();
        let highest_cpu = cpus_per_node
            .iter()
            .flatten()
            .chain(online.iter())
            .max()
            .copied();
        let num_cpus = highest_cpu.map_or_else(num_cpus::get, |max| max + 1);

        Ok(Self::build(num_nodes, cpus_per_node, num_cpus))
    }

    /// Creates a topology from explicit per-node CPU lists (index = node id).
    ///
    /// Used for synthetic hosts in tests and for embedding engines that
    /// already know their placement.
    #[must_use]
    pub fn from_nodes(cpus_per_node: Vec<Vec<usize>>) -> Self {
        let num_nodes = cpus_per_node.len().max(1);
        let mut cpus_per_node = cpus_per_node;
        cpus_per_node.resize(num_nodes, Vec::new());
        let num_cpus = cpus_per_node
            .iter()
            .flatten()
            .max()
            .map_or(0, |max| max + 1);
        Self::build(num_nodes, cpus_per_node, num_cpus)
    }

    /// Create a single-node fallback topology.
    #[must_use]
    pub fn single_node_fallback() -> Self {
        let num_cpus = num_cpus::get();
        Self::build(1, vec![(0..num_cpus).collect()], num_cpus)
    }

    fn build(num_nodes: usize, mut cpus_per_node: Vec<Vec<usize>>, num_cpus: usize) -> Self {
        let mut cpu_to_node = vec![0usize; num_cpus];
        for (node, cpus) in cpus_per_node.iter_mut().enumerate() {
            cpus.sort_unstable();
            cpus.dedup();
            for &cpu in cpus.iter() {
                if cpu < num_cpus {
                    cpu_to_node[cpu] = node;
                }
            }
        }
        Self {
            num_nodes,
            cpus_per_node,
            num_cpus,
            cpu_to_node,
        }
    }

    /// Parse a CPU list string like "0-7,16-23".
    fn parse_cpulist(s: &str) -> Vec<usize> {
        let mut cpus = Vec::new();

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<usize>() {
                cpus.push(cpu);
            }
        }

        cpus
    }

    /// Returns the number of NUMA nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Returns the total number of logical CPUs.
    #[must_use]
    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    /// Returns the CPUs belonging to a specific NUMA node.
    ///
    /// Returns an empty slice if the node ID is invalid.
    #[must_use]
    pub fn cpus_for_node(&self, node: usize) -> &[usize] {
        self.cpus_per_node.get(node).map_or(&[], Vec::as_slice)
    }

    /// Returns the NUMA node for a given CPU, or `None` for an unknown CPU.
    #[must_use]
    pub fn node_for_cpu(&self, cpu: usize) -> Option<usize> {
        self.cpu_to_node.get(cpu).copied()
    }

    /// Check if the host has multiple NUMA nodes.
    #[must_use]
    pub fn is_numa(&self) -> bool {
        self.num_nodes > 1
    }

    /// Log the detected topology for debugging.
    pub fn log_topology(&self) {
        tracing::info!("NUMA Topology: {} nodes, {} CPUs", self.num_nodes, self.num_cpus);
        for node in 0..self.num_nodes {
            let cpus = self.cpus_for_node(node);
            tracing::info!("  Node {}: {} CPUs ({:?})", node, cpus.len(), cpus);
        }
    }

    /// Get a summary string of the topology.
    #[must_use]
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut s = format!("NUMA: {} nodes, {} CPUs", self.num_nodes, self.num_cpus);
        for node in 0..self.num_nodes {
            let _ = write!(s, "\n  Node {}: {} CPUs", node, self.cpus_for_node(node).len());
        }
        s
    }
}
