//! # Pool Placement
//!
//! Decides which [`ThreadPool`] runs each block of a graph: a default pool
//! for the whole graph, plus optional per-block overrides.
//!
//! [`PoolPlacement::group`] buckets blocks by pool identity, so blocks that
//! ask for the same pool are registered with it together instead of each
//! getting a redundant pool.

use std::collections::HashMap;

use crate::pool::ThreadPool;

/// Blocks that resolved to the same pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGroup {
    /// The shared pool (possibly null when no default is set)
    pub pool: ThreadPool,
    /// Block names, in input order
    pub blocks: Vec<String>,
}

/// Default pool plus per-block overrides.
#[derive(Debug, Clone, Default)]
pub struct PoolPlacement {
    default_pool: ThreadPool,
    overrides: HashMap<String, ThreadPool>,
}

impl PoolPlacement {
    /// Creates a placement with a null default pool and no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pool used by blocks without an override.
    pub fn set_default_pool(&mut self, pool: ThreadPool) {
        self.default_pool = pool;
    }

    /// Returns the default pool.
    #[must_use]
    pub fn default_pool(&self) -> &ThreadPool {
        &self.default_pool
    }

    /// Pins `block` to `pool`. A null pool clears the override.
    pub fn set_block_pool(&mut self, block: impl Into<String>, pool: ThreadPool) {
        let block = block.into();
        if pool.is_valid() {
            self.overrides.insert(block, pool);
        } else {
            self.overrides.remove(&block);
        }
    }

    /// Removes the override of `block`, returning it.
    pub fn clear_block_pool(&mut self, block: &str) -> Option<ThreadPool> {
        self.overrides.remove(block)
    }

    /// Returns the pool that runs `block`.
    #[must_use]
    pub fn pool_for(&self, block: &str) -> &ThreadPool {
        self.overrides.get(block).unwrap_or(&self.default_pool)
    }

    /// Groups `blocks` by the pool that runs them, in order of each pool's
    /// first appearance.
    #[must_use]
    pub fn group<'a, I>(&self, blocks: I) -> Vec<PoolGroup>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut groups: Vec<PoolGroup> = Vec::new();
        let mut index: HashMap<ThreadPool, usize> = HashMap::new();

        for block in blocks {
            let pool = self.pool_for(block);
            let slot = *index.entry(pool.clone()).or_insert_with(|| {
                groups.push(PoolGroup {
                    pool: pool.clone(),
                    blocks: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].blocks.push(block.to_string());
        }

        groups
    }
}
