//! Assignment arithmetic over per-worker loads.
//!
//! Pure functions on `loads[i]` = number of units on worker `i`, kept apart
//! from the container so the balancing rules are testable without threads.

/// Number of workers a pool should run for `units` registered units.
pub(crate) fn target_workers(num_threads: usize, units: usize) -> usize {
    if num_threads == 0 {
        units
    } else {
        num_threads.min(units)
    }
}

/// Where a newly registered unit goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Start a new worker for it
    Spawn,
    /// Append it to an existing worker
    Existing(usize),
}

/// Picks a worker for a new unit: a new worker while below `target`,
/// otherwise the least-loaded worker, lowest index first.
pub(crate) fn place_unit(loads: &[usize], target: usize) -> Placement {
    if loads.len() < target {
        return Placement::Spawn;
    }
    least_loaded(loads).map_or(Placement::Spawn, Placement::Existing)
}

/// Worker to retire when the pool runs more workers than its target: the
/// least-loaded one, highest index first.
pub(crate) fn retire_candidate(loads: &[usize]) -> Option<usize> {
    let min = *loads.iter().min()?;
    loads.iter().rposition(|&load| load == min)
}

/// Next move that narrows the load spread, as `(from, to)`, or `None` once
/// every pair of workers differs by at most one unit.
pub(crate) fn rebalance_move(loads: &[usize]) -> Option<(usize, usize)> {
    let to = least_loaded(loads)?;
    let max = *loads.iter().max()?;
    let from = loads.iter().rposition(|&load| load == max)?;
    (max - loads[to] > 1).then_some((from, to))
}

fn least_loaded(loads: &[usize]) -> Option<usize> {
    let min = *loads.iter().min()?;
    loads.iter().position(|&load| load == min)
}
