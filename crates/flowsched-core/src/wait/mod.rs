//! # Wait Strategy
//!
//! Governs what a worker does when a full scan of its work units finds
//! nothing ready.
//!
//! ```text
//!              no work                 spin budget spent       yield budget spent
//!   ACTIVE ───────────────► POLLING ───────────────────► YIELDING ─────────────────► BLOCKED
//!     ▲   (SPIN, HYBRID)       │            (HYBRID)          │          (HYBRID)       │
//!     │                        │                              │                         │
//!     ├────── work found ──────┘                              │                         │
//!     ├────── work found ─────────────────────────────────────┘                         │
//!     └────── wake signal / recheck ────────────────────────────────────────────────────┘
//!
//!   ACTIVE ──── no work (CONDITION) ────► BLOCKED
//!   any state ── shutdown ──► SHUTDOWN (terminal)
//! ```
//!
//! The state machine is pure: [`WaitStrategy::on_idle`] returns an
//! [`IdleAction`] and the worker thread carries it out. This keeps the
//! transitions testable without threads.

mod signal;

pub use signal::WakeSignal;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::Error;

/// Idle behavior of a worker, selected per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaitMode {
    /// Block on a condition variable until a unit is signaled ready.
    ///
    /// Lowest CPU cost; wake-up latency of one condvar round trip.
    #[default]
    Condition,

    /// Spin for a while, then yield, then block.
    ///
    /// Short bursts of work see near-spin latency while long idle periods
    /// converge to sleep.
    Hybrid,

    /// Busy-wait without yielding or sleeping.
    ///
    /// Lowest latency, a full core per idle worker.
    Spin,
}

impl WaitMode {
    /// Returns the name used in structured pool descriptions.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WaitMode::Condition => "CONDITION",
            WaitMode::Hybrid => "HYBRID",
            WaitMode::Spin => "SPIN",
        }
    }
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONDITION" => Ok(WaitMode::Condition),
            "HYBRID" => Ok(WaitMode::Hybrid),
            "SPIN" => Ok(WaitMode::Spin),
            other => Err(Error::InvalidThreadPoolSpec(format!(
                "unknown yield mode '{other}' (expected CONDITION, HYBRID or SPIN)"
            ))),
        }
    }
}

/// Current state of a worker's wait strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WaitState {
    /// Executing, or about to scan for, ready work
    Active = 0,
    /// Re-scanning without sleeping
    Polling = 1,
    /// Giving up the time slice between scans (hybrid only)
    Yielding = 2,
    /// Suspended on the worker's wake signal
    Blocked = 3,
    /// Terminal: the worker is leaving its loop
    Shutdown = 4,
}

impl From<u8> for WaitState {
    fn from(value: u8) -> Self {
        match value {
            0 => WaitState::Active,
            1 => WaitState::Polling,
            2 => WaitState::Yielding,
            3 => WaitState::Blocked,
            _ => WaitState::Shutdown,
        }
    }
}

/// What the worker should do after a scan that found no ready unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Issue a spin-loop hint and scan again
    Spin,
    /// Yield the processor and scan again
    Yield,
    /// Wait on the wake signal
    Block,
    /// Leave the worker loop
    Exit,
}

/// Bounds for the hybrid escalation and for blocked waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBudget {
    /// Unsuccessful polls before a hybrid worker starts yielding
    pub spin_polls: u32,
    /// Yields before a hybrid worker blocks
    pub yield_rounds: u32,
    /// Upper bound on a single blocked wait before the worker rescans
    pub recheck_interval: Duration,
}

impl IdleBudget {
    /// Default spin budget for hybrid mode.
    pub const DEFAULT_SPIN_POLLS: u32 = 128;

    /// Default yield budget for hybrid mode.
    pub const DEFAULT_YIELD_ROUNDS: u32 = 16;

    /// Default blocked-wait bound: 10ms
    pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(10);
}

impl Default for IdleBudget {
    fn default() -> Self {
        Self {
            spin_polls: Self::DEFAULT_SPIN_POLLS,
            yield_rounds: Self::DEFAULT_YIELD_ROUNDS,
            recheck_interval: Self::DEFAULT_RECHECK_INTERVAL,
        }
    }
}

/// Per-worker idle state machine.
#[derive(Debug, Clone)]
pub struct WaitStrategy {
    mode: WaitMode,
    budget: IdleBudget,
    state: WaitState,
    /// Consecutive unsuccessful polls in the current idle stretch
    idle_polls: u32,
    /// Consecutive yields in the current idle stretch
    yields: u32,
}

impl WaitStrategy {
    /// Creates a strategy in the `Active` state.
    #[must_use]
    pub fn new(mode: WaitMode, budget: IdleBudget) -> Self {
        Self {
            mode,
            budget,
            state: WaitState::Active,
            idle_polls: 0,
            yields: 0,
        }
    }

    /// Returns the configured mode.
    #[must_use]
    pub fn mode(&self) -> WaitMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Returns the number of consecutive unsuccessful polls.
    #[must_use]
    pub fn idle_polls(&self) -> u32 {
        self.idle_polls
    }

    /// Records that a scan found and ran a ready unit.
    pub fn on_work_found(&mut self) {
        self.reset();
    }

    /// Records a scan that found nothing and returns the action to take.
    pub fn on_idle(&mut self) -> IdleAction {
        match (self.mode, self.state) {
            (_, WaitState::Shutdown) => IdleAction::Exit,
            (WaitMode::Spin, _) => {
                self.state = WaitState::Polling;
                self.idle_polls = self.idle_polls.saturating_add(1);
                IdleAction::Spin
            }
            (WaitMode::Condition, _) | (WaitMode::Hybrid, WaitState::Blocked) => {
                self.state = WaitState::Blocked;
                IdleAction::Block
            }
            (WaitMode::Hybrid, WaitState::Active | WaitState::Polling)
                if self.idle_polls < self.budget.spin_polls =>
            {
                self.state = WaitState::Polling;
                self.idle_polls += 1;
                IdleAction::Spin
            }
            (WaitMode::Hybrid, _) if self.yields < self.budget.yield_rounds => {
                self.state = WaitState::Yielding;
                self.yields += 1;
                IdleAction::Yield
            }
            (WaitMode::Hybrid, _) => {
                self.state = WaitState::Blocked;
                IdleAction::Block
            }
        }
    }

    /// Records the end of a blocked wait (signal or recheck timeout).
    pub fn on_wake(&mut self) {
        self.reset();
    }

    /// Enters the terminal `Shutdown` state.
    pub fn on_shutdown(&mut self) {
        self.state = WaitState::Shutdown;
    }

    fn reset(&mut self) {
        if self.state != WaitState::Shutdown {
            self.state = WaitState::Active;
            self.idle_polls = 0;
            self.yields = 0;
        }
    }
}
