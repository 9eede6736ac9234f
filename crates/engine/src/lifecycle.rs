//! Engine lifecycle states
//!
//! ```text
//! Uninitialized ─► Recovering ─► Ready ─► ShuttingDown ─► Stopped
//!                      │                        │
//!                      └──────► Failed ◄────────┘
//! ```
//!
//! Only `Ready` accepts operations. `Failed` and `Stopped` are terminal.

use std::fmt;

/// Lifecycle state of an [`IndexEngine`](crate::IndexEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Constructed, recovery not yet run
    Uninitialized,
    /// Loading the latest snapshot
    Recovering,
    /// Serving operations
    Ready,
    /// Draining operations and writing the final snapshot
    ShuttingDown,
    /// Shut down cleanly
    Stopped,
    /// Recovery or the final save failed; every operation is refused
    Failed,
}

impl EngineState {
    /// Lowercase name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Recovering => "recovering",
            EngineState::Ready => "ready",
            EngineState::ShuttingDown => "shutting_down",
            EngineState::Stopped => "stopped",
            EngineState::Failed => "failed",
        }
    }

    /// Only `Ready` accepts operations
    pub fn accepts_operations(&self) -> bool {
        matches!(self, EngineState::Ready)
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::Failed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
