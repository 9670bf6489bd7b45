//! Worker lifecycle states and per-worker counter snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one stage worker.
///
/// `Created -> Initialized -> Running -> {Finished | Stopped | Error}`;
/// the three terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Finished = 3,
    Stopped = 4,
    Error = 5,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Error)
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Finished,
            4 => Self::Stopped,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of one worker's counters, taken at result aggregation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    pub lines_read: u64,
    pub lines_written: u64,
    pub lines_updated: u64,
    pub lines_rejected: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!WorkerState::Created.is_terminal());
        assert!(!WorkerState::Running.is_terminal());
        assert!(WorkerState::Finished.is_terminal());
        assert!(WorkerState::Stopped.is_terminal());
        assert!(WorkerState::Error.is_terminal());
    }

    #[test]
    fn test_u8_roundtrip() {
        for state in [
            WorkerState::Created,
            WorkerState::Initialized,
            WorkerState::Running,
            WorkerState::Finished,
            WorkerState::Stopped,
            WorkerState::Error,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
    }
}
