//! Target state machine
//!
//! PENDING → RUNNING → {SUCCEEDED | FAILED}
//! PENDING → SKIPPED (unmet dependency)

use serde::{Deserialize, Serialize};

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

/// Lifecycle of one build target within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// Not started yet
    Pending,
    /// Operations are executing
    Running,
    /// Every operation succeeded
    Succeeded,
    /// An operation failed; later operations were not run
    Failed,
    /// Not run because a dependency did not succeed
    Skipped,
}

impl TerminalState for TargetStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetStatus::Succeeded | TargetStatus::Failed | TargetStatus::Skipped
        )
    }
}

impl TargetStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: TargetStatus) -> bool {
        match (self, target) {
            (TargetStatus::Pending, TargetStatus::Running) => true,
            (TargetStatus::Pending, TargetStatus::Skipped) => true,

            (TargetStatus::Running, TargetStatus::Succeeded) => true,
            (TargetStatus::Running, TargetStatus::Failed) => true,

            _ => false,
        }
    }

    pub fn is_final(&self) -> bool {
        self.is_terminal()
    }

    /// Whether this status makes the run as a whole fail
    pub fn fails_run(&self) -> bool {
        matches!(self, TargetStatus::Failed | TargetStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Running => "running",
            TargetStatus::Succeeded => "succeeded",
            TargetStatus::Failed => "failed",
            TargetStatus::Skipped => "skipped",
        }
    }
}

/// Errors for target state operations
#[derive(Debug, thiserror::Error)]
pub enum TargetStatusError {
    #[error("Invalid state transition for {target}: {from:?} to {to:?}")]
    InvalidTransition {
        target: String,
        from: TargetStatus,
        to: TargetStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(TargetStatus::Pending.can_transition_to(TargetStatus::Running));
        assert!(TargetStatus::Pending.can_transition_to(TargetStatus::Skipped));
        assert!(TargetStatus::Running.can_transition_to(TargetStatus::Succeeded));
        assert!(TargetStatus::Running.can_transition_to(TargetStatus::Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!TargetStatus::Pending.can_transition_to(TargetStatus::Succeeded));
        assert!(!TargetStatus::Running.can_transition_to(TargetStatus::Skipped));
        assert!(!TargetStatus::Failed.can_transition_to(TargetStatus::Running));
        assert!(!TargetStatus::Succeeded.can_transition_to(TargetStatus::Failed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TargetStatus::Pending.is_terminal());
        assert!(!TargetStatus::Running.is_terminal());
        assert!(TargetStatus::Succeeded.is_terminal());
        assert!(TargetStatus::Failed.is_terminal());
        assert!(TargetStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_fails_run() {
        assert!(TargetStatus::Failed.fails_run());
        assert!(TargetStatus::Skipped.fails_run());
        assert!(!TargetStatus::Succeeded.fails_run());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&TargetStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }
}
