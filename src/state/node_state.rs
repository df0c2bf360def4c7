/// Node state definitions for tracking mirror progress
///
/// This module defines the lifecycle of a discovered URL within one job.
use std::fmt;

/// Represents the current state of a URL node in the job
///
/// Nodes move `Pending -> InFlight -> {Done, Skipped, Failed}`; a Pending
/// node may also go straight to Skipped when the job is stopped. Terminal
/// states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    // ===== Active States =====
    /// Admitted and waiting in the frontier queue
    Pending,

    /// Handed to a worker
    InFlight,

    // ===== Terminal States =====
    /// Fetched (or served from the cache) and stored
    Done,

    /// Deliberately not stored: policy, size or cancellation
    Skipped,

    /// Could not be retrieved
    Failed,
}

impl NodeState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Returns true if this is an active state (node may still be processed)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: NodeState) -> bool {
        match self {
            Self::Pending => matches!(next, Self::InFlight | Self::Skipped),
            Self::InFlight => next.is_terminal(),
            _ => false,
        }
    }

    /// Converts the node state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Parses a node state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states, in summary order
    pub fn terminal_states() -> [Self; 3] {
        [Self::Done, Self::Skipped, Self::Failed]
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!NodeState::Pending.is_terminal());
        assert!(!NodeState::InFlight.is_terminal());

        assert!(NodeState::Done.is_terminal());
        assert!(NodeState::Skipped.is_terminal());
        assert!(NodeState::Failed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(NodeState::Pending.can_transition_to(NodeState::InFlight));
        assert!(NodeState::Pending.can_transition_to(NodeState::Skipped));
        assert!(!NodeState::Pending.can_transition_to(NodeState::Done));

        assert!(NodeState::InFlight.can_transition_to(NodeState::Done));
        assert!(NodeState::InFlight.can_transition_to(NodeState::Failed));
        assert!(!NodeState::InFlight.can_transition_to(NodeState::Pending));

        for terminal in NodeState::terminal_states() {
            assert!(!terminal.can_transition_to(NodeState::Pending));
            assert!(!terminal.can_transition_to(NodeState::Done));
        }
    }

    #[test]
    fn test_db_string_roundtrip() {
        for state in [
            NodeState::Pending,
            NodeState::InFlight,
            NodeState::Done,
            NodeState::Skipped,
            NodeState::Failed,
        ] {
            assert_eq!(NodeState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(NodeState::from_db_string("invalid_state"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeState::InFlight.to_string(), "in_flight");
    }
}
