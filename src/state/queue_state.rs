//! Work queue state definitions
//!
//! Every queue is in exactly one of these states, and the registry keeps it in
//! exactly one index matching that state.
use std::fmt;

/// Scheduling state of a per-class-key work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
    /// Known class key, no URIs queued
    Empty,

    /// Holds URIs and may hand one out right now
    Ready,

    /// One URI is in flight with a worker
    Busy,

    /// Waiting out a politeness delay
    Snoozed,

    /// Suspended by an operator until thawed
    Frozen,

    /// Set aside (budget exhausted or operator request) until reactivated
    Inactive,

    /// Permanently dropped together with its contents
    Discarded,
}

impl QueueState {
    /// Returns true if `next` may take a URI from a queue in this state
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true for states an operator action put the queue in
    pub fn is_administrative(&self) -> bool {
        matches!(self, Self::Frozen | Self::Inactive | Self::Discarded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Discarded)
    }

    /// Checks whether moving from this state to `next` is a legal transition
    pub fn can_transition_to(&self, next: QueueState) -> bool {
        use QueueState::*;

        match (*self, next) {
            (Discarded, _) => false,
            (Empty, Ready) => true,
            (Ready, Busy) | (Ready, Empty) => true,
            (Busy, Snoozed) | (Busy, Ready) | (Busy, Empty) => true,
            // Pending operator actions land when the in-flight URI finishes
            (Busy, Frozen) | (Busy, Inactive) | (Busy, Discarded) => true,
            (Snoozed, Ready) | (Snoozed, Empty) => true,
            (Ready | Snoozed | Empty, Frozen | Inactive | Discarded) => true,
            (Frozen, Ready | Snoozed | Empty | Inactive | Discarded) => true,
            (Inactive, Ready | Snoozed | Empty | Frozen | Discarded) => true,
            _ => false,
        }
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Snoozed => "snoozed",
            Self::Frozen => "frozen",
            Self::Inactive => "inactive",
            Self::Discarded => "discarded",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "ready" => Some(Self::Ready),
            "busy" => Some(Self::Busy),
            "snoozed" => Some(Self::Snoozed),
            "frozen" => Some(Self::Frozen),
            "inactive" => Some(Self::Inactive),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }

    /// Returns all possible queue states
    pub fn all_states() -> [Self; 7] {
        [
            Self::Empty,
            Self::Ready,
            Self::Busy,
            Self::Snoozed,
            Self::Frozen,
            Self::Inactive,
            Self::Discarded,
        ]
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string().to_uppercase())
    }
}
