//! Pluggable frontier policies
//!
//! - `QueueAssignmentPolicy`: which queue a URI belongs to
//! - `PrecedencePolicy`: how urgent a URI is within and across queues
//! - `PolitenessPolicy`: how long a queue rests after each fetch

mod assignment;
mod politeness;
mod precedence;

pub use assignment::{
    assignment_from_config, BucketAssignment, HostnameAssignment, IpAssignment,
    QueueAssignmentPolicy, DEFAULT_CLASS_KEY,
};
pub use politeness::{DelayParams, PolitenessPolicy};
pub use precedence::{
    precedence_from_config, BasePrecedence, HopsPrecedence, PrecedencePolicy,
    PreloadedPrecedence, URGENT_PRECEDENCE,
};
