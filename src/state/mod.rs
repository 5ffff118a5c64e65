//! State module for work queues
//!
//! - `QueueState`: the closed set of states a per-host work queue moves through

mod queue_state;

pub use queue_state::QueueState;
