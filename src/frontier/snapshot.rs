//! Point-in-time copy of the frontier, used for checkpoints

use crate::frontier::SortKey;
use crate::state::QueueState;
use crate::uri::CrawlUri;
use std::time::Duration;

/// Aggregate URI counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub discovered: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub disregarded: u64,
}

/// A queued (or in-flight) URI with its position in the queue
#[derive(Debug, Clone)]
pub struct PendingUri {
    pub key: SortKey,
    pub uri: CrawlUri,

    /// Held by a worker when the snapshot was taken; goes back to the queue
    /// head on restore
    pub in_flight: bool,
}

/// One queue's scheduling state and contents
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub class_key: String,
    pub state: QueueState,

    /// Time left until the queue wakes, relative to the snapshot
    pub wake_in: Option<Duration>,

    pub session_balance: u64,
    pub total_spent: u64,
    pub retired: bool,

    /// In queue order, in-flight URI first
    pub uris: Vec<PendingUri>,
}

/// Everything needed to resume a crawl
#[derive(Debug, Clone, Default)]
pub struct FrontierSnapshot {
    pub queues: Vec<QueueSnapshot>,
    pub seen: Vec<u64>,
    pub counters: CounterSnapshot,
}

impl FrontierSnapshot {
    /// Number of URIs across all queues, in-flight ones included
    pub fn uri_count(&self) -> usize {
        self.queues.iter().map(|q| q.uris.len()).sum()
    }
}
