//! Per-class-key work queue
//!
//! URIs are kept in `(precedence, ordinal)` order. The most urgent part of
//! the queue lives in memory; once the memory segment grows past its limit,
//! the least urgent half is written to the spill store and read back as the
//! memory segment drains.

use crate::state::QueueState;
use crate::storage::SpillStore;
use crate::uri::CrawlUri;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Position of a URI inside its queue
///
/// Lower precedence sorts first; the ordinal keeps equal precedences FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub precedence: i32,
    pub ordinal: i64,
}

impl SortKey {
    pub fn new(precedence: i32, ordinal: i64) -> Self {
        Self {
            precedence,
            ordinal,
        }
    }
}

/// Registry index a queue is currently filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexSlot {
    Ready(i32),
    Snoozed(Instant),
    Inactive(bool, i32),
    Busy,
    Frozen,
    Empty(u64),
    Discarded,
}

/// Queue of URIs sharing one class key
#[derive(Debug)]
pub struct WorkQueue {
    class_key: String,

    /// Creation order; breaks precedence ties between queues
    pub(crate) id: u64,

    pub(crate) state: QueueState,

    /// When a snoozed queue may be offered again
    pub(crate) wake_time: Option<Instant>,

    memory: BTreeMap<SortKey, CrawlUri>,

    /// Entries held by the spill store; all sort after `memory`
    disk_len: usize,

    in_memory_limit: usize,

    /// The URI a worker currently holds
    pub(crate) in_flight: Option<(SortKey, CrawlUri)>,

    /// Operator action waiting for the in-flight URI to finish
    pub(crate) pending_admin: Option<QueueState>,

    /// URIs this queue may still emit before being set aside
    pub(crate) session_balance: u64,

    /// URIs emitted over the queue's lifetime
    pub(crate) total_spent: u64,

    /// Set aside for good; only an explicit reactivate brings it back
    pub(crate) retired: bool,

    pub(crate) slot: Option<IndexSlot>,
}

impl WorkQueue {
    pub(crate) fn new(class_key: String, id: u64, in_memory_limit: usize, session_balance: u64) -> Self {
        Self {
            class_key,
            id,
            state: QueueState::Empty,
            wake_time: None,
            memory: BTreeMap::new(),
            disk_len: 0,
            in_memory_limit: in_memory_limit.max(2),
            in_flight: None,
            pending_admin: None,
            session_balance,
            total_spent: 0,
            retired: false,
            slot: None,
        }
    }

    pub fn class_key(&self) -> &str {
        &self.class_key
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Number of queued URIs, not counting the one in flight
    pub fn len(&self) -> usize {
        self.memory.len() + self.disk_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn spilled_len(&self) -> usize {
        self.disk_len
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn retired(&self) -> bool {
        self.retired
    }

    pub fn session_balance(&self) -> u64 {
        self.session_balance
    }

    pub fn total_spent(&self) -> u64 {
        self.total_spent
    }

    pub fn head_key(&self) -> Option<SortKey> {
        self.memory.keys().next().copied()
    }

    pub fn head(&self) -> Option<&CrawlUri> {
        self.memory.values().next()
    }

    /// Precedence of the most urgent queued URI
    pub fn head_precedence(&self) -> Option<i32> {
        self.head_key().map(|key| key.precedence)
    }

    pub(crate) fn insert(&mut self, key: SortKey, uri: CrawlUri, spill: &mut dyn SpillStore) {
        if self.memory.is_empty() && self.disk_len > 0 {
            self.refill(spill);
        }

        let goes_to_disk = self.disk_len > 0
            && self
                .memory
                .keys()
                .next_back()
                .map_or(false, |last| key > *last);

        if goes_to_disk {
            match spill.append(&self.class_key, &[(key, uri.clone())]) {
                Ok(()) => {
                    self.disk_len += 1;
                    return;
                }
                Err(e) => {
                    // Holding it in memory breaks the segment ordering, so pull
                    // everything back instead
                    warn!(queue = %self.class_key, error = %e, "Spill append failed; keeping URI in memory");
                    self.memory.insert(key, uri);
                    self.unspill_all(spill);
                    return;
                }
            }
        }

        self.memory.insert(key, uri);
        if self.memory.len() > self.in_memory_limit {
            self.spill(spill);
        }
    }

    /// Removes and returns the most urgent URI
    pub(crate) fn pop(&mut self, spill: &mut dyn SpillStore) -> Option<(SortKey, CrawlUri)> {
        if self.memory.is_empty() && self.disk_len > 0 {
            self.refill(spill);
        }
        let entry = self.memory.pop_first();
        if self.memory.is_empty() && self.disk_len > 0 {
            self.refill(spill);
        }
        entry
    }

    /// All queued URIs in order, leaving the queue untouched
    pub(crate) fn pending(&self, spill: &dyn SpillStore) -> Vec<(SortKey, CrawlUri)> {
        let mut entries: Vec<(SortKey, CrawlUri)> = self
            .memory
            .iter()
            .map(|(key, uri)| (*key, uri.clone()))
            .collect();

        if self.disk_len > 0 {
            match spill.load_all(&self.class_key) {
                Ok(spilled) => entries.extend(spilled),
                Err(e) => {
                    error!(queue = %self.class_key, error = %e, "Failed to read spilled URIs")
                }
            }
        }
        entries
    }

    /// Drops every queued URI; returns how many were dropped
    pub(crate) fn clear(&mut self, spill: &mut dyn SpillStore) -> usize {
        let dropped = self.len();
        self.memory.clear();
        if self.disk_len > 0 {
            if let Err(e) = spill.clear(&self.class_key) {
                warn!(queue = %self.class_key, error = %e, "Failed to clear spilled URIs");
            }
            self.disk_len = 0;
        }
        dropped
    }

    /// Drops queued URIs for which `predicate` returns false
    pub(crate) fn retain(
        &mut self,
        spill: &mut dyn SpillStore,
        mut predicate: impl FnMut(&CrawlUri) -> bool,
    ) -> usize {
        let before = self.memory.len();
        self.memory.retain(|_, uri| predicate(uri));
        let mut removed = before - self.memory.len();

        if self.disk_len > 0 {
            match spill.load_all(&self.class_key) {
                Ok(spilled) => {
                    let doomed: Vec<SortKey> = spilled
                        .iter()
                        .filter(|(_, uri)| !predicate(uri))
                        .map(|(key, _)| *key)
                        .collect();
                    match spill.remove(&self.class_key, &doomed) {
                        Ok(count) => {
                            self.disk_len -= count.min(self.disk_len);
                            removed += count;
                        }
                        Err(e) => {
                            warn!(queue = %self.class_key, error = %e, "Failed to delete spilled URIs")
                        }
                    }
                }
                Err(e) => warn!(queue = %self.class_key, error = %e, "Failed to read spilled URIs"),
            }
        }

        if self.memory.is_empty() && self.disk_len > 0 {
            self.refill(spill);
        }
        removed
    }

    fn spill(&mut self, spill: &mut dyn SpillStore) {
        let keep = self.in_memory_limit / 2;
        let mut moved = Vec::with_capacity(self.memory.len() - keep);
        while self.memory.len() > keep {
            match self.memory.pop_last() {
                Some(entry) => moved.push(entry),
                None => break,
            }
        }
        moved.reverse();

        match spill.append(&self.class_key, &moved) {
            Ok(()) => {
                self.disk_len += moved.len();
                debug!(queue = %self.class_key, spilled = moved.len(), on_disk = self.disk_len, "Spilled queue tail");
            }
            Err(e) => {
                warn!(queue = %self.class_key, error = %e, "Spill failed; keeping URIs in memory");
                self.memory.extend(moved);
            }
        }
    }

    fn refill(&mut self, spill: &mut dyn SpillStore) {
        let batch = (self.in_memory_limit / 2).max(1);
        match spill.take_front(&self.class_key, batch) {
            Ok(entries) => {
                self.disk_len -= entries.len().min(self.disk_len);
                if entries.is_empty() {
                    self.disk_len = 0;
                }
                debug!(queue = %self.class_key, loaded = entries.len(), on_disk = self.disk_len, "Refilled queue head");
                self.memory.extend(entries);
            }
            Err(e) => {
                error!(queue = %self.class_key, lost = self.disk_len, error = %e, "Failed to read spilled URIs");
                self.disk_len = 0;
            }
        }
    }

    fn unspill_all(&mut self, spill: &mut dyn SpillStore) {
        match spill.take_front(&self.class_key, usize::MAX) {
            Ok(entries) => self.memory.extend(entries),
            Err(e) => {
                error!(queue = %self.class_key, lost = self.disk_len, error = %e, "Failed to read spilled URIs")
            }
        }
        self.disk_len = 0;
    }
}
