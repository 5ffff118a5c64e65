//! Registry of all work queues and their scheduling indexes
//!
//! Every queue is filed in exactly one index matching its state. All state
//! changes go through [`QueueRegistry::modify`], which takes the queue out of
//! its index, applies the change and files it again, so a queue can never be
//! left in zero or two indexes.

use crate::frontier::snapshot::{PendingUri, QueueSnapshot};
use crate::frontier::work_queue::{IndexSlot, SortKey, WorkQueue};
use crate::state::QueueState;
use crate::storage::SpillStore;
use crate::uri::CrawlUri;
use crate::{FrontierError, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

pub(crate) type QueueId = u64;

/// Sizing and budget settings applied to every queue
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueLimits {
    pub in_memory_limit: usize,
    pub session_budget: u64,
    pub total_budget: u64,
    pub max_retained_empty: usize,
}

/// Result of offering a URI to its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    Accepted { became_ready: bool },
    Discarded,
}

/// What happened to a queue when its in-flight URI finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub state: QueueState,
    pub wake_time: Option<Instant>,
    pub dropped: usize,
}

fn transition(queue: &mut WorkQueue, next: QueueState) {
    if queue.state == next {
        return;
    }
    debug_assert!(
        queue.state.can_transition_to(next),
        "illegal transition {} -> {} for queue {}",
        queue.state,
        next,
        queue.class_key()
    );
    debug!(queue = %queue.class_key(), from = %queue.state, to = %next, "Queue transition");
    queue.state = next;
}

/// Moves a released queue to SNOOZED, READY or EMPTY
fn settle(queue: &mut WorkQueue, now: Instant) {
    match queue.wake_time {
        Some(wake) if wake > now => transition(queue, QueueState::Snoozed),
        _ => {
            queue.wake_time = None;
            let next = if queue.is_empty() {
                QueueState::Empty
            } else {
                QueueState::Ready
            };
            transition(queue, next);
        }
    }
}

pub(crate) struct QueueRegistry {
    queues: HashMap<QueueId, WorkQueue>,
    ids: HashMap<String, QueueId>,
    next_id: QueueId,

    /// Ordinal for the next URI added at the tail of its precedence tier
    next_ordinal: i64,

    /// Ordinal for the next URI pushed back onto a queue head
    next_front_ordinal: i64,

    ready: BTreeSet<(i32, QueueId)>,
    snoozed: BTreeSet<(Instant, QueueId)>,
    inactive: BTreeSet<(bool, i32, QueueId)>,
    busy: HashSet<QueueId>,
    frozen: HashSet<QueueId>,
    discarded: HashSet<QueueId>,

    /// Empty queues, least recently touched first
    empty: BTreeSet<(u64, QueueId)>,
    empty_tick: u64,

    /// URIs waiting in queues, excluding in-flight ones
    queued: usize,

    spill: Box<dyn SpillStore>,
    limits: QueueLimits,
}

impl QueueRegistry {
    pub fn new(spill: Box<dyn SpillStore>, limits: QueueLimits) -> Self {
        Self {
            queues: HashMap::new(),
            ids: HashMap::new(),
            next_id: 0,
            next_ordinal: 0,
            next_front_ordinal: -1,
            ready: BTreeSet::new(),
            snoozed: BTreeSet::new(),
            inactive: BTreeSet::new(),
            busy: HashSet::new(),
            frozen: HashSet::new(),
            discarded: HashSet::new(),
            empty: BTreeSet::new(),
            empty_tick: 0,
            queued: 0,
            spill,
            limits,
        }
    }

    pub fn queued_count(&self) -> usize {
        self.queued
    }

    pub fn in_flight_count(&self) -> usize {
        self.busy.len()
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn queue(&self, class_key: &str) -> Option<&WorkQueue> {
        self.ids.get(class_key).and_then(|id| self.queues.get(id))
    }

    /// Number of queues in each state
    pub fn state_counts(&self) -> Vec<(QueueState, usize)> {
        QueueState::all_states()
            .into_iter()
            .map(|state| {
                let count = match state {
                    QueueState::Empty => self.empty.len(),
                    QueueState::Ready => self.ready.len(),
                    QueueState::Busy => self.busy.len(),
                    QueueState::Snoozed => self.snoozed.len(),
                    QueueState::Frozen => self.frozen.len(),
                    QueueState::Inactive => self.inactive.len(),
                    QueueState::Discarded => self.discarded.len(),
                };
                (state, count)
            })
            .collect()
    }

    /// Returns true while some URI can still be handed out without operator help
    pub fn has_live_work(&self) -> bool {
        let non_empty = |id: &QueueId| self.queues.get(id).map_or(false, |q| !q.is_empty());

        !self.busy.is_empty()
            || !self.ready.is_empty()
            || self.snoozed.iter().any(|(_, id)| non_empty(id))
            || self
                .inactive
                .iter()
                .any(|(retired, _, id)| !retired && non_empty(id))
    }

    /// Earliest moment a snoozed queue wakes
    pub fn earliest_wake(&self) -> Option<Instant> {
        self.snoozed.first().map(|(wake, _)| *wake)
    }

    /// Queues in creation order
    pub fn queues(&self) -> Vec<&WorkQueue> {
        let mut queues: Vec<&WorkQueue> = self.queues.values().collect();
        queues.sort_by_key(|q| q.id);
        queues
    }

    /// A queue's in-flight URI followed by its queued URIs in order
    pub fn pending_uris(&self, queue: &WorkQueue) -> Vec<PendingUri> {
        let mut uris = Vec::with_capacity(queue.len() + 1);
        if let Some((key, uri)) = &queue.in_flight {
            uris.push(PendingUri {
                key: *key,
                uri: uri.clone(),
                in_flight: true,
            });
        }
        uris.extend(
            queue
                .pending(self.spill.as_ref())
                .into_iter()
                .map(|(key, uri)| PendingUri {
                    key,
                    uri,
                    in_flight: false,
                }),
        );
        uris
    }

    fn take_ordinal(&mut self) -> i64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    fn lookup(&self, class_key: &str) -> Result<QueueId> {
        self.ids
            .get(class_key)
            .copied()
            .ok_or_else(|| FrontierError::UnknownQueue(class_key.to_string()))
    }

    fn get_or_create(&mut self, class_key: &str) -> QueueId {
        if let Some(id) = self.ids.get(class_key) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        let queue = WorkQueue::new(
            class_key.to_string(),
            id,
            self.limits.in_memory_limit,
            self.limits.session_budget,
        );
        self.queues.insert(id, queue);
        self.ids.insert(class_key.to_string(), id);
        trace!(queue = class_key, id, "Created queue");
        id
    }

    fn detach(&mut self, id: QueueId) {
        let Some(queue) = self.queues.get_mut(&id) else {
            return;
        };
        let Some(slot) = queue.slot.take() else {
            return;
        };
        match slot {
            IndexSlot::Ready(precedence) => self.ready.remove(&(precedence, id)),
            IndexSlot::Snoozed(wake) => self.snoozed.remove(&(wake, id)),
            IndexSlot::Inactive(retired, precedence) => {
                self.inactive.remove(&(retired, precedence, id))
            }
            IndexSlot::Busy => self.busy.remove(&id),
            IndexSlot::Frozen => self.frozen.remove(&id),
            IndexSlot::Empty(tick) => self.empty.remove(&(tick, id)),
            IndexSlot::Discarded => self.discarded.remove(&id),
        };
    }

    fn attach(&mut self, id: QueueId) {
        let Some(queue) = self.queues.get_mut(&id) else {
            return;
        };
        let slot = match queue.state {
            QueueState::Ready => {
                let precedence = queue.head_precedence().unwrap_or(i32::MAX);
                self.ready.insert((precedence, id));
                IndexSlot::Ready(precedence)
            }
            QueueState::Snoozed => {
                let wake = match queue.wake_time {
                    Some(wake) => wake,
                    None => {
                        let now = Instant::now();
                        queue.wake_time = Some(now);
                        now
                    }
                };
                self.snoozed.insert((wake, id));
                IndexSlot::Snoozed(wake)
            }
            QueueState::Inactive => {
                let precedence = queue.head_precedence().unwrap_or(i32::MAX);
                self.inactive.insert((queue.retired, precedence, id));
                IndexSlot::Inactive(queue.retired, precedence)
            }
            QueueState::Busy => {
                self.busy.insert(id);
                IndexSlot::Busy
            }
            QueueState::Frozen => {
                self.frozen.insert(id);
                IndexSlot::Frozen
            }
            QueueState::Empty => {
                self.empty_tick += 1;
                self.empty.insert((self.empty_tick, id));
                IndexSlot::Empty(self.empty_tick)
            }
            QueueState::Discarded => {
                self.discarded.insert(id);
                IndexSlot::Discarded
            }
        };
        queue.slot = Some(slot);
    }

    /// Applies a change to one queue and refiles it
    fn modify<R>(
        &mut self,
        id: QueueId,
        change: impl FnOnce(&mut WorkQueue, &mut dyn SpillStore) -> R,
    ) -> R {
        self.detach(id);
        let queue = self
            .queues
            .get_mut(&id)
            .unwrap_or_else(|| panic!("queue id {} is not registered", id));
        let before = queue.len();
        let result = change(queue, self.spill.as_mut());
        let after = queue.len();
        self.queued = (self.queued + after).saturating_sub(before);
        self.attach(id);
        result
    }

    /// Forgets the least recently touched empty queues beyond the retention cap
    fn evict_empty(&mut self) {
        while self.empty.len() > self.limits.max_retained_empty {
            let Some((_, id)) = self.empty.pop_first() else {
                break;
            };
            if let Some(queue) = self.queues.remove(&id) {
                self.ids.remove(queue.class_key());
                trace!(queue = %queue.class_key(), "Evicted empty queue");
            }
        }
    }

    /// Adds a URI at the tail of its precedence tier
    pub fn enqueue(&mut self, class_key: &str, uri: CrawlUri, precedence: i32) -> Enqueued {
        let id = self.get_or_create(class_key);
        if self.queues[&id].state == QueueState::Discarded {
            return Enqueued::Discarded;
        }

        let key = SortKey::new(precedence, self.take_ordinal());
        let became_ready = self.modify(id, |queue, spill| {
            queue.insert(key, uri, spill);
            if queue.state == QueueState::Empty {
                transition(queue, QueueState::Ready);
                true
            } else {
                false
            }
        });
        Enqueued::Accepted { became_ready }
    }

    /// Moves every snoozed queue whose wake time has passed out of the snoozed index
    pub fn wake_due(&mut self, now: Instant) -> usize {
        let mut woken = 0;
        while let Some(&(wake, id)) = self.snoozed.first() {
            if wake > now {
                break;
            }
            self.modify(id, |queue, _| {
                queue.wake_time = None;
                let next = if queue.is_empty() {
                    QueueState::Empty
                } else {
                    QueueState::Ready
                };
                transition(queue, next);
            });
            woken += 1;
        }
        if woken > 0 {
            self.evict_empty();
        }
        woken
    }

    /// Brings inactive queues back while nothing is ready
    fn reactivate_inactive(&mut self, now: Instant) {
        let budget = self.limits.session_budget;
        while self.ready.is_empty() {
            let Some(&(retired, _, id)) = self.inactive.first() else {
                break;
            };
            if retired {
                break;
            }
            self.modify(id, |queue, _| {
                queue.session_balance = budget;
                settle(queue, now);
            });
            debug!(id, "Reactivated inactive queue");
        }
        self.evict_empty();
    }

    /// Takes the head URI of the most urgent ready queue and marks the queue BUSY
    pub fn next_ready(&mut self, now: Instant) -> Option<CrawlUri> {
        self.wake_due(now);
        if self.ready.is_empty() {
            self.reactivate_inactive(now);
        }

        let session_limited = self.limits.session_budget > 0;
        loop {
            let &(_, id) = self.ready.first()?;
            let taken = self.modify(id, |queue, spill| match queue.pop(spill) {
                Some((key, uri)) => {
                    transition(queue, QueueState::Busy);
                    queue.in_flight = Some((key, uri.clone()));
                    if session_limited {
                        queue.session_balance = queue.session_balance.saturating_sub(1);
                    }
                    queue.total_spent += 1;
                    Some(uri)
                }
                None => {
                    transition(queue, QueueState::Empty);
                    None
                }
            });

            match taken {
                Some(uri) => return Some(uri),
                None => self.evict_empty(),
            }
        }
    }

    /// Returns the in-flight URI's queue to circulation
    ///
    /// # Panics
    ///
    /// Panics if `curi` is not the in-flight URI of a BUSY queue.
    pub fn complete(
        &mut self,
        curi: CrawlUri,
        requeue: bool,
        delay: Duration,
        now: Instant,
    ) -> Completion {
        let class_key = match curi.class_key() {
            Some(key) => key.to_string(),
            None => panic!("finished URI {} was never handed out by the frontier", curi),
        };
        let id = match self.ids.get(&class_key) {
            Some(id) => *id,
            None => panic!("finished URI {} belongs to unknown queue {}", curi, class_key),
        };
        {
            let queue = &self.queues[&id];
            let matches = queue
                .in_flight
                .as_ref()
                .map_or(false, |(_, held)| held.as_str() == curi.as_str());
            assert!(
                queue.state == QueueState::Busy && matches,
                "finished URI {} is not in flight in queue {} ({})",
                curi,
                class_key,
                queue.state
            );
        }

        let ordinal = if requeue { self.take_ordinal() } else { 0 };
        let limits = self.limits;
        let completion = self.modify(id, |queue, spill| {
            let precedence = match queue.in_flight.take() {
                Some((key, _)) => key.precedence,
                None => curi.precedence,
            };
            let pending = queue.pending_admin.take();
            if requeue && pending != Some(QueueState::Discarded) {
                queue.insert(SortKey::new(precedence, ordinal), curi, spill);
            }

            queue.wake_time = if delay.is_zero() {
                None
            } else {
                Some(now + delay)
            };

            let mut dropped = 0;
            let next = if let Some(target) = pending {
                if target == QueueState::Discarded {
                    dropped = queue.clear(spill);
                    queue.wake_time = None;
                }
                target
            } else if limits.total_budget > 0 && queue.total_spent >= limits.total_budget {
                queue.retired = true;
                QueueState::Inactive
            } else if limits.session_budget > 0 && queue.session_balance == 0 {
                QueueState::Inactive
            } else if queue.wake_time.is_some() {
                QueueState::Snoozed
            } else if queue.is_empty() {
                QueueState::Empty
            } else {
                QueueState::Ready
            };
            transition(queue, next);

            Completion {
                state: next,
                wake_time: queue.wake_time,
                dropped,
            }
        });

        if completion.state == QueueState::Empty {
            self.evict_empty();
        }
        completion
    }

    /// Applies an operator action, deferring it while the queue is BUSY
    fn administer(&mut self, class_key: &str, target: QueueState) -> Result<usize> {
        let id = self.lookup(class_key)?;
        let state = self.queues[&id].state;
        if state == target {
            return Ok(0);
        }
        if !state.can_transition_to(target) {
            return Err(FrontierError::InvalidTransition {
                key: class_key.to_string(),
                from: state,
                to: target,
            });
        }
        if state == QueueState::Busy {
            let Some(queue) = self.queues.get_mut(&id) else {
                return Err(FrontierError::UnknownQueue(class_key.to_string()));
            };
            // A deferred discard is as final as an applied one
            if queue.pending_admin == Some(QueueState::Discarded) {
                if target == QueueState::Discarded {
                    return Ok(0);
                }
                return Err(FrontierError::InvalidTransition {
                    key: class_key.to_string(),
                    from: QueueState::Discarded,
                    to: target,
                });
            }
            queue.pending_admin = Some(target);
            debug!(queue = class_key, action = %target, "Deferred until in-flight URI finishes");
            return Ok(0);
        }

        Ok(self.modify(id, |queue, spill| {
            transition(queue, target);
            if target == QueueState::Discarded {
                queue.wake_time = None;
                queue.clear(spill)
            } else {
                0
            }
        }))
    }

    pub fn freeze(&mut self, class_key: &str) -> Result<()> {
        self.administer(class_key, QueueState::Frozen).map(|_| ())
    }

    pub fn deactivate(&mut self, class_key: &str) -> Result<()> {
        self.administer(class_key, QueueState::Inactive).map(|_| ())
    }

    /// Drops a queue and its contents for good; returns how many URIs were dropped
    pub fn discard(&mut self, class_key: &str) -> Result<usize> {
        self.administer(class_key, QueueState::Discarded)
    }

    /// Undoes an operator action, honouring any remaining politeness delay
    fn release(&mut self, class_key: &str, from: QueueState, now: Instant) -> Result<()> {
        let id = self.lookup(class_key)?;
        let limits = self.limits;
        let reset_budgets = |queue: &mut WorkQueue| {
            if from == QueueState::Inactive {
                queue.retired = false;
                queue.total_spent = 0;
                queue.session_balance = limits.session_budget;
            }
        };

        let queue = self
            .queues
            .get_mut(&id)
            .ok_or_else(|| FrontierError::UnknownQueue(class_key.to_string()))?;
        if queue.state == QueueState::Busy && queue.pending_admin == Some(from) {
            queue.pending_admin = None;
            reset_budgets(queue);
            return Ok(());
        }
        if queue.state != from {
            return Err(FrontierError::InvalidTransition {
                key: class_key.to_string(),
                from: queue.state,
                to: QueueState::Ready,
            });
        }

        self.modify(id, |queue, _| {
            reset_budgets(queue);
            settle(queue, now);
        });
        self.evict_empty();
        Ok(())
    }

    pub fn thaw(&mut self, class_key: &str, now: Instant) -> Result<()> {
        self.release(class_key, QueueState::Frozen, now)
    }

    pub fn reactivate(&mut self, class_key: &str, now: Instant) -> Result<()> {
        self.release(class_key, QueueState::Inactive, now)
    }

    /// Removes queued URIs whose class key and URI both match; returns the count
    pub fn delete_uris(&mut self, queue_pattern: &Regex, uri_pattern: &Regex) -> usize {
        let ids: Vec<QueueId> = self
            .queues
            .values()
            .filter(|q| queue_pattern.is_match(q.class_key()))
            .map(|q| q.id)
            .collect();

        let mut removed = 0;
        for id in ids {
            removed += self.modify(id, |queue, spill| {
                let count = queue.retain(spill, |uri| !uri_pattern.is_match(uri.as_str()));
                if queue.state == QueueState::Ready && queue.is_empty() {
                    transition(queue, QueueState::Empty);
                }
                count
            });
        }
        self.evict_empty();
        removed
    }

    pub fn snapshot(&self, now: Instant) -> Vec<QueueSnapshot> {
        self.queues()
            .into_iter()
            .map(|queue| QueueSnapshot {
                class_key: queue.class_key().to_string(),
                state: queue.pending_admin.unwrap_or(queue.state),
                wake_in: queue
                    .wake_time
                    .map(|wake| wake.saturating_duration_since(now))
                    .filter(|left| !left.is_zero()),
                session_balance: queue.session_balance,
                total_spent: queue.total_spent,
                retired: queue.retired,
                uris: self.pending_uris(queue),
            })
            .collect()
    }

    /// Rebuilds queues from a snapshot; returns how many URIs were restored
    ///
    /// In-flight URIs go back to the head of their queue. Queues that are
    /// currently BUSY or DISCARDED are left alone; FROZEN and INACTIVE queues
    /// take the restored URIs but keep their state.
    pub fn restore(&mut self, snapshots: Vec<QueueSnapshot>, now: Instant) -> usize {
        let ordinals = snapshots
            .iter()
            .flat_map(|q| q.uris.iter())
            .map(|p| p.key.ordinal);
        if let Some(max) = ordinals.clone().max() {
            self.next_ordinal = self.next_ordinal.max(max + 1);
        }
        if let Some(min) = ordinals.min() {
            self.next_front_ordinal = self.next_front_ordinal.min(min - 1);
        }

        let mut restored = 0;
        for snapshot in snapshots {
            let id = self.get_or_create(&snapshot.class_key);
            let live = self.queues[&id].state;
            if matches!(live, QueueState::Busy | QueueState::Discarded) {
                warn!(queue = %snapshot.class_key, state = %live, "Skipping restore of queue");
                continue;
            }
            let on_hold = matches!(live, QueueState::Frozen | QueueState::Inactive);
            // Saved ordinals may clash with URIs the live queue already holds
            let rekey = !self.queues[&id].is_empty();

            let head_precedence = snapshot
                .uris
                .iter()
                .filter(|p| !p.in_flight)
                .map(|p| p.key.precedence)
                .min();
            let mut entries = Vec::with_capacity(snapshot.uris.len());
            for pending in snapshot.uris {
                let key = if pending.in_flight {
                    let precedence = head_precedence
                        .map_or(pending.key.precedence, |head| head.min(pending.key.precedence));
                    let key = SortKey::new(precedence, self.next_front_ordinal);
                    self.next_front_ordinal -= 1;
                    key
                } else if rekey {
                    SortKey::new(pending.key.precedence, self.take_ordinal())
                } else {
                    pending.key
                };
                entries.push((key, pending.uri));
            }
            restored += entries.len();

            let state = snapshot.state;
            let wake_in = snapshot.wake_in;
            let (balance, spent, retired) = (
                snapshot.session_balance,
                snapshot.total_spent,
                snapshot.retired,
            );
            self.modify(id, |queue, spill| {
                if !on_hold {
                    queue.session_balance = balance;
                    queue.total_spent = spent;
                    queue.retired = retired;
                }
                for (key, mut uri) in entries {
                    uri.assign_class_key(queue.class_key().to_string());
                    queue.insert(key, uri, spill);
                }
                queue.wake_time = wake_in.filter(|left| !left.is_zero()).map(|left| now + left);
                match state {
                    _ if on_hold => {}
                    QueueState::Frozen | QueueState::Inactive => queue.state = state,
                    QueueState::Discarded => {
                        queue.clear(spill);
                        queue.wake_time = None;
                        queue.state = state;
                    }
                    _ => {
                        queue.state = QueueState::Empty;
                        settle(queue, now);
                    }
                }
            });
        }
        self.evict_empty();
        restored
    }

    /// Checks that every queue sits in the one index matching its state
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let indexed = self.ready.len()
            + self.snoozed.len()
            + self.inactive.len()
            + self.busy.len()
            + self.frozen.len()
            + self.empty.len()
            + self.discarded.len();
        assert_eq!(indexed, self.queues.len(), "index sizes do not add up");

        let mut queued = 0;
        for (id, queue) in &self.queues {
            queued += queue.len();
            assert_eq!(self.ids.get(queue.class_key()), Some(id));
            let filed = match queue.state {
                QueueState::Ready => {
                    assert!(!queue.is_empty(), "ready queue {} is empty", queue.class_key());
                    self.ready.iter().any(|(_, q)| q == id)
                }
                QueueState::Snoozed => self.snoozed.iter().any(|(_, q)| q == id),
                QueueState::Inactive => self.inactive.iter().any(|(_, _, q)| q == id),
                QueueState::Busy => {
                    assert!(queue.in_flight.is_some());
                    self.busy.contains(id)
                }
                QueueState::Frozen => self.frozen.contains(id),
                QueueState::Empty => {
                    assert!(queue.is_empty());
                    self.empty.iter().any(|(_, q)| q == id)
                }
                QueueState::Discarded => self.discarded.contains(id),
            };
            assert!(filed, "queue {} missing from its {} index", queue.class_key(), queue.state);
            if queue.state != QueueState::Busy {
                assert!(queue.in_flight.is_none());
            }
        }
        assert_eq!(queued, self.queued, "queued counter drifted");
    }
}
