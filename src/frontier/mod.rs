//! The crawl frontier
//!
//! Workers call [`Frontier::next`] to get a URI, fetch it, and hand it back
//! through [`Frontier::finished`]. In between, the URI's queue is BUSY and
//! nothing else from the same class key is handed out. After `finished`, the
//! queue snoozes for a politeness delay derived from the host's own response
//! time.
//!
//! # Components
//!
//! - [`WorkQueue`]: ordered, spillable per-class-key queue
//! - `QueueRegistry`: all queues plus the ready, snoozed and inactive indexes
//! - [`SeenUris`]: at-most-once discovery
//! - [`DispositionListener`]: per-URI outcome events

mod listener;
mod registry;
mod seen;
mod snapshot;
mod work_queue;

pub use listener::DispositionListener;
pub use seen::{fingerprint, SeenUris};
pub use snapshot::{CounterSnapshot, FrontierSnapshot, PendingUri, QueueSnapshot};
pub use work_queue::{SortKey, WorkQueue};

use crate::config::Config;
use crate::output::{FrontierReport, QueueSummary};
use crate::policy::{
    assignment_from_config, precedence_from_config, PolitenessPolicy, PrecedencePolicy,
    QueueAssignmentPolicy, URGENT_PRECEDENCE,
};
use crate::state::QueueState;
use crate::storage::{SpillStore, SqliteSpillStore};
use crate::uri::{CrawlUri, Disposition, FetchStatus};
use crate::Result;
use registry::{Enqueued, QueueLimits, QueueRegistry};
use regex::Regex;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Result of [`Frontier::next`]
#[derive(Debug)]
pub enum NextUri {
    /// A URI to process; its queue stays BUSY until `finished`
    Uri(CrawlUri),

    /// Nothing became available before the timeout
    NoWork,

    /// The frontier is shutting down
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    discovered: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    disregarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            discovered: self.discovered.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            disregarded: self.disregarded.load(Ordering::Relaxed),
        }
    }

    fn add(&self, other: &CounterSnapshot) {
        self.discovered.fetch_add(other.discovered, Ordering::Relaxed);
        self.succeeded.fetch_add(other.succeeded, Ordering::Relaxed);
        self.failed.fetch_add(other.failed, Ordering::Relaxed);
        self.disregarded.fetch_add(other.disregarded, Ordering::Relaxed);
    }
}

/// Scheduler deciding which URI each worker processes next
///
/// The frontier is shared between workers behind an `Arc`. All queue
/// mutations are serialized by one registry lock; the seen set has its own.
pub struct Frontier {
    registry: Mutex<QueueRegistry>,
    seen: SeenUris,
    assignment: Arc<dyn QueueAssignmentPolicy>,
    precedence: Arc<dyn PrecedencePolicy>,
    politeness: PolitenessPolicy,
    max_attempts: u32,
    retry_delay: Duration,

    /// URIs buffered by `batch_schedule`
    batch: Mutex<Vec<CrawlUri>>,

    listeners: RwLock<Vec<Arc<dyn DispositionListener>>>,
    counters: Counters,

    /// Wakes the longest-waiting `next` call when a queue may have become
    /// ready; a waiter that takes a URI while more queues are ready passes
    /// the wake on
    ready_notify: Notify,

    /// Signalled whenever the last in-flight URI finishes
    idle_notify: Notify,

    shutdown: CancellationToken,
    paused: AtomicBool,
}

impl Frontier {
    /// Creates a frontier from configuration
    ///
    /// Opens the spill database (in memory when no path is configured) and
    /// loads the precedence file for the preloaded policy.
    pub fn new(config: &Config) -> Result<Self> {
        let spill: Box<dyn SpillStore> = match &config.queues.spill_path {
            Some(path) => Box::new(SqliteSpillStore::open(Path::new(path))?),
            None => Box::new(SqliteSpillStore::in_memory()?),
        };
        let assignment = assignment_from_config(&config.queues);
        let precedence = precedence_from_config(&config.precedence)?;
        Ok(Self::with_policies(config, assignment, precedence, spill))
    }

    /// Creates a frontier with explicit policies and spill store
    pub fn with_policies(
        config: &Config,
        assignment: Arc<dyn QueueAssignmentPolicy>,
        precedence: Arc<dyn PrecedencePolicy>,
        spill: Box<dyn SpillStore>,
    ) -> Self {
        let limits = QueueLimits {
            in_memory_limit: config.queues.in_memory_limit,
            session_budget: config.queues.session_budget,
            total_budget: config.queues.total_budget,
            max_retained_empty: config.frontier.max_retained_empty_queues,
        };

        debug!(
            assignment = ?assignment,
            precedence = ?precedence,
            in_memory_limit = limits.in_memory_limit,
            "Frontier created"
        );

        Self {
            registry: Mutex::new(QueueRegistry::new(spill, limits)),
            seen: SeenUris::new(),
            assignment,
            precedence,
            politeness: PolitenessPolicy::new(&config.politeness),
            max_attempts: config.frontier.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.frontier.retry_delay_ms),
            batch: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            counters: Counters::default(),
            ready_notify: Notify::new(),
            idle_notify: Notify::new(),
            shutdown: CancellationToken::new(),
            paused: AtomicBool::new(false),
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, QueueRegistry> {
        self.registry.lock().expect("queue registry lock poisoned")
    }

    /// Offers a newly discovered URI
    ///
    /// URIs already seen are ignored. Never blocks on I/O other than a
    /// possible spill write.
    pub fn schedule(&self, curi: CrawlUri) {
        if !self.seen.insert_if_absent(&curi) {
            trace!(uri = %curi, "Already seen");
            return;
        }
        self.enqueue(curi, false);
    }

    /// Offers a URI at the most urgent precedence
    ///
    /// Used for prerequisites (DNS, robots.txt) that must be fetched before
    /// their dependents. Skips the seen check so a prerequisite can be
    /// fetched again.
    pub fn schedule_high(&self, curi: CrawlUri) {
        self.seen.insert_if_absent(&curi);
        self.enqueue(curi, true);
    }

    /// Parses and schedules a seed; malformed seeds are logged and dropped
    pub fn schedule_seed(&self, uri: &str) {
        match CrawlUri::parse(uri) {
            Ok(curi) => self.schedule(curi),
            Err(e) => warn!(uri, error = %e, "Dropping malformed seed"),
        }
    }

    /// Tells the assignment policy where a host resolved to
    ///
    /// Only address-keyed assignment uses this; URIs already queued stay in
    /// the queue they were assigned to.
    pub fn record_address(&self, host: &str, addr: IpAddr) {
        self.assignment.record_address(host, addr);
    }

    fn enqueue(&self, mut curi: CrawlUri, urgent: bool) {
        let class_key = self.assignment.class_key_for(&curi);
        curi.assign_class_key(class_key);
        let class_key = curi.class_key().unwrap_or_default().to_string();

        if urgent {
            curi.precedence = URGENT_PRECEDENCE;
        } else {
            self.precedence.uri_scheduled(&mut curi);
        }
        let precedence = curi.precedence;
        self.counters.discovered.fetch_add(1, Ordering::Relaxed);
        trace!(uri = %curi, queue = %class_key, precedence, "Scheduling");

        let outcome = self.lock_registry().enqueue(&class_key, curi, precedence);
        match outcome {
            Enqueued::Accepted { became_ready: true } => self.ready_notify.notify_one(),
            Enqueued::Accepted { became_ready: false } => {}
            Enqueued::Discarded => {
                self.counters.disregarded.fetch_add(1, Ordering::Relaxed);
                debug!(queue = %class_key, "Disregarding URI for discarded queue");
            }
        }
    }

    /// Buffers a URI; it is scheduled on the next `batch_flush` or `finished`
    pub fn batch_schedule(&self, curi: CrawlUri) {
        self.batch.lock().expect("batch buffer lock poisoned").push(curi);
    }

    /// Schedules every buffered URI
    pub fn batch_flush(&self) {
        let pending = std::mem::take(&mut *self.batch.lock().expect("batch buffer lock poisoned"));
        if pending.is_empty() {
            return;
        }
        trace!(count = pending.len(), "Flushing scheduling batch");
        for curi in pending {
            self.schedule(curi);
        }
    }

    /// Waits for the next URI to process
    ///
    /// Returns as soon as a queue is ready, waking when a snoozed queue's
    /// delay runs out. Returns [`NextUri::NoWork`] once `timeout` passes and
    /// [`NextUri::Shutdown`] promptly after [`Frontier::shutdown`].
    pub async fn next(&self, timeout: Duration) -> NextUri {
        let deadline = Instant::now() + timeout;

        loop {
            if self.shutdown.is_cancelled() {
                return NextUri::Shutdown;
            }

            let notified = self.ready_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let paused = self.is_paused();
            let wake = {
                let mut registry = self.lock_registry();
                if !paused {
                    if let Some(curi) = registry.next_ready(Instant::now()) {
                        let more = registry.has_ready();
                        drop(registry);
                        if more {
                            self.ready_notify.notify_one();
                        }
                        trace!(uri = %curi, "Handing out URI");
                        return NextUri::Uri(curi);
                    }
                }
                registry.earliest_wake()
            };

            if Instant::now() >= deadline {
                return NextUri::NoWork;
            }
            let until = match wake {
                Some(wake) if !paused && wake < deadline => wake,
                _ => deadline,
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return NextUri::Shutdown,
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(until) => {}
            }
        }
    }

    /// Reports the outcome of a URI returned by `next`
    ///
    /// # Panics
    ///
    /// Panics if `curi` is not currently in flight: that means the frontier's
    /// bookkeeping is corrupt.
    pub fn finished(&self, mut curi: CrawlUri) {
        self.batch_flush();

        let status = curi.fetch_status;
        let mut disposition = status.disposition();
        let (requeue, delay) = match disposition {
            Disposition::Retry if status == FetchStatus::Deferred => (true, Duration::ZERO),
            Disposition::Retry => {
                curi.fetch_attempts += 1;
                if curi.fetch_attempts < self.max_attempts {
                    let mut delay = self.politeness.delay_for(&curi);
                    if status.wants_retry_delay() {
                        delay = delay.max(self.retry_delay);
                    }
                    (true, delay)
                } else {
                    debug!(uri = %curi, attempts = curi.fetch_attempts, last = %status, "Retries exhausted");
                    curi.fetch_status = FetchStatus::RetriesExhausted;
                    disposition = Disposition::Failure;
                    (false, self.politeness.delay_for(&curi))
                }
            }
            Disposition::Success => (false, self.politeness.delay_for(&curi)),
            Disposition::Disregard => (false, Duration::ZERO),
            Disposition::Failure if curi.fetch_duration.is_some() => {
                (false, self.politeness.delay_for(&curi))
            }
            Disposition::Failure => (false, Duration::ZERO),
        };

        match disposition {
            Disposition::Success => self.counters.succeeded.fetch_add(1, Ordering::Relaxed),
            Disposition::Failure => self.counters.failed.fetch_add(1, Ordering::Relaxed),
            Disposition::Disregard => self.counters.disregarded.fetch_add(1, Ordering::Relaxed),
            Disposition::Retry => 0,
        };

        let listeners = self
            .listeners
            .read()
            .expect("listener lock poisoned")
            .clone();
        let echo = if listeners.is_empty() {
            None
        } else {
            Some(curi.clone())
        };

        debug!(
            uri = %curi,
            status = %curi.fetch_status,
            disposition = %disposition,
            delay_ms = delay.as_millis() as u64,
            "Finished"
        );
        if requeue {
            curi.reset_fetch_metrics();
        }

        let (completion, idle) = {
            let mut registry = self.lock_registry();
            let completion = registry.complete(curi, requeue, delay, Instant::now());
            (completion, registry.in_flight_count() == 0)
        };
        if completion.dropped > 0 {
            info!(dropped = completion.dropped, "Dropped contents of discarded queue");
        }

        self.ready_notify.notify_one();
        if idle {
            self.idle_notify.notify_waiters();
        }

        if let Some(curi) = echo {
            for listener in &listeners {
                listener.on_disposition(&curi, disposition);
            }
        }
    }

    /// Wakes every blocked `next` call with [`NextUri::Shutdown`]
    ///
    /// URIs in flight are abandoned unless [`Frontier::drain`] ran first.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Frontier shutting down");
        }
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops `next` from handing out URIs until `resume`
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Frontier paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Frontier resumed");
        }
        self.ready_notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Pauses, waits for every in-flight URI to finish, and snapshots
    ///
    /// If the frontier shuts down while waiting, the snapshot records the
    /// abandoned URIs as in flight.
    pub async fn drain(&self) -> FrontierSnapshot {
        self.pause();
        loop {
            let idle = self.idle_notify.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            let in_flight = self.in_flight_count();
            if in_flight == 0 {
                break;
            }
            debug!(in_flight, "Draining");

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = &mut idle => {}
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> FrontierSnapshot {
        let queues = self.lock_registry().snapshot(Instant::now());
        FrontierSnapshot {
            queues,
            seen: self.seen.fingerprints(),
            counters: self.counters.snapshot(),
        }
    }

    /// Loads a snapshot into this frontier; returns how many URIs were restored
    pub fn restore(&self, snapshot: FrontierSnapshot) -> usize {
        for fp in &snapshot.seen {
            self.seen.insert_fingerprint(*fp);
        }
        self.counters.add(&snapshot.counters);
        let queue_count = snapshot.queues.len();
        let restored = self
            .lock_registry()
            .restore(snapshot.queues, Instant::now());
        info!(queues = queue_count, uris = restored, "Restored frontier");
        self.ready_notify.notify_one();
        restored
    }

    pub fn add_listener(&self, listener: Arc<dyn DispositionListener>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    /// Returns true when no URI is queued or in flight
    pub fn is_empty(&self) -> bool {
        let registry = self.lock_registry();
        registry.queued_count() == 0 && registry.in_flight_count() == 0
    }

    /// Returns true when nothing can be handed out without operator action
    ///
    /// Frozen and retired queues may still hold URIs.
    pub fn is_exhausted(&self) -> bool {
        !self.lock_registry().has_live_work()
    }

    /// URIs waiting in queues, not counting in-flight ones
    pub fn pending_uri_count(&self) -> usize {
        self.lock_registry().queued_count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_registry().in_flight_count()
    }

    pub fn queue_count(&self) -> usize {
        self.lock_registry().queue_count()
    }

    pub fn discovered_uri_count(&self) -> u64 {
        self.counters.discovered.load(Ordering::Relaxed)
    }

    pub fn successfully_fetched_count(&self) -> u64 {
        self.counters.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed_fetch_count(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn disregarded_count(&self) -> u64 {
        self.counters.disregarded.load(Ordering::Relaxed)
    }

    pub fn queue_state(&self, class_key: &str) -> Option<QueueState> {
        self.lock_registry().queue(class_key).map(|q| q.state())
    }

    pub fn freeze(&self, class_key: &str) -> Result<()> {
        self.lock_registry().freeze(class_key)?;
        info!(queue = class_key, "Queue frozen");
        Ok(())
    }

    pub fn thaw(&self, class_key: &str) -> Result<()> {
        self.lock_registry().thaw(class_key, Instant::now())?;
        info!(queue = class_key, "Queue thawed");
        self.ready_notify.notify_one();
        Ok(())
    }

    pub fn deactivate(&self, class_key: &str) -> Result<()> {
        self.lock_registry().deactivate(class_key)?;
        info!(queue = class_key, "Queue deactivated");
        Ok(())
    }

    /// Brings back an inactive queue, resetting its budgets
    pub fn reactivate(&self, class_key: &str) -> Result<()> {
        self.lock_registry().reactivate(class_key, Instant::now())?;
        info!(queue = class_key, "Queue reactivated");
        self.ready_notify.notify_one();
        Ok(())
    }

    /// Drops a queue and everything in it; later URIs for it are disregarded
    pub fn discard(&self, class_key: &str) -> Result<usize> {
        let dropped = self.lock_registry().discard(class_key)?;
        info!(queue = class_key, dropped, "Queue discarded");
        Ok(dropped)
    }

    /// Deletes queued URIs matching both patterns; returns the count
    pub fn delete_uris(&self, queue_pattern: &str, uri_pattern: &str) -> Result<usize> {
        let queue_pattern = Regex::new(queue_pattern)?;
        let uri_pattern = Regex::new(uri_pattern)?;
        let deleted = self
            .lock_registry()
            .delete_uris(&queue_pattern, &uri_pattern);
        info!(deleted, queues = %queue_pattern, uris = %uri_pattern, "Deleted queued URIs");
        Ok(deleted)
    }

    /// Visits every queue in creation order
    ///
    /// Runs under the registry lock; `visit` must not call back into the
    /// frontier.
    pub fn for_each_queue(&self, mut visit: impl FnMut(&WorkQueue)) {
        let registry = self.lock_registry();
        for queue in registry.queues() {
            visit(queue);
        }
    }

    /// Visits every queued and in-flight URI, queue by queue in queue order
    ///
    /// Runs under the registry lock; `visit` must not call back into the
    /// frontier.
    pub fn for_each_pending_uri(&self, mut visit: impl FnMut(&str, &PendingUri)) {
        let registry = self.lock_registry();
        for queue in registry.queues() {
            for pending in registry.pending_uris(queue) {
                visit(queue.class_key(), &pending);
            }
        }
    }

    pub fn report(&self) -> FrontierReport {
        let registry = self.lock_registry();
        FrontierReport {
            queues_by_state: registry.state_counts(),
            total_queues: registry.queue_count(),
            queued: registry.queued_count(),
            in_flight: registry.in_flight_count(),
            counters: self.counters.snapshot(),
            paused: self.is_paused(),
        }
    }

    /// One summary per queue, in creation order
    pub fn queue_summaries(&self) -> Vec<QueueSummary> {
        let now = Instant::now();
        let registry = self.lock_registry();
        registry
            .queues()
            .into_iter()
            .map(|queue| QueueSummary::from_queue(queue, now))
            .collect()
    }
}
