//! Fixed-size pool of crawl workers

use crate::frontier::{Frontier, NextUri};
use crate::uri::FetchStatus;
use crate::worker::Processor;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What a worker is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    AboutToGetUri,
    Processing,
    Finishing,
    Finished,
}

impl WorkerStep {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AboutToGetUri,
            1 => Self::Processing,
            2 => Self::Finishing,
            _ => Self::Finished,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::AboutToGetUri => 0,
            Self::Processing => 1,
            Self::Finishing => 2,
            Self::Finished => 3,
        }
    }
}

impl fmt::Display for WorkerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AboutToGetUri => "ABOUT_TO_GET_URI",
            Self::Processing => "PROCESSING",
            Self::Finishing => "FINISHING",
            Self::Finished => "FINISHED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
struct WorkerStatus {
    step: AtomicU8,
    processed: AtomicU64,
    current: Mutex<Option<String>>,
}

impl WorkerStatus {
    fn new() -> Self {
        Self {
            step: AtomicU8::new(WorkerStep::AboutToGetUri.as_u8()),
            processed: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    fn set_step(&self, step: WorkerStep) {
        self.step.store(step.as_u8(), Ordering::Relaxed);
    }

    fn set_current(&self, uri: Option<String>) {
        *self.current.lock().expect("worker status lock poisoned") = uri;
    }
}

/// Snapshot of one worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub id: usize,
    pub step: WorkerStep,
    pub processed: u64,
    pub current: Option<String>,
}

/// Workers sharing one frontier
///
/// Workers never talk to each other; every bit of coordination goes through
/// the frontier. A worker that finds the frontier exhausted shuts it down,
/// which releases all the others.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    statuses: Vec<Arc<WorkerStatus>>,
}

impl WorkerPool {
    /// Spawns `count` workers on the current tokio runtime
    pub fn start(
        frontier: Arc<Frontier>,
        processor: Arc<dyn Processor>,
        count: usize,
        next_timeout: Duration,
    ) -> Self {
        let mut handles = Vec::with_capacity(count);
        let mut statuses = Vec::with_capacity(count);

        for id in 0..count {
            let status = Arc::new(WorkerStatus::new());
            statuses.push(status.clone());
            handles.push(tokio::spawn(run_worker(
                id,
                frontier.clone(),
                processor.clone(),
                status,
                next_timeout,
            )));
        }

        info!(workers = count, "Worker pool started");
        Self { handles, statuses }
    }

    pub fn report(&self) -> Vec<WorkerReport> {
        self.statuses
            .iter()
            .enumerate()
            .map(|(id, status)| WorkerReport {
                id,
                step: WorkerStep::from_u8(status.step.load(Ordering::Relaxed)),
                processed: status.processed.load(Ordering::Relaxed),
                current: status
                    .current
                    .lock()
                    .expect("worker status lock poisoned")
                    .clone(),
            })
            .collect()
    }

    /// Total URIs processed so far
    pub fn processed(&self) -> u64 {
        self.statuses
            .iter()
            .map(|s| s.processed.load(Ordering::Relaxed))
            .sum()
    }

    /// Waits for every worker to exit; returns the total processed
    pub async fn join(self) -> u64 {
        for (id, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "Worker task failed");
            }
        }
        let processed = self
            .statuses
            .iter()
            .map(|s| s.processed.load(Ordering::Relaxed))
            .sum();
        info!(processed, "Worker pool stopped");
        processed
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Runs one worker until the frontier shuts down
///
/// A panic in the processor is contained to the URI being processed: it is
/// finished as a runtime error and the worker moves on.
async fn run_worker(
    id: usize,
    frontier: Arc<Frontier>,
    processor: Arc<dyn Processor>,
    status: Arc<WorkerStatus>,
    next_timeout: Duration,
) {
    debug!(worker = id, "Worker started");

    loop {
        status.set_step(WorkerStep::AboutToGetUri);
        match frontier.next(next_timeout).await {
            NextUri::Uri(mut curi) => {
                status.set_step(WorkerStep::Processing);
                status.set_current(Some(curi.to_string()));

                let outcome = AssertUnwindSafe(processor.process(&mut curi, &frontier))
                    .catch_unwind()
                    .await;
                if let Err(panic) = outcome {
                    error!(
                        worker = id,
                        uri = %curi,
                        panic = panic_message(&*panic),
                        "Processor panicked"
                    );
                    curi.fetch_status = FetchStatus::RuntimeError;
                }

                status.set_step(WorkerStep::Finishing);
                frontier.finished(curi);
                status.set_current(None);
                status.processed.fetch_add(1, Ordering::Relaxed);
            }
            NextUri::NoWork => {
                if frontier.is_exhausted() {
                    info!(worker = id, "Frontier exhausted");
                    frontier.shutdown();
                }
            }
            NextUri::Shutdown => break,
        }
    }

    status.set_step(WorkerStep::Finished);
    debug!(worker = id, processed = status.processed.load(Ordering::Relaxed), "Worker finished");
}
