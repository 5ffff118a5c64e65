//! Integration tests for frontier scheduling
//!
//! These tests drive the public API the way crawl workers do and check the
//! scheduling guarantees: one URI in flight per host, at-most-once
//! discovery, precedence and FIFO order, politeness spacing, retries and
//! shutdown.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_frontier::config::Config;
use sumi_frontier::frontier::{Frontier, NextUri};
use sumi_frontier::policy::{HostnameAssignment, PrecedencePolicy};
use sumi_frontier::storage::{SqliteCheckpointStore, SqliteSpillStore};
use sumi_frontier::worker::{Processor, WorkerPool};
use sumi_frontier::{CrawlUri, FetchStatus, QueueState};
use tempfile::TempDir;
use tokio::time::Instant;

/// Takes precedence from a `p` query parameter, defaulting to 1
#[derive(Debug)]
struct QueryPrecedence;

impl PrecedencePolicy for QueryPrecedence {
    fn precedence_for(&self, uri: &CrawlUri) -> i32 {
        uri.uri()
            .query_pairs()
            .find(|(key, _)| key == "p")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(1)
    }
}

fn create_test_config() -> Config {
    let mut config = Config::default();
    config.frontier.max_attempts = 3;
    config.politeness.delay_factor = 1.0;
    config.politeness.min_delay_ms = 1000;
    config.politeness.max_delay_ms = 5000;
    config
}

fn create_test_frontier(config: &Config) -> Arc<Frontier> {
    Arc::new(Frontier::with_policies(
        config,
        Arc::new(HostnameAssignment),
        Arc::new(QueryPrecedence),
        Box::new(SqliteSpillStore::in_memory().unwrap()),
    ))
}

fn curi(s: &str) -> CrawlUri {
    CrawlUri::parse(s).unwrap()
}

async fn take(frontier: &Frontier) -> CrawlUri {
    match frontier.next(Duration::from_secs(60)).await {
        NextUri::Uri(uri) => uri,
        other => panic!("expected a URI, got {:?}", other),
    }
}

fn succeed(frontier: &Frontier, mut uri: CrawlUri) {
    uri.record_fetch(FetchStatus::Success(200), Duration::from_millis(10), Some(512));
    frontier.finished(uri);
}

/// Flags any moment where two workers hold URIs from the same host
struct ExclusionProbe {
    active: Mutex<HashSet<String>>,
    violated: AtomicBool,
}

#[async_trait]
impl Processor for ExclusionProbe {
    async fn process(&self, curi: &mut CrawlUri, _frontier: &Frontier) {
        let host = curi.host().unwrap_or_default().to_string();
        if !self.active.lock().unwrap().insert(host.clone()) {
            self.violated.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.lock().unwrap().remove(&host);
        curi.record_fetch(FetchStatus::Success(200), Duration::from_millis(50), None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_uri_in_flight_per_host() {
    let mut config = create_test_config();
    config.politeness.min_delay_ms = 100;
    let frontier = create_test_frontier(&config);
    for host in ["a.example", "b.example", "c.example"] {
        for n in 0..5 {
            frontier.schedule(curi(&format!("https://{}/{}", host, n)));
        }
    }

    let probe = Arc::new(ExclusionProbe {
        active: Mutex::new(HashSet::new()),
        violated: AtomicBool::new(false),
    });
    let pool = WorkerPool::start(frontier.clone(), probe.clone(), 8, Duration::from_millis(500));
    let processed = pool.join().await;

    assert_eq!(processed, 15);
    assert!(!probe.violated.load(Ordering::SeqCst));
    assert_eq!(frontier.successfully_fetched_count(), 15);
    assert!(frontier.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_duplicates_are_scheduled_once() {
    let frontier = create_test_frontier(&create_test_config());

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let frontier = frontier.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                frontier.schedule(curi("https://a.example/same"));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(frontier.discovered_uri_count(), 1);
    let uri = take(&frontier).await;
    succeed(&frontier, uri);
    assert!(matches!(
        frontier.next(Duration::from_secs(5)).await,
        NextUri::NoWork
    ));
}

#[tokio::test(start_paused = true)]
async fn test_precedence_orders_within_queue() {
    let mut config = create_test_config();
    config.politeness.min_delay_ms = 0;
    config.politeness.delay_factor = 0.0;
    let frontier = create_test_frontier(&config);
    frontier.schedule(curi("https://a.example/b?p=5"));
    frontier.schedule(curi("https://a.example/a?p=1"));

    let first = take(&frontier).await;
    assert_eq!(first.uri().path(), "/a");
    succeed(&frontier, first);
    assert_eq!(take(&frontier).await.uri().path(), "/b");
}

#[tokio::test(start_paused = true)]
async fn test_equal_precedence_is_fifo() {
    let mut config = create_test_config();
    config.politeness.min_delay_ms = 0;
    config.politeness.delay_factor = 0.0;
    let frontier = create_test_frontier(&config);
    for n in 0..5 {
        frontier.schedule(curi(&format!("https://a.example/{}", n)));
    }

    for n in 0..5 {
        let uri = take(&frontier).await;
        assert_eq!(uri.uri().path(), format!("/{}", n));
        succeed(&frontier, uri);
    }
}

#[tokio::test(start_paused = true)]
async fn test_politeness_spacing() {
    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/1"));
    frontier.schedule(curi("https://a.example/2"));

    let first = take(&frontier).await;
    let first_at = Instant::now();
    succeed(&frontier, first);

    take(&frontier).await;
    assert!(first_at.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_is_requeued_after_delay() {
    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/flaky"));

    let mut uri = take(&frontier).await;
    uri.record_fetch(FetchStatus::Timeout, Duration::from_millis(200), None);
    let failed_at = Instant::now();
    frontier.finished(uri);
    assert_eq!(frontier.queue_state("a.example"), Some(QueueState::Snoozed));

    let retried = take(&frontier).await;
    assert_eq!(retried.as_str(), "https://a.example/flaky");
    assert_eq!(retried.fetch_attempts, 1);
    assert!(failed_at.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_counts_as_failure() {
    let mut config = create_test_config();
    config.frontier.max_attempts = 2;
    let frontier = create_test_frontier(&config);
    frontier.schedule(curi("https://a.example/down"));

    for _ in 0..2 {
        let mut uri = take(&frontier).await;
        uri.record_fetch(FetchStatus::ConnectFailed, Duration::from_millis(5), None);
        frontier.finished(uri);
    }

    assert_eq!(frontier.failed_fetch_count(), 1);
    assert_eq!(frontier.pending_uri_count(), 0);
    assert!(matches!(
        frontier.next(Duration::from_secs(10)).await,
        NextUri::NoWork
    ));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_empties_queue() {
    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/bad"));

    let mut uri = take(&frontier).await;
    uri.fetch_status = FetchStatus::Unfetchable;
    frontier.finished(uri);

    assert_eq!(frontier.queue_state("a.example"), Some(QueueState::Empty));
    assert_eq!(frontier.pending_uri_count(), 0);
    assert_eq!(frontier.failed_fetch_count(), 1);
    let report = frontier.report();
    assert_eq!(report.count_in(QueueState::Ready), 0);
    assert_eq!(report.count_in(QueueState::Snoozed), 0);
}

#[tokio::test(start_paused = true)]
async fn test_two_hosts_first_round() {
    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/a1?p=1"));
    frontier.schedule(curi("https://a.example/a2?p=2"));
    frontier.schedule(curi("https://b.example/b1?p=1"));

    let (x, y) = tokio::join!(take(&frontier), take(&frontier));
    let mut round: Vec<String> = vec![x.uri().path().to_string(), y.uri().path().to_string()];
    round.sort();
    assert_eq!(round, vec!["/a1", "/b1"]);

    // a2 must wait for a1
    assert!(matches!(
        frontier.next(Duration::from_millis(500)).await,
        NextUri::NoWork
    ));

    let (a1, b1) = if x.host() == Some("a.example") { (x, y) } else { (y, x) };
    succeed(&frontier, a1);
    let finished_at = Instant::now();

    let a2 = take(&frontier).await;
    assert_eq!(a2.uri().path(), "/a2");
    assert!(finished_at.elapsed() >= Duration::from_millis(1000));
    succeed(&frontier, b1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_blocked_workers() {
    let frontier = create_test_frontier(&create_test_config());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.next(Duration::from_secs(3600)).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;

    frontier.shutdown();
    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("worker stayed blocked after shutdown")
            .unwrap();
        assert!(matches!(result, NextUri::Shutdown));
    }
}

#[tokio::test(start_paused = true)]
async fn test_large_queue_spills_and_keeps_order() {
    let mut config = create_test_config();
    config.queues.in_memory_limit = 4;
    config.politeness.min_delay_ms = 0;
    config.politeness.delay_factor = 0.0;
    let frontier = create_test_frontier(&config);
    for n in 0..50 {
        frontier.schedule(curi(&format!("https://a.example/{}", n)));
    }
    assert_eq!(frontier.pending_uri_count(), 50);

    let mut spilled = 0;
    frontier.for_each_queue(|queue| spilled = queue.spilled_len());
    assert!(spilled > 0);

    for n in 0..50 {
        let uri = take(&frontier).await;
        assert_eq!(uri.uri().path(), format!("/{}", n));
        succeed(&frontier, uri);
    }
    assert!(frontier.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_resume() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("checkpoint.db");

    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/1"));
    frontier.schedule(curi("https://a.example/2"));
    frontier.schedule(curi("https://b.example/1"));
    let held = take(&frontier).await;
    assert_eq!(held.as_str(), "https://a.example/1");

    let snapshot = frontier.snapshot();
    {
        let mut store = SqliteCheckpointStore::open(&db).unwrap();
        store.save(&snapshot, "test-hash").unwrap();
    }

    let store = SqliteCheckpointStore::open(&db).unwrap();
    let (record, loaded) = store.load_latest().unwrap().unwrap();
    assert_eq!(record.config_hash, "test-hash");

    let resumed = create_test_frontier(&create_test_config());
    assert_eq!(resumed.restore(loaded), 3);
    assert_eq!(resumed.discovered_uri_count(), 3);

    // The URI that was in flight comes back first
    assert_eq!(take(&resumed).await.as_str(), "https://a.example/1");

    // Seen URIs stay seen
    resumed.schedule(curi("https://b.example/1"));
    assert_eq!(resumed.discovered_uri_count(), 3);
    assert_eq!(resumed.pending_uri_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_frozen_queue_is_skipped_until_thawed() {
    let frontier = create_test_frontier(&create_test_config());
    frontier.schedule(curi("https://a.example/1"));
    frontier.schedule(curi("https://b.example/1"));
    frontier.freeze("a.example").unwrap();

    assert_eq!(take(&frontier).await.host(), Some("b.example"));
    assert!(matches!(
        frontier.next(Duration::from_millis(200)).await,
        NextUri::NoWork
    ));

    frontier.thaw("a.example").unwrap();
    assert_eq!(take(&frontier).await.host(), Some("a.example"));
}
