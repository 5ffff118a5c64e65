//! Frontier statistics and terminal printing

use crate::frontier::{CounterSnapshot, FrontierSnapshot, QueueSnapshot, WorkQueue};
use crate::state::QueueState;
use crate::storage::CheckpointRecord;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time frontier statistics
#[derive(Debug, Clone)]
pub struct FrontierReport {
    /// Number of queues in each state
    pub queues_by_state: Vec<(QueueState, usize)>,

    pub total_queues: usize,

    /// URIs waiting in queues
    pub queued: usize,

    /// URIs currently held by workers
    pub in_flight: usize,

    pub counters: CounterSnapshot,

    pub paused: bool,
}

impl FrontierReport {
    pub fn count_in(&self, state: QueueState) -> usize {
        self.queues_by_state
            .iter()
            .find(|(s, _)| *s == state)
            .map_or(0, |(_, count)| *count)
    }

    /// Finished URIs: succeeded, failed and disregarded
    pub fn finished(&self) -> u64 {
        self.counters.succeeded + self.counters.failed + self.counters.disregarded
    }
}

/// One queue's state on a single line
#[derive(Debug, Clone)]
pub struct QueueSummary {
    pub class_key: String,
    pub state: QueueState,
    pub queued: usize,

    /// Of `queued`, how many live in the spill store
    pub spilled: usize,

    pub in_flight: Option<String>,
    pub head: Option<String>,
    pub wake_in: Option<Duration>,
    pub session_balance: u64,
    pub total_spent: u64,
    pub retired: bool,
}

impl QueueSummary {
    pub(crate) fn from_queue(queue: &WorkQueue, now: Instant) -> Self {
        Self {
            class_key: queue.class_key().to_string(),
            state: queue.state(),
            queued: queue.len(),
            spilled: queue.spilled_len(),
            in_flight: queue.in_flight.as_ref().map(|(_, uri)| uri.to_string()),
            head: queue.head().map(|uri| uri.to_string()),
            wake_in: queue
                .wake_time
                .map(|wake| wake.saturating_duration_since(now))
                .filter(|left| !left.is_zero()),
            session_balance: queue.session_balance(),
            total_spent: queue.total_spent(),
            retired: queue.retired(),
        }
    }

    pub fn from_snapshot(snapshot: &QueueSnapshot) -> Self {
        let in_flight = snapshot
            .uris
            .iter()
            .find(|p| p.in_flight)
            .map(|p| p.uri.to_string());
        let head = snapshot
            .uris
            .iter()
            .find(|p| !p.in_flight)
            .map(|p| p.uri.to_string());

        Self {
            class_key: snapshot.class_key.clone(),
            state: snapshot.state,
            queued: snapshot.uris.iter().filter(|p| !p.in_flight).count(),
            spilled: 0,
            in_flight,
            head,
            wake_in: snapshot.wake_in,
            session_balance: snapshot.session_balance,
            total_spent: snapshot.total_spent,
            retired: snapshot.retired,
        }
    }

    pub fn single_line(&self) -> String {
        let mut line = format!("{} {} {} queued", self.class_key, self.state, self.queued);
        if self.spilled > 0 {
            line.push_str(&format!(" ({} spilled)", self.spilled));
        }
        if let Some(wake_in) = self.wake_in {
            line.push_str(&format!(", wakes in {}ms", wake_in.as_millis()));
        }
        line.push_str(&format!(", {} emitted", self.total_spent));
        if self.retired {
            line.push_str(", retired");
        }
        if let Some(uri) = &self.in_flight {
            line.push_str(&format!(", in flight: {}", uri));
        } else if let Some(uri) = &self.head {
            line.push_str(&format!(", next: {}", uri));
        }
        line
    }
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &FrontierReport) {
    println!("=== Frontier Statistics ===\n");

    println!("Overview:");
    println!("  URIs discovered: {}", report.counters.discovered);
    println!("  URIs queued: {}", report.queued);
    println!("  URIs in flight: {}", report.in_flight);
    println!("  Total queues: {}", report.total_queues);
    if report.paused {
        println!("  (paused)");
    }
    println!();

    println!("Queues by State:");
    let mut state_counts: Vec<_> = report
        .queues_by_state
        .iter()
        .filter(|(_, count)| *count > 0)
        .collect();
    state_counts.sort_by(|a, b| b.1.cmp(&a.1));

    for (state, count) in state_counts {
        let percentage = if report.total_queues > 0 {
            (*count as f64 / report.total_queues as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    println!("Dispositions:");
    println!("  Succeeded: {}", report.counters.succeeded);
    println!("  Failed: {}", report.counters.failed);
    println!("  Disregarded: {}", report.counters.disregarded);

    let finished = report.finished();
    let success_rate = if finished > 0 {
        (report.counters.succeeded as f64 / finished as f64) * 100.0
    } else {
        0.0
    };
    println!("  Success rate: {:.1}%", success_rate);
}

/// Prints up to `limit` queue summaries, longest queues first
pub fn print_queue_summaries(summaries: &[QueueSummary], limit: usize) {
    let mut sorted: Vec<&QueueSummary> = summaries.iter().collect();
    sorted.sort_by(|a, b| b.queued.cmp(&a.queued).then_with(|| a.class_key.cmp(&b.class_key)));

    println!("Queues ({}):", summaries.len());
    for summary in sorted.iter().take(limit) {
        println!("  {}", summary.single_line());
    }
    if summaries.len() > limit {
        println!("  ... and {} more", summaries.len() - limit);
    }
}

/// Prints a saved checkpoint
pub fn print_checkpoint(record: &CheckpointRecord, snapshot: &FrontierSnapshot) {
    println!("=== Checkpoint {} ===\n", record.id);
    println!("  Created: {}", record.created_at);
    println!("  Config hash: {}", record.config_hash);
    println!("  Queues: {}", record.queue_count);
    println!("  URIs: {}", record.uri_count);
    println!("  Seen fingerprints: {}", snapshot.seen.len());
    println!(
        "  Discovered / succeeded / failed / disregarded: {} / {} / {} / {}",
        record.counters.discovered,
        record.counters.succeeded,
        record.counters.failed,
        record.counters.disregarded
    );
    println!();

    let summaries: Vec<QueueSummary> = snapshot
        .queues
        .iter()
        .map(QueueSummary::from_snapshot)
        .collect();
    print_queue_summaries(&summaries, 25);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::{PendingUri, SortKey};
    use crate::uri::CrawlUri;

    #[test]
    fn test_count_in() {
        let report = FrontierReport {
            queues_by_state: vec![(QueueState::Ready, 3), (QueueState::Snoozed, 2)],
            total_queues: 5,
            queued: 10,
            in_flight: 0,
            counters: CounterSnapshot {
                discovered: 20,
                succeeded: 6,
                failed: 2,
                disregarded: 2,
            },
            paused: false,
        };
        assert_eq!(report.count_in(QueueState::Ready), 3);
        assert_eq!(report.count_in(QueueState::Frozen), 0);
        assert_eq!(report.finished(), 10);
    }

    #[test]
    fn test_summary_from_snapshot() {
        let snapshot = QueueSnapshot {
            class_key: "example.com".to_string(),
            state: QueueState::Snoozed,
            wake_in: Some(Duration::from_millis(1500)),
            session_balance: 0,
            total_spent: 4,
            retired: false,
            uris: vec![
                PendingUri {
                    key: SortKey::new(1, 0),
                    uri: CrawlUri::parse("https://example.com/a").unwrap(),
                    in_flight: true,
                },
                PendingUri {
                    key: SortKey::new(1, 1),
                    uri: CrawlUri::parse("https://example.com/b").unwrap(),
                    in_flight: false,
                },
            ],
        };

        let summary = QueueSummary::from_snapshot(&snapshot);
        assert_eq!(summary.queued, 1);
        assert_eq!(
            summary.single_line(),
            "example.com SNOOZED 1 queued, wakes in 1500ms, 4 emitted, in flight: https://example.com/a"
        );
    }
}
