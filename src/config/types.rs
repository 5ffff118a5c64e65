use serde::Deserialize;

/// Main configuration structure for the frontier
///
/// Every section is optional in the TOML file; omitted sections take the
/// defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub frontier: FrontierConfig,
    pub politeness: PolitenessConfig,
    pub queues: QueuesConfig,
    pub precedence: PrecedenceConfig,
    pub workers: WorkersConfig,
    pub checkpoint: CheckpointConfig,
    pub seeds: SeedsConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Retry and housekeeping settings for the frontier itself
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    /// Total fetch attempts before a retryable failure becomes terminal
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Extra wait after connection-level failures (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// How long a worker waits in `next` before reporting no work (milliseconds)
    #[serde(rename = "next-timeout-ms")]
    pub next_timeout_ms: u64,

    /// Maximum number of EMPTY queues kept around before the oldest are evicted
    #[serde(rename = "max-retained-empty-queues")]
    pub max_retained_empty_queues: usize,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 0,
            next_timeout_ms: 1000,
            max_retained_empty_queues: 10_000,
        }
    }
}

/// Politeness delay settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Multiple of the last fetch duration to wait before the next fetch
    #[serde(rename = "delay-factor")]
    pub delay_factor: f64,

    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Per-host bandwidth ceiling; 0 disables the bandwidth term
    #[serde(rename = "max-per-host-bandwidth-kb-sec")]
    pub max_per_host_bandwidth_kb_sec: u64,

    /// Per-host overrides, first match wins
    pub overrides: Vec<PolitenessOverride>,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay_factor: 5.0,
            min_delay_ms: 3000,
            max_delay_ms: 30_000,
            max_per_host_bandwidth_kb_sec: 0,
            overrides: Vec::new(),
        }
    }
}

/// Politeness settings for hosts matching a pattern
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessOverride {
    /// Host pattern (e.g., "example.com" or "*.example.com")
    pub host: String,

    #[serde(rename = "delay-factor")]
    pub delay_factor: Option<f64>,

    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: Option<u64>,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: Option<u64>,
}

/// How URIs are grouped into queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    #[default]
    Hostname,
    Ip,
    Bucket,
}

/// Work queue settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub assignment: AssignmentKind,

    /// Number of buckets for the bucket assignment
    #[serde(rename = "bucket-count")]
    pub bucket_count: u32,

    /// URIs a queue keeps in memory before spilling the rest to disk
    #[serde(rename = "in-memory-limit")]
    pub in_memory_limit: usize,

    /// SQLite file for spilled URIs; in-memory SQLite when absent
    #[serde(rename = "spill-path")]
    pub spill_path: Option<String>,

    /// URIs a queue may emit per activation (0 = unlimited)
    #[serde(rename = "session-budget")]
    pub session_budget: u64,

    /// URIs a queue may ever emit (0 = unlimited)
    #[serde(rename = "total-budget")]
    pub total_budget: u64,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            assignment: AssignmentKind::Hostname,
            bucket_count: 64,
            in_memory_limit: 1000,
            spill_path: None,
            session_budget: 0,
            total_budget: 0,
        }
    }
}

/// Which precedence policy stamps newly scheduled URIs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecedenceKind {
    #[default]
    Base,
    Hops,
    Preloaded,
}

/// Precedence policy settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrecedenceConfig {
    pub policy: PrecedenceKind,

    /// Precedence for URIs with no better information
    pub base: i32,

    /// Ranking file for the preloaded policy
    pub file: Option<String>,

    /// Negate ranking values whose larger numbers mean more important
    #[serde(rename = "higher-is-more-urgent")]
    pub higher_is_more_urgent: bool,
}

impl Default for PrecedenceConfig {
    fn default() -> Self {
        Self {
            policy: PrecedenceKind::Base,
            base: 1,
            file: None,
            higher_is_more_urgent: false,
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Checkpoint settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Path to the SQLite checkpoint database
    pub path: Option<String>,
}

/// Seed URIs scheduled at the start of a fresh crawl
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    pub urls: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiFrontier".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}
