//! Politeness delay computation
//!
//! After every fetch a queue rests for a delay derived from how long the
//! host took to answer, bounded per host by configurable overrides.

use crate::config::PolitenessConfig;
use crate::uri::CrawlUri;
use crate::url::matches_host_pattern;
use std::time::Duration;

/// Delay bounds for one host (or the crawl-wide default)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayParams {
    pub delay_factor: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Computes how long a queue waits after a fetch before it is offered again
///
/// The delay scales with the host's own response time:
/// `max(min_delay, duration * factor)` clamped to `max_delay`. When a
/// bandwidth ceiling is configured, large responses may extend the delay
/// beyond `max_delay`.
#[derive(Debug, Clone)]
pub struct PolitenessPolicy {
    default: DelayParams,
    overrides: Vec<(String, DelayParams)>,
    max_bandwidth_kb_sec: u64,
}

impl PolitenessPolicy {
    pub fn new(config: &PolitenessConfig) -> Self {
        let default = DelayParams {
            delay_factor: config.delay_factor,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        };

        let overrides = config
            .overrides
            .iter()
            .map(|o| {
                (
                    o.host.clone(),
                    DelayParams {
                        delay_factor: o.delay_factor.unwrap_or(default.delay_factor),
                        min_delay_ms: o.min_delay_ms.unwrap_or(default.min_delay_ms),
                        max_delay_ms: o.max_delay_ms.unwrap_or(default.max_delay_ms),
                    },
                )
            })
            .collect();

        Self {
            default,
            overrides,
            max_bandwidth_kb_sec: config.max_per_host_bandwidth_kb_sec,
        }
    }

    /// Returns the delay parameters for a host, first matching override wins
    pub fn params_for(&self, host: Option<&str>) -> DelayParams {
        host.and_then(|host| {
            self.overrides
                .iter()
                .find(|(pattern, _)| matches_host_pattern(pattern, host))
                .map(|(_, params)| *params)
        })
        .unwrap_or(self.default)
    }

    /// Politeness delay after `uri` was fetched
    ///
    /// A URI without a recorded duration counts as a zero-length fetch, so
    /// the minimum delay still applies.
    pub fn delay_for(&self, uri: &CrawlUri) -> Duration {
        let params = self.params_for(uri.host());

        let duration_ms = uri
            .fetch_duration
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);
        let scaled = (duration_ms * params.delay_factor).round() as u64;
        let mut delay_ms = scaled.max(params.min_delay_ms).min(params.max_delay_ms);

        if self.max_bandwidth_kb_sec > 0 {
            if let Some(length) = uri.content_length {
                // bytes / (KB/s * 1.024) = milliseconds
                let bandwidth_ms = u128::from(length) * 1000
                    / (u128::from(self.max_bandwidth_kb_sec) * 1024);
                delay_ms = delay_ms.max(u64::try_from(bandwidth_ms).unwrap_or(u64::MAX));
            }
        }

        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolitenessOverride;
    use crate::uri::FetchStatus;

    fn create_test_config() -> PolitenessConfig {
        PolitenessConfig {
            delay_factor: 5.0,
            min_delay_ms: 1000,
            max_delay_ms: 10_000,
            max_per_host_bandwidth_kb_sec: 0,
            overrides: Vec::new(),
        }
    }

    fn fetched(uri: &str, duration_ms: u64, length: Option<u64>) -> CrawlUri {
        let mut curi = CrawlUri::parse(uri).unwrap();
        curi.record_fetch(
            FetchStatus::Success(200),
            Duration::from_millis(duration_ms),
            length,
        );
        curi
    }

    #[test]
    fn test_minimum_delay_applies_to_fast_fetches() {
        let policy = PolitenessPolicy::new(&create_test_config());
        let uri = fetched("https://example.com/", 50, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_scales_with_duration() {
        let policy = PolitenessPolicy::new(&create_test_config());
        let uri = fetched("https://example.com/", 400, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_clamped_to_maximum() {
        let policy = PolitenessPolicy::new(&create_test_config());
        let uri = fetched("https://example.com/", 60_000, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(10_000));
    }

    #[test]
    fn test_missing_duration_uses_minimum() {
        let policy = PolitenessPolicy::new(&create_test_config());
        let uri = CrawlUri::parse("https://example.com/").unwrap();
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(1000));
    }

    #[test]
    fn test_host_override() {
        let mut config = create_test_config();
        config.overrides.push(PolitenessOverride {
            host: "*.slow.org".to_string(),
            delay_factor: Some(1.0),
            min_delay_ms: Some(100),
            max_delay_ms: None,
        });
        let policy = PolitenessPolicy::new(&config);

        let uri = fetched("https://www.slow.org/", 50, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(100));

        let uri = fetched("https://www.slow.org/", 20_000, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(10_000));

        let uri = fetched("https://example.com/", 50, None);
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(1000));
    }

    #[test]
    fn test_bandwidth_limit_extends_past_maximum() {
        let mut config = create_test_config();
        config.max_per_host_bandwidth_kb_sec = 10;
        let policy = PolitenessPolicy::new(&config);

        // 1,024,000 bytes at 10 KB/s is 100 seconds
        let uri = fetched("https://example.com/", 50, Some(1_024_000));
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(100_000));

        let uri = fetched("https://example.com/", 50, Some(1024));
        assert_eq!(policy.delay_for(&uri), Duration::from_millis(1000));
    }
}
