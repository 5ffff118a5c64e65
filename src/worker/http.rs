//! Reference HTTP processor
//!
//! Performs a plain GET and records the outcome on the URI. Redirect targets
//! are scheduled as new URIs; content extraction is left to other processors.
//! The address each host was reached at is passed to the frontier for
//! address-keyed queue assignment.

use crate::config::UserAgentConfig;
use crate::frontier::Frontier;
use crate::uri::{CrawlUri, FetchStatus, Hop};
use crate::worker::Processor;
use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect::Policy, Client};
use std::error::Error as _;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Builds an HTTP client identifying the crawler
///
/// Redirects are not followed; the processor schedules the target instead so
/// that it goes through its own queue.
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches each URI with one GET request
pub struct HttpProcessor {
    client: Client,
}

impl HttpProcessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> crate::Result<Self> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

/// Maps a transport error onto a fetch status
fn classify_error(e: &reqwest::Error) -> FetchStatus {
    if e.is_timeout() {
        return FetchStatus::Timeout;
    }
    if e.is_builder() {
        return FetchStatus::Unfetchable;
    }
    if e.is_connect() {
        let mut source = e.source();
        while let Some(cause) = source {
            if cause.to_string().contains("dns error") {
                return FetchStatus::DomainUnresolvable;
            }
            source = cause.source();
        }
        return FetchStatus::ConnectFailed;
    }
    if e.is_body() || e.is_decode() {
        return FetchStatus::ConnectLost;
    }
    FetchStatus::RuntimeError
}

#[async_trait]
impl Processor for HttpProcessor {
    async fn process(&self, curi: &mut CrawlUri, frontier: &Frontier) {
        if !matches!(curi.uri().scheme(), "http" | "https") {
            curi.fetch_status = FetchStatus::Unfetchable;
            return;
        }

        let started = Instant::now();
        let response = match self.client.get(curi.uri().clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let status = classify_error(&e);
                debug!(uri = %curi, error = %e, status = %status, "Fetch failed");
                curi.record_fetch(status, started.elapsed(), None);
                return;
            }
        };

        if let (Some(host), Some(addr)) = (curi.host(), response.remote_addr()) {
            frontier.record_address(host, addr.ip());
        }

        let code = response.status();
        let redirect = if code.is_redirection() {
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| curi.uri().join(location).ok())
        } else {
            None
        };

        match response.bytes().await {
            Ok(body) => {
                trace!(uri = %curi, status = code.as_u16(), bytes = body.len(), "Fetched");
                curi.record_fetch(
                    FetchStatus::Success(code.as_u16()),
                    started.elapsed(),
                    Some(body.len() as u64),
                );
            }
            Err(e) => {
                debug!(uri = %curi, error = %e, "Connection lost while reading body");
                curi.record_fetch(FetchStatus::ConnectLost, started.elapsed(), None);
            }
        }

        if let Some(target) = redirect {
            debug!(from = %curi, to = %target, "Scheduling redirect target");
            frontier.schedule(curi.derive(target, Hop::Redirect));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssignmentKind, Config};
    use crate::frontier::NextUri;
    use crate::policy::{BasePrecedence, HostnameAssignment};
    use crate::state::QueueState;
    use crate::storage::SqliteSpillStore;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.politeness.min_delay_ms = 0;
        config.politeness.delay_factor = 0.0;
        config
    }

    fn create_test_frontier() -> Frontier {
        Frontier::with_policies(
            &create_test_config(),
            Arc::new(HostnameAssignment),
            Arc::new(BasePrecedence::default()),
            Box::new(SqliteSpillStore::in_memory().unwrap()),
        )
    }

    fn create_test_processor() -> HttpProcessor {
        HttpProcessor::from_config(&UserAgentConfig::default(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_success_records_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let frontier = create_test_frontier();
        let mut curi = CrawlUri::parse(&format!("{}/page", server.uri())).unwrap();
        create_test_processor().process(&mut curi, &frontier).await;

        assert_eq!(curi.fetch_status, FetchStatus::Success(200));
        assert_eq!(curi.content_length, Some(11));
        assert!(curi.fetch_duration.is_some());
    }

    #[tokio::test]
    async fn test_http_error_is_still_a_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let frontier = create_test_frontier();
        let mut curi = CrawlUri::parse(&format!("{}/missing", server.uri())).unwrap();
        create_test_processor().process(&mut curi, &frontier).await;
        assert_eq!(curi.fetch_status, FetchStatus::Success(404));
    }

    #[tokio::test]
    async fn test_redirect_target_is_scheduled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
            .mount(&server)
            .await;

        let frontier = create_test_frontier();
        let mut curi = CrawlUri::parse(&format!("{}/old", server.uri())).unwrap();
        create_test_processor().process(&mut curi, &frontier).await;

        assert_eq!(curi.fetch_status, FetchStatus::Success(301));
        match frontier.next(Duration::from_secs(1)).await {
            NextUri::Uri(target) => {
                assert_eq!(target.uri().path(), "/new");
                assert_eq!(target.path_from_seed.as_str(), "R");
            }
            other => panic!("expected redirect target, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        // Bind and drop a listener to find a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let frontier = create_test_frontier();
        let mut curi = CrawlUri::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        create_test_processor().process(&mut curi, &frontier).await;
        assert_eq!(curi.fetch_status, FetchStatus::ConnectFailed);
        assert!(curi.fetch_status.is_retryable());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_unfetchable() {
        let frontier = create_test_frontier();
        let mut curi = CrawlUri::parse("ftp://example.com/file").unwrap();
        create_test_processor().process(&mut curi, &frontier).await;
        assert_eq!(curi.fetch_status, FetchStatus::Unfetchable);
    }

    #[tokio::test]
    async fn test_fetch_feeds_ip_assignment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let port = server.address().port();

        let mut config = create_test_config();
        config.queues.assignment = AssignmentKind::Ip;
        let frontier = Frontier::new(&config).unwrap();

        let mut curi = CrawlUri::parse(&format!("http://localhost:{}/first", port)).unwrap();
        create_test_processor().process(&mut curi, &frontier).await;
        assert_eq!(curi.fetch_status, FetchStatus::Success(200));

        frontier.schedule(CrawlUri::parse(&format!("http://localhost:{}/second", port)).unwrap());
        let by_address = format!("{}:{}", server.address().ip(), port);
        assert_eq!(frontier.queue_state(&by_address), Some(QueueState::Ready));
        assert_eq!(frontier.queue_state(&format!("localhost:{}", port)), None);
    }
}
