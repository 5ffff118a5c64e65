use crate::uri::{FetchStatus, Hop, HopPath};
use crate::{UriError, UriResult};
use std::fmt;
use std::time::Duration;
use url::Url;

/// A URI travelling through the frontier, plus its crawl bookkeeping
///
/// The URI itself and its class key never change once set. Everything else
/// is scratch state updated by the frontier (precedence, attempts) or by the
/// fetch collaborator (status, duration, content length).
#[derive(Debug, Clone)]
pub struct CrawlUri {
    uri: Url,

    /// URI this one was discovered from; diagnostics only
    via: Option<String>,

    class_key: Option<String>,

    /// How this URI was reached from its seed
    pub path_from_seed: HopPath,

    /// Lower is more urgent
    pub precedence: i32,

    /// Number of completed attempts that ended in a retryable failure
    pub fetch_attempts: u32,

    /// Outcome of the most recent attempt
    pub fetch_status: FetchStatus,

    /// Wall-clock duration of the most recent attempt
    pub fetch_duration: Option<Duration>,

    /// Bytes received by the most recent attempt
    pub content_length: Option<u64>,
}

impl CrawlUri {
    /// Creates a seed URI (empty hop path, no precursor)
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            via: None,
            class_key: None,
            path_from_seed: HopPath::new(),
            precedence: 0,
            fetch_attempts: 0,
            fetch_status: FetchStatus::Unattempted,
            fetch_duration: None,
            content_length: None,
        }
    }

    /// Parses a seed URI from a string
    pub fn parse(s: &str) -> UriResult<Self> {
        let uri = Url::parse(s.trim()).map_err(|e| UriError::Parse(format!("{}: {}", s, e)))?;
        Ok(Self::new(uri))
    }

    /// Creates a URI discovered from this one
    pub fn derive(&self, uri: Url, hop: Hop) -> Self {
        let mut child = Self::new(uri);
        child.via = Some(self.uri.to_string());
        child.path_from_seed = self.path_from_seed.with(hop);
        child
    }

    /// Rebuilds a URI from persisted fields
    pub(crate) fn restore(
        uri: &str,
        via: Option<String>,
        path: &str,
        class_key: Option<String>,
        precedence: i32,
        fetch_attempts: u32,
        fetch_status: FetchStatus,
    ) -> UriResult<Self> {
        let mut curi = Self::parse(uri)?;
        curi.via = via;
        curi.path_from_seed = HopPath::parse(path)?;
        curi.class_key = class_key;
        curi.precedence = precedence;
        curi.fetch_attempts = fetch_attempts;
        curi.fetch_status = fetch_status;
        Ok(curi)
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn as_str(&self) -> &str {
        self.uri.as_str()
    }

    pub fn via(&self) -> Option<&str> {
        self.via.as_deref()
    }

    pub fn class_key(&self) -> Option<&str> {
        self.class_key.as_deref()
    }

    /// Stamps the class key; later calls are ignored
    pub(crate) fn assign_class_key(&mut self, key: String) {
        if self.class_key.is_none() {
            self.class_key = Some(key);
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.uri.host_str()
    }

    /// Returns `scheme://authority` or None for URIs without an authority
    pub fn scheme_and_authority(&self) -> Option<String> {
        let host = self.uri.host_str()?;
        Some(match self.uri.port() {
            Some(port) => format!("{}://{}:{}", self.uri.scheme(), host, port),
            None => format!("{}://{}", self.uri.scheme(), host),
        })
    }

    /// Records the outcome of a fetch attempt
    pub fn record_fetch(
        &mut self,
        status: FetchStatus,
        duration: Duration,
        content_length: Option<u64>,
    ) {
        self.fetch_status = status;
        self.fetch_duration = Some(duration);
        self.content_length = content_length;
    }

    /// Clears per-attempt results before the URI is requeued
    pub(crate) fn reset_fetch_metrics(&mut self) {
        self.fetch_duration = None;
        self.content_length = None;
    }
}

impl fmt::Display for CrawlUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}
