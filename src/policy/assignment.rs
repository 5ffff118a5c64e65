//! Queue assignment policies
//!
//! A policy maps every URI to the class key of the work queue it waits in.
//! Keys are by host, by resolved IP address, or by a fixed set of hashed
//! buckets.

use crate::config::{AssignmentKind, QueuesConfig};
use crate::uri::CrawlUri;
use crate::url::authority_key;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Class key for URIs whose authority cannot be determined
pub const DEFAULT_CLASS_KEY: &str = "default...";

/// Decides which work queue a URI belongs to
///
/// Implementations must be pure and deterministic: the same URI always maps
/// to the same key, and no URI is ever rejected.
pub trait QueueAssignmentPolicy: Send + Sync + Debug {
    fn class_key_for(&self, uri: &CrawlUri) -> String;

    /// Learns the address a host resolved to; ignored unless keys depend on it
    fn record_address(&self, _host: &str, _addr: IpAddr) {}
}

/// Host (plus non-default port) of the URI; `dns:` URIs key on the looked-up name
fn host_key(uri: &CrawlUri) -> Option<String> {
    let url = uri.uri();
    if url.scheme() == "dns" {
        let name = url.path().trim().to_ascii_lowercase();
        return (!name.is_empty()).then_some(name);
    }
    authority_key(url)
}

/// One queue per host
#[derive(Debug, Default)]
pub struct HostnameAssignment;

impl QueueAssignmentPolicy for HostnameAssignment {
    fn class_key_for(&self, uri: &CrawlUri) -> String {
        host_key(uri).unwrap_or_else(|| DEFAULT_CLASS_KEY.to_string())
    }
}

/// One queue per IP address, falling back to the host until it is resolved
///
/// Addresses arrive through [`QueueAssignmentPolicy::record_address`], which
/// the frontier forwards from whatever connects to hosts. URIs scheduled
/// before their host is resolved stay in the host's queue.
#[derive(Debug, Default)]
pub struct IpAssignment {
    addresses: RwLock<HashMap<String, IpAddr>>,
}

impl IpAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    fn address_of(&self, host: &str) -> Option<IpAddr> {
        let addresses = self
            .addresses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        addresses.get(host).copied()
    }
}

impl QueueAssignmentPolicy for IpAssignment {
    fn record_address(&self, host: &str, addr: IpAddr) {
        let mut addresses = self
            .addresses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if addresses.insert(host.to_ascii_lowercase(), addr) != Some(addr) {
            debug!(host, %addr, "Recorded host address");
        }
    }

    fn class_key_for(&self, uri: &CrawlUri) -> String {
        let Some(host) = uri.host().map(|h| h.to_ascii_lowercase()) else {
            return HostnameAssignment.class_key_for(uri);
        };
        match self.address_of(&host) {
            Some(addr) => match uri.uri().port() {
                Some(port) => format!("{}:{}", addr, port),
                None => addr.to_string(),
            },
            None => HostnameAssignment.class_key_for(uri),
        }
    }
}

/// Fixed number of queues; hosts are hashed into buckets
#[derive(Debug)]
pub struct BucketAssignment {
    buckets: u32,
}

impl BucketAssignment {
    pub fn new(buckets: u32) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }
}

impl QueueAssignmentPolicy for BucketAssignment {
    fn class_key_for(&self, uri: &CrawlUri) -> String {
        let host = host_key(uri).unwrap_or_else(|| DEFAULT_CLASS_KEY.to_string());
        let digest = Sha256::digest(host.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = u64::from_be_bytes(head) % u64::from(self.buckets);
        trace!(host = %host, bucket, "Assigned bucket");
        bucket.to_string()
    }
}

/// Builds the configured assignment policy
pub fn assignment_from_config(config: &QueuesConfig) -> Arc<dyn QueueAssignmentPolicy> {
    match config.assignment {
        AssignmentKind::Hostname => Arc::new(HostnameAssignment),
        AssignmentKind::Ip => Arc::new(IpAssignment::new()),
        AssignmentKind::Bucket => Arc::new(BucketAssignment::new(config.bucket_count)),
    }
}
