//! Worker pool pulling URIs from the frontier
//!
//! This module handles:
//! - The [`Processor`] seam through which workers run the external fetch chain
//! - A fixed pool of workers looping over `next`, `process`, `finished`
//! - A reference HTTP processor built on reqwest

mod http;
mod pool;

pub use http::{build_http_client, HttpProcessor};
pub use pool::{WorkerPool, WorkerReport, WorkerStep};

use crate::frontier::Frontier;
use crate::uri::CrawlUri;
use async_trait::async_trait;

/// The processing chain a worker runs on each URI
///
/// Implementations record the outcome on `curi` (status, duration, content
/// length) and may schedule newly discovered URIs through `frontier`. The
/// worker reports the URI back with `finished` afterwards.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, curi: &mut CrawlUri, frontier: &Frontier);
}
