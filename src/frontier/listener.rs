//! Per-URI outcome notifications

use crate::uri::{CrawlUri, Disposition};

/// Receives the disposition of every finished URI
///
/// Called synchronously on the worker that reported the outcome, after the
/// frontier has released its locks. Implementations must return quickly and
/// must not keep the URI beyond the call.
pub trait DispositionListener: Send + Sync {
    fn on_disposition(&self, uri: &CrawlUri, disposition: Disposition);
}

impl<F> DispositionListener for F
where
    F: Fn(&CrawlUri, Disposition) + Send + Sync,
{
    fn on_disposition(&self, uri: &CrawlUri, disposition: Disposition) {
        self(uri, disposition)
    }
}
