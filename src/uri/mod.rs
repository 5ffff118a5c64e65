//! URI module
//!
//! - `CrawlUri`: a URI plus the bookkeeping the frontier and fetchers attach to it
//! - `Hop` / `HopPath`: how a URI was reached from its seed
//! - `FetchStatus` / `Disposition`: fetch outcomes and how `finished` treats them

mod crawl_uri;
mod hop;
mod status;

pub use crawl_uri::CrawlUri;
pub use hop::{Hop, HopPath};
pub use status::{Disposition, FetchStatus};
