//! Host handling for URLs
//!
//! Host extraction feeds queue assignment; host patterns select per-host
//! politeness overrides.

mod host;

pub use host::{authority_key, extract_host, matches_host_pattern};
