//! Sumi-Frontier: a polite, host-isolating crawl frontier
//!
//! This crate decides which URI each crawl worker fetches next. URIs are
//! bucketed into per-host work queues, at most one URI per queue is ever in
//! flight, and each queue sleeps for a politeness delay derived from the
//! host's own response time before it is offered again.

pub mod config;
pub mod frontier;
pub mod output;
pub mod policy;
pub mod state;
pub mod storage;
pub mod uri;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URI error: {0}")]
    Uri(#[from] UriError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Precedence file {path}, line {line}: {message}")]
    PrecedenceFile {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Invalid queue state transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: String,
        from: state::QueueState,
        to: state::QueueState,
    },

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URI-specific errors
#[derive(Debug, Error)]
pub enum UriError {
    #[error("Failed to parse URI: {0}")]
    Parse(String),

    #[error("Invalid hop character: {0:?}")]
    InvalidHop(char),

    #[error("Missing host in URI: {0}")]
    MissingHost(String),
}

/// Result type alias for frontier operations
pub type Result<T> = std::result::Result<T, FrontierError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URI operations
pub type UriResult<T> = std::result::Result<T, UriError>;

// Re-export commonly used types
pub use config::Config;
pub use frontier::{Frontier, NextUri};
pub use state::QueueState;
pub use uri::{CrawlUri, Disposition, FetchStatus, Hop};
