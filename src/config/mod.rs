//! Configuration module for the frontier
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_frontier::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("frontier.toml")).unwrap();
//! println!("Minimum politeness delay: {}ms", config.politeness.min_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AssignmentKind, CheckpointConfig, Config, FrontierConfig, PolitenessConfig,
    PolitenessOverride, PrecedenceConfig, PrecedenceKind, QueuesConfig, SeedsConfig,
    UserAgentConfig, WorkersConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
