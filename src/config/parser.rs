use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_frontier::config::load_config;
///
/// let config = load_config(Path::new("frontier.toml")).unwrap();
/// println!("Workers: {}", config.workers.count);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with each checkpoint so a resumed crawl can tell whether its
/// configuration changed since the checkpoint was written.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssignmentKind, PrecedenceKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[frontier]
max-attempts = 5
retry-delay-ms = 900

[politeness]
delay-factor = 2.5
min-delay-ms = 500
max-delay-ms = 20000

[[politeness.overrides]]
host = "*.example.com"
min-delay-ms = 100

[queues]
assignment = "bucket"
bucket-count = 16
in-memory-limit = 50

[precedence]
policy = "hops"
base = 3

[workers]
count = 8

[seeds]
urls = ["https://example.com/"]

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.frontier.max_attempts, 5);
        assert_eq!(config.frontier.retry_delay_ms, 900);
        assert_eq!(config.frontier.next_timeout_ms, 1000);
        assert_eq!(config.politeness.delay_factor, 2.5);
        assert_eq!(config.politeness.overrides.len(), 1);
        assert_eq!(config.politeness.overrides[0].min_delay_ms, Some(100));
        assert!(config.politeness.overrides[0].delay_factor.is_none());
        assert_eq!(config.queues.assignment, AssignmentKind::Bucket);
        assert_eq!(config.queues.bucket_count, 16);
        assert_eq!(config.precedence.policy, PrecedenceKind::Hops);
        assert_eq!(config.precedence.base, 3);
        assert_eq!(config.workers.count, 8);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.frontier.max_attempts, 3);
        assert_eq!(config.politeness.min_delay_ms, 3000);
        assert_eq!(config.queues.assignment, AssignmentKind::Hostname);
        assert_eq!(config.precedence.base, 1);
        assert!(config.seeds.urls.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/frontier.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_assignment_is_a_parse_error() {
        let result = parse_config("[queues]\nassignment = \"by-moon-phase\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[politeness]
min-delay-ms = 5000
max-delay-ms = 1000
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config("[workers]\ncount = 2\n");
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.workers.count, 2);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }
}
