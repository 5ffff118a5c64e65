use crate::config::types::{
    AssignmentKind, Config, FrontierConfig, PolitenessConfig, PrecedenceConfig, PrecedenceKind,
    QueuesConfig, SeedsConfig, UserAgentConfig, WorkersConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_frontier_config(&config.frontier)?;
    validate_politeness_config(&config.politeness)?;
    validate_queues_config(&config.queues)?;
    validate_precedence_config(&config.precedence)?;
    validate_workers_config(&config.workers)?;
    validate_seeds(&config.seeds)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.next_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "next_timeout_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_delay_bounds(min: u64, max: u64, factor: f64, context: &str) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{}: min_delay_ms ({}) must be <= max_delay_ms ({})",
            context, min, max
        )));
    }

    if !factor.is_finite() || factor < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{}: delay_factor must be a finite number >= 0, got {}",
            context, factor
        )));
    }

    Ok(())
}

/// Validates politeness settings, including every per-host override
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    validate_delay_bounds(
        config.min_delay_ms,
        config.max_delay_ms,
        config.delay_factor,
        "politeness",
    )?;

    for entry in &config.overrides {
        validate_host_pattern(&entry.host)?;

        let context = format!("override for '{}'", entry.host);
        validate_delay_bounds(
            entry.min_delay_ms.unwrap_or(config.min_delay_ms),
            entry.max_delay_ms.unwrap_or(config.max_delay_ms),
            entry.delay_factor.unwrap_or(config.delay_factor),
            &context,
        )?;
    }

    Ok(())
}

fn validate_queues_config(config: &QueuesConfig) -> Result<(), ConfigError> {
    if config.assignment == AssignmentKind::Bucket && config.bucket_count < 1 {
        return Err(ConfigError::Validation(format!(
            "bucket_count must be >= 1, got {}",
            config.bucket_count
        )));
    }

    if config.in_memory_limit < 2 {
        return Err(ConfigError::Validation(format!(
            "in_memory_limit must be >= 2, got {}",
            config.in_memory_limit
        )));
    }

    if let Some(path) = &config.spill_path {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "spill_path cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_precedence_config(config: &PrecedenceConfig) -> Result<(), ConfigError> {
    if config.policy == PrecedenceKind::Preloaded {
        match &config.file {
            Some(file) if !file.is_empty() => {}
            _ => {
                return Err(ConfigError::Validation(
                    "precedence.file is required when policy = \"preloaded\"".to_string(),
                ))
            }
        }
    }

    Ok(())
}

fn validate_workers_config(config: &WorkersConfig) -> Result<(), ConfigError> {
    if config.count < 1 || config.count > 1024 {
        return Err(ConfigError::Validation(format!(
            "workers.count must be between 1 and 1024, got {}",
            config.count
        )));
    }

    Ok(())
}

/// Validates seed URLs
fn validate_seeds(seeds: &SeedsConfig) -> Result<(), ConfigError> {
    for seed in &seeds.urls {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use the http or https scheme",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_host_string(host)
}

/// Validates a host name (without wildcard prefix)
fn validate_host_string(host: &str) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::InvalidPattern("Host cannot be empty".to_string()));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot start or end with '.' or '-'",
            host
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' cannot contain consecutive dots",
            host
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolitenessOverride;

    fn create_test_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_max_attempts_must_be_positive() {
        let mut config = create_test_config();
        config.frontier.max_attempts = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_delay_bounds() {
        let mut config = create_test_config();
        config.politeness.min_delay_ms = 10_000;
        config.politeness.max_delay_ms = 1_000;
        assert!(validate(&config).is_err());

        let mut config = create_test_config();
        config.politeness.delay_factor = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = create_test_config();
        config.politeness.delay_factor = -1.0;
        assert!(validate(&config).is_err());

        let mut config = create_test_config();
        config.politeness.delay_factor = 0.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_override_inherits_bounds() {
        let mut config = create_test_config();
        config.politeness.overrides.push(PolitenessOverride {
            host: "*.example.com".to_string(),
            delay_factor: None,
            min_delay_ms: Some(60_000),
            max_delay_ms: None,
        });
        // 60s minimum against the inherited 30s maximum
        assert!(validate(&config).is_err());

        config.politeness.overrides[0].max_delay_ms = Some(120_000);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_queue_settings() {
        let mut config = create_test_config();
        config.queues.in_memory_limit = 1;
        assert!(validate(&config).is_err());

        let mut config = create_test_config();
        config.queues.assignment = AssignmentKind::Bucket;
        config.queues.bucket_count = 0;
        assert!(validate(&config).is_err());

        // bucket_count is ignored by other assignments
        config.queues.assignment = AssignmentKind::Hostname;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_preloaded_requires_file() {
        let mut config = create_test_config();
        config.precedence.policy = PrecedenceKind::Preloaded;
        assert!(validate(&config).is_err());

        config.precedence.file = Some("ranks.txt".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_worker_count_range() {
        let mut config = create_test_config();
        config.workers.count = 0;
        assert!(validate(&config).is_err());
        config.workers.count = 1025;
        assert!(validate(&config).is_err());
        config.workers.count = 1024;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_seed_urls() {
        let mut config = create_test_config();
        config.seeds.urls = vec!["http://example.com/".to_string()];
        assert!(validate(&config).is_ok());

        config.seeds.urls = vec!["ftp://example.com/".to_string()];
        assert!(validate(&config).is_err());

        config.seeds.urls = vec!["not a url".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_host_pattern() {
        assert!(validate_host_pattern("example.com").is_ok());
        assert!(validate_host_pattern("*.example.com").is_ok());
        assert!(validate_host_pattern("localhost").is_ok());

        assert!(validate_host_pattern("").is_err());
        assert!(validate_host_pattern("*.").is_err());
        assert!(validate_host_pattern(".example.com").is_err());
        assert!(validate_host_pattern("example.com.").is_err());
        assert!(validate_host_pattern("exa mple.com").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }
}
