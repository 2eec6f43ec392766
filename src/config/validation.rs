use crate::config::types::{
    ClassifierConfig, Config, CrawlerConfig, OutputConfig, ResourceConfig, ScopeConfig,
    UserAgentConfig,
};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
///
/// Configuration errors are the only fatal errors of a session, so everything
/// that can be checked before the first request is checked here.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawler_config(&config.crawler)?;
    validate_scope_config(&config.scope)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_resource_config(&config.resources)?;
    validate_classifier_config(&config.classifier)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &config.seeds {
        validate_seed(seed)?;
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.retry_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be <= 10, got {}",
            config.retry_attempts
        )));
    }

    if config.max_content_length == 0 {
        return Err(ConfigError::Validation(
            "max_content_length must be > 0".to_string(),
        ));
    }

    if config.session_budget_secs == Some(0) {
        return Err(ConfigError::Validation(
            "session_budget_secs must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates a seed URL: absolute, http(s), with a host
fn validate_seed(seed: &str) -> ConfigResult<()> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

/// Validates include/exclude patterns
fn validate_scope_config(config: &ScopeConfig) -> ConfigResult<()> {
    for pattern in config
        .include_patterns
        .iter()
        .chain(config.exclude_patterns.iter())
    {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern(
                "Scope pattern cannot be empty".to_string(),
            ));
        }

        if pattern.chars().all(|c| c == '*') {
            return Err(ConfigError::InvalidPattern(format!(
                "Scope pattern '{}' matches everything",
                pattern
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    if let Some(custom) = &config.override_string {
        if custom.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user agent override cannot be empty".to_string(),
            ));
        }
        return Ok(());
    }

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

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(email) = &config.contact_email {
        validate_email(email)?;
    }

    Ok(())
}

/// Validates resource download configuration
fn validate_resource_config(config: &ResourceConfig) -> ConfigResult<()> {
    if config.max_size_bytes == 0 {
        return Err(ConfigError::Validation(
            "resources.max_size_bytes must be > 0".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "resources.concurrency must be between 1 and 32, got {}",
            config.concurrency
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "resources.batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "resources.timeout_ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    Ok(())
}

/// Validates classifier configuration
fn validate_classifier_config(config: &ClassifierConfig) -> ConfigResult<()> {
    if !(config.similarity_threshold > 0.0 && config.similarity_threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "similarity_threshold must be in (0, 1], got {}",
            config.similarity_threshold
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> ConfigResult<()> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
