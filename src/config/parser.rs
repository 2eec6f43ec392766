use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
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
/// use sitesift::config::load_config;
///
/// let config = load_config(Path::new("sitesift.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is recorded in the session report so runs can be traced back to
/// the exact configuration that produced them.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Folds command-line overrides into a configuration file hash
///
/// With no overrides the file hash is returned unchanged, so a run driven
/// purely by the file keeps the hash of that file. Otherwise the result is a
/// SHA-256 over the file hash and each `key=value` pair in the given order.
pub fn hash_with_overrides(file_hash: &str, overrides: &[(&str, String)]) -> String {
    if overrides.is_empty() {
        return file_hash.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(file_hash.as_bytes());
    for (key, value) in overrides {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use crate::config::StrategyMode;
    use crate::render::WaitPolicy;
    use crate::resources::ResourceKind;
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
[crawler]
seeds = ["https://example.com/"]
max-pages = 50
max-depth = 2
delay-ms = 250
timeout-ms = 5000
retry-attempts = 1
concurrency = 4
strategy = "rendered"
wait-for = "network-idle"
respect-robots-txt = true

[scope]
exclude-patterns = ["/cart", "*.aspx?print=*"]

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[resources]
kinds = ["image", "document", "media"]
max-size-bytes = 2048
concurrency = 3

[classifier]
similarity-threshold = 0.9

[output]
dir = "./crawl-output"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.seeds, vec!["https://example.com/"]);
        assert_eq!(config.crawler.max_pages, 50);
        assert_eq!(config.crawler.max_depth, 2);
        assert_eq!(config.crawler.strategy, StrategyMode::Rendered);
        assert_eq!(config.crawler.wait_for, WaitPolicy::NetworkIdle);
        assert!(config.crawler.respect_robots_txt);
        assert_eq!(config.scope.exclude_patterns.len(), 2);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(
            config.resources.kinds,
            vec![
                ResourceKind::Image,
                ResourceKind::Document,
                ResourceKind::Media
            ]
        );
        assert_eq!(config.resources.max_size_bytes, 2048);
        assert!((config.classifier.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.output.dir.to_str(), Some("./crawl-output"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[crawler]
seeds = ["http://site.test/"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_pages, 10);
        assert_eq!(config.crawler.delay_ms, 1000);
        assert_eq!(config.crawler.timeout_ms, 30_000);
        assert_eq!(config.crawler.retry_attempts, 2);
        assert_eq!(config.crawler.concurrency, 3);
        assert_eq!(config.crawler.strategy, StrategyMode::Auto);
        assert!(config.crawler.follow_links);
        assert!(!config.crawler.follow_external_links);
        assert_eq!(config.resources.concurrency, 2);
        assert_eq!(config.classifier.min_content_length, 20);
        assert_eq!(config.user_agent.crawler_name, "sitesift");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_seeds_is_a_parse_error() {
        let result = parse_config("[crawler]\nmax-pages = 5\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
seeds = ["https://example.com/"]
concurrency = 0
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
    fn test_hash_without_overrides_is_file_hash() {
        let file_hash = "ab".repeat(32);
        assert_eq!(hash_with_overrides(&file_hash, &[]), file_hash);
    }

    #[test]
    fn test_overrides_change_the_hash() {
        let file_hash = "ab".repeat(32);
        let seeds_a = hash_with_overrides(&file_hash, &[("seeds", "https://a.example/".to_string())]);
        let seeds_b = hash_with_overrides(&file_hash, &[("seeds", "https://b.example/".to_string())]);
        let output = hash_with_overrides(&file_hash, &[("output_dir", "https://a.example/".to_string())]);

        assert_ne!(seeds_a, file_hash);
        assert_ne!(seeds_a, seeds_b);
        assert_ne!(seeds_a, output);
        assert_eq!(seeds_a.len(), 64);
        assert_eq!(
            seeds_a,
            hash_with_overrides(&file_hash, &[("seeds", "https://a.example/".to_string())])
        );
    }
}
