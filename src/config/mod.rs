//! Configuration module for Sitesift
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every option except `crawler.seeds` has a default.
//!
//! # Example
//!
//! ```no_run
//! use sitesift::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitesift.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, ClassifierConfig, Config, CrawlerConfig, OutputConfig, ResourceConfig,
    ScopeConfig, StrategyMode, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, hash_with_overrides, load_config, load_config_with_hash, parse_config,
};
pub use validation::validate;
