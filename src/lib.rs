//! Sitesift: a site crawler and content extractor
//!
//! This crate discovers the pages of a target site, decides per page whether a
//! plain HTTP fetch is enough or a headless browser render is needed, downloads
//! embedded resources, and classifies the fetched content into structured records.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod output;
pub mod render;
pub mod resources;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Sitesift operations
#[derive(Debug, Error)]
pub enum SiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Render engine error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid URL state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::UrlState,
        to: state::UrlState,
    },

    #[error("URL is not tracked by the frontier: {0}")]
    UnknownUrl(String),

    #[error("Invalid crawl phase transition: {from:?} -> {to:?}")]
    InvalidPhase {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Per-URL failure taxonomy shared by the page fetcher and the resource downloader
///
/// These errors never abort a crawl. They are recorded in the session error log
/// and the affected URL or resource is marked failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The attempt did not finish within its timeout
    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Non-2xx response or connection-level failure
    #[error("network error: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// The response arrived but its content was unusable
    #[error("content error: {message}")]
    Content { message: String },

    /// A resource was larger than the configured cap
    #[error("size {actual} exceeds limit of {limit} bytes")]
    SizeExceeded { actual: u64, limit: u64 },

    /// The URL lies outside the crawl scope
    #[error("out of scope: {reason}")]
    ScopeViolation { reason: String },
}

impl FetchError {
    /// Builds a network error from an HTTP status code
    pub fn from_status(status: u16) -> Self {
        Self::Network {
            status: Some(status),
            message: format!("HTTP {}", status),
        }
    }

    /// Returns true if another attempt may succeed
    ///
    /// Timeouts, connection failures, 5xx and the throttling/early-data statuses
    /// (408, 425, 429) are retryable. Every other 4xx is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Network { status: None, .. } => true,
            Self::Network {
                status: Some(code), ..
            } => *code >= 500 || matches!(code, 408 | 425 | 429),
            Self::Content { .. } | Self::SizeExceeded { .. } | Self::ScopeViolation { .. } => {
                false
            }
        }
    }

    /// Short machine-readable label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Network { .. } => "network",
            Self::Content { .. } => "content",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::ScopeViolation { .. } => "scope_violation",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { elapsed_ms: 0 }
        } else if let Some(status) = err.status() {
            Self::Network {
                status: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            Self::Content {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                status: None,
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for Sitesift operations
pub type Result<T> = std::result::Result<T, SiftError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for single-URL fetch and download operations
pub type FetchOutcomeResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, FetchResult, Strategy};
pub use state::{CrawlPhase, CrawlSession, UrlState};
pub use url::{canonicalize, extract_host, UrlHint};
