use crate::render::WaitPolicy;
use crate::resources::ResourceKind;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Sitesift
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Builds a configuration with default settings for the given seeds
    pub fn for_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            crawler: CrawlerConfig {
                seeds: seeds.into_iter().map(Into::into).collect(),
                ..CrawlerConfig::default()
            },
            ..Self::default()
        }
    }
}

/// How each page's fetch strategy is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Probe each host and score both strategies
    #[default]
    Auto,
    /// Always fetch with a plain HTTP GET
    Static,
    /// Always load the page in the headless browser
    Rendered,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Seed URLs the crawl starts from (depth 0)
    pub seeds: Vec<String>,

    /// Maximum number of pages to fetch in a session
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Delay between crawl rounds and base unit of the retry backoff (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Timeout applied to every single fetch attempt (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of retries after the first failed attempt
    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Maximum number of concurrent page fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Fetch strategy selection
    #[serde(default)]
    pub strategy: StrategyMode,

    /// Whether links to other hosts than the seeds' are followed
    #[serde(rename = "follow-external-links", default)]
    pub follow_external_links: bool,

    /// Whether outbound links are expanded; false fetches the seed list only
    #[serde(rename = "follow-links", default = "default_true")]
    pub follow_links: bool,

    /// When a rendered page counts as loaded
    #[serde(rename = "wait-for", default)]
    pub wait_for: WaitPolicy,

    /// Extra settle time after a static fetch (milliseconds)
    #[serde(rename = "settle-delay-ms", default)]
    pub settle_delay_ms: u64,

    /// Optional wall-clock budget for the whole session (seconds)
    #[serde(rename = "session-budget-secs", default)]
    pub session_budget_secs: Option<u64>,

    /// Whether robots.txt is fetched and honored
    #[serde(rename = "respect-robots-txt", default)]
    pub respect_robots_txt: bool,

    /// Whether the raw markup is kept on each fetch result
    #[serde(rename = "keep-raw-markup", default)]
    pub keep_raw_markup: bool,

    /// Largest page body accepted by the static fetcher (bytes)
    #[serde(rename = "max-content-length", default = "default_max_content_length")]
    pub max_content_length: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            delay_ms: default_delay_ms(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            concurrency: default_concurrency(),
            strategy: StrategyMode::default(),
            follow_external_links: false,
            follow_links: true,
            wait_for: WaitPolicy::default(),
            settle_delay_ms: 0,
            session_budget_secs: None,
            respect_robots_txt: false,
            keep_raw_markup: false,
            max_content_length: default_max_content_length(),
        }
    }
}

/// URL scope filters applied on top of the host policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    /// When non-empty, discovered URLs must match at least one pattern
    #[serde(rename = "include-patterns", default)]
    pub include_patterns: Vec<String>,

    /// Discovered URLs matching any pattern are rejected
    #[serde(rename = "exclude-patterns", default)]
    pub exclude_patterns: Vec<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email", default)]
    pub contact_email: Option<String>,

    /// Full user agent string that replaces the generated one
    #[serde(rename = "override", default)]
    pub override_string: Option<String>,
}

impl UserAgentConfig {
    /// Formats the user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`, with the
    /// parenthesized part omitted when no contact details are configured.
    pub fn header_value(&self) -> String {
        if let Some(custom) = &self.override_string {
            return custom.clone();
        }

        let contact: Vec<&str> = [self.contact_url.as_deref(), self.contact_email.as_deref()]
            .into_iter()
            .flatten()
            .collect();

        match contact.as_slice() {
            [] => format!("{}/{}", self.crawler_name, self.crawler_version),
            [url, email] => format!(
                "{}/{} (+{}; {})",
                self.crawler_name, self.crawler_version, url, email
            ),
            [single] => format!("{}/{} (+{})", self.crawler_name, self.crawler_version, single),
            _ => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
            contact_email: None,
            override_string: None,
        }
    }
}

/// Resource download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Whether resources are downloaded at all
    #[serde(default = "default_true")]
    pub download: bool,

    /// Resource kinds that are downloaded
    #[serde(default = "default_resource_kinds")]
    pub kinds: Vec<ResourceKind>,

    /// Largest accepted resource (bytes)
    #[serde(rename = "max-size-bytes", default = "default_max_resource_size")]
    pub max_size_bytes: u64,

    /// Concurrent downloads within a batch
    #[serde(default = "default_resource_concurrency")]
    pub concurrency: usize,

    /// Resources per batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches (milliseconds)
    #[serde(rename = "batch-delay-ms", default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Timeout for a single download (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_download_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            download: true,
            kinds: default_resource_kinds(),
            max_size_bytes: default_max_resource_size(),
            concurrency: default_resource_concurrency(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            timeout_ms: default_download_timeout_ms(),
        }
    }
}

/// Content classifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Whether the classifying phase runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pages with less body text than this (characters) are not classified
    #[serde(rename = "min-content-length", default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Name similarity at or above which product records are merged
    #[serde(
        rename = "similarity-threshold",
        default = "default_similarity_threshold"
    )]
    pub similarity_threshold: f64,

    /// Whether similar product records are merged
    #[serde(rename = "merge-similar", default = "default_true")]
    pub merge_similar: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_content_length: default_min_content_length(),
            similarity_threshold: default_similarity_threshold(),
            merge_similar: true,
        }
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Chrome/Chromium executable; auto-detected when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(rename = "window-width", default = "default_window_width")]
    pub window_width: u32,

    #[serde(rename = "window-height", default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory; each session writes into its own subdirectory
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Whether the markdown summary is written
    #[serde(rename = "write-summary", default = "default_true")]
    pub write_summary: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_summary: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> usize {
    10
}

fn default_max_depth() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_concurrency() -> usize {
    3
}

fn default_max_content_length() -> u64 {
    10 * 1024 * 1024
}

fn default_crawler_name() -> String {
    "sitesift".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_resource_kinds() -> Vec<ResourceKind> {
    vec![ResourceKind::Image, ResourceKind::Document]
}

fn default_max_resource_size() -> u64 {
    10 * 1024 * 1024
}

fn default_resource_concurrency() -> usize {
    2
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_download_timeout_ms() -> u64 {
    60_000
}

fn default_min_content_length() -> usize {
    20
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
