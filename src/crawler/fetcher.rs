//! Page fetcher implementation
//!
//! This module handles all page fetches for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - The static path (HTTP GET, Content-Type and size checks)
//! - The rendered path (headless browser load with a wait policy)
//! - Per-attempt timeouts and linear retry backoff
//! - Turning either path's document into one `FetchResult` shape

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::parser::{parse_page, PageMetadata};
use crate::crawler::strategy::Strategy;
use crate::render::{RenderEngine, RenderedPage, WaitPolicy};
use crate::resources::ResourceRef;
use crate::{FetchError, FetchOutcomeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// HTTP status of the current document, from the navigation timing entry
const STATUS_SCRIPT: &str = r#"
    (function() {
        const nav = performance.getEntriesByType('navigation')[0];
        return nav && nav.responseStatus ? nav.responseStatus : 0;
    })()
"#;

/// Upper bound on closing a rendered page once its attempt is over
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A fetched page
///
/// Both strategies produce this same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL that was requested (canonical)
    pub url: Url,

    /// The URL the page was served from after redirects
    pub final_url: Url,

    pub strategy_used: Strategy,

    pub http_status: u16,

    pub title: Option<String>,

    /// Visible text, one line per block element
    pub body_text: String,

    /// The markup the text was extracted from, kept only when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_markup: Option<String>,

    pub metadata: PageMetadata,

    pub timestamp: DateTime<Utc>,

    /// Time from the first attempt's start to the final result
    pub elapsed_ms: u64,

    /// Number of attempts it took (1 when the first one succeeded)
    pub attempts: u32,
}

/// A fetched page together with what it points to
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: FetchResult,

    /// Outbound page links, resolved against the final URL
    pub links: Vec<Url>,

    /// Referenced resources, resolved against the final URL
    pub resources: Vec<ResourceRef>,
}

/// A document as returned by one successful attempt, before parsing
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub final_url: Url,
    pub status: u16,
    pub markup: String,

    /// Title reported by the engine, preferred over the parsed one
    pub title: Option<String>,
}

/// One way of fetching a page
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Makes a single attempt bounded by `timeout`
    async fn fetch_once(&self, url: &Url, timeout: Duration) -> FetchOutcomeResult<RawDocument>;
}

/// Builds an HTTP client with proper configuration
///
/// The client follows at most 10 redirects and sends the configured user
/// agent. It carries no overall timeout; every caller bounds its own requests.
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Example
///
/// ```no_run
/// use sitesift::config::UserAgentConfig;
/// use sitesift::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP GET without script execution
pub struct StaticFetcher {
    client: Client,
    max_content_length: u64,
    settle_delay: Duration,
}

impl StaticFetcher {
    pub fn new(client: Client, config: &CrawlerConfig) -> Self {
        Self {
            client,
            max_content_length: config.max_content_length,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
        }
    }

    async fn get(&self, url: &Url) -> FetchOutcomeResult<RawDocument> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.to_ascii_lowercase().contains("html") {
                return Err(FetchError::Content {
                    message: format!("not an HTML page ({})", content_type),
                });
            }
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(length) = declared {
            if length > self.max_content_length {
                return Err(self.too_large(length));
            }
        }

        let final_url = response.url().clone();
        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let read = (body.len() + chunk.len()) as u64;
            if read > self.max_content_length {
                return Err(self.too_large(read));
            }
            body.extend_from_slice(&chunk);
        }
        let markup = String::from_utf8_lossy(&body).into_owned();

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(RawDocument {
            final_url,
            status: status.as_u16(),
            markup,
            title: None,
        })
    }

    fn too_large(&self, length: u64) -> FetchError {
        FetchError::Content {
            message: format!(
                "page body of {} bytes exceeds {} bytes",
                length, self.max_content_length
            ),
        }
    }
}

#[async_trait]
impl FetchStrategy for StaticFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Static
    }

    async fn fetch_once(&self, url: &Url, timeout: Duration) -> FetchOutcomeResult<RawDocument> {
        tokio::time::timeout(timeout, self.get(url))
            .await
            .unwrap_or(Err(FetchError::Timeout {
                elapsed_ms: timeout.as_millis() as u64,
            }))
    }
}

/// Full browser load through a rendering engine
pub struct RenderedFetcher {
    engine: Arc<dyn RenderEngine>,
    wait: WaitPolicy,
}

impl RenderedFetcher {
    pub fn new(engine: Arc<dyn RenderEngine>, wait: WaitPolicy) -> Self {
        Self { engine, wait }
    }

    async fn load(
        &self,
        page: &dyn RenderedPage,
        url: &Url,
        timeout: Duration,
    ) -> FetchOutcomeResult<RawDocument> {
        page.goto(url, self.wait, timeout).await?;

        let status = page
            .evaluate(STATUS_SCRIPT)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .filter(|s| *s > 0)
            .map_or(200, |s| s as u16);
        if status >= 400 {
            return Err(FetchError::from_status(status));
        }

        let final_url = page
            .evaluate("location.href")
            .await
            .ok()
            .and_then(|v| v.as_str().and_then(|href| Url::parse(href).ok()))
            .unwrap_or_else(|| url.clone());

        let markup = page.content().await?;
        let title = page.title().await?.filter(|t| !t.trim().is_empty());

        Ok(RawDocument {
            final_url,
            status,
            markup,
            title,
        })
    }
}

#[async_trait]
impl FetchStrategy for RenderedFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Rendered
    }

    /// Opens a page, loads `url` and closes the page, all within `timeout`
    ///
    /// The page is closed even when the attempt times out.
    async fn fetch_once(&self, url: &Url, timeout: Duration) -> FetchOutcomeResult<RawDocument> {
        let started = Instant::now();
        let timed_out = || FetchError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        let mut page = tokio::time::timeout(timeout, self.engine.new_page())
            .await
            .map_err(|_| timed_out())??;

        let remaining = timeout.saturating_sub(started.elapsed());
        let result = tokio::time::timeout(remaining, self.load(page.as_ref(), url, remaining))
            .await
            .unwrap_or_else(|_| Err(timed_out()));

        match tokio::time::timeout(PAGE_CLOSE_TIMEOUT, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(url = %url, error = %e, "Failed to close page"),
            Err(_) => tracing::warn!(url = %url, "Closing page timed out"),
        }

        result
    }
}

/// Fetches pages under either strategy with timeout and retry
pub struct PageFetcher {
    static_fetcher: StaticFetcher,
    rendered_fetcher: Option<RenderedFetcher>,
    timeout: Duration,
    retry_attempts: u32,
    backoff_base: Duration,
    keep_raw_markup: bool,
}

impl PageFetcher {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `config` - Crawler settings (timeout, retries, backoff base, size cap)
    /// * `engine` - Rendering engine; without one the rendered path falls back to static
    pub fn new(
        client: Client,
        config: &CrawlerConfig,
        engine: Option<Arc<dyn RenderEngine>>,
    ) -> Self {
        Self {
            static_fetcher: StaticFetcher::new(client, config),
            rendered_fetcher: engine.map(|engine| RenderedFetcher::new(engine, config.wait_for)),
            timeout: Duration::from_millis(config.timeout_ms),
            retry_attempts: config.retry_attempts,
            backoff_base: Duration::from_millis(config.delay_ms),
            keep_raw_markup: config.keep_raw_markup,
        }
    }

    /// Fetches `url` with `strategy`
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout | Retry |
    /// | Connection failure | Retry |
    /// | HTTP 5xx, 408, 425, 429 | Retry |
    /// | Other HTTP 4xx | Fail immediately |
    /// | Non-HTML or oversized body | Fail immediately |
    ///
    /// Retry k waits k × `delay-ms` before starting. After `retry-attempts`
    /// retries the last error is returned.
    pub async fn fetch(&self, url: &Url, strategy: Strategy) -> FetchOutcomeResult<FetchOutcome> {
        let fetcher = self.fetcher_for(strategy);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match fetcher.fetch_once(url, self.timeout).await {
                Ok(document) => {
                    tracing::debug!(
                        url = %url,
                        strategy = %fetcher.strategy(),
                        status = document.status,
                        attempt,
                        "Fetched"
                    );
                    return Ok(self.build_outcome(
                        url,
                        fetcher.strategy(),
                        document,
                        started,
                        attempt,
                    ));
                }
                Err(e) if e.is_retryable() && attempt <= self.retry_attempts => {
                    let delay = self.backoff_base * attempt;
                    tracing::debug!(
                        url = %url,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetcher_for(&self, strategy: Strategy) -> &dyn FetchStrategy {
        match (strategy, &self.rendered_fetcher) {
            (Strategy::Rendered, Some(rendered)) => rendered as &dyn FetchStrategy,
            (Strategy::Rendered, None) => {
                tracing::warn!("No rendering engine available, fetching statically");
                &self.static_fetcher
            }
            (Strategy::Static, _) => &self.static_fetcher,
        }
    }

    fn build_outcome(
        &self,
        url: &Url,
        strategy: Strategy,
        document: RawDocument,
        started: Instant,
        attempts: u32,
    ) -> FetchOutcome {
        let parsed = parse_page(&document.markup, &document.final_url);

        let result = FetchResult {
            url: url.clone(),
            final_url: document.final_url,
            strategy_used: strategy,
            http_status: document.status,
            title: document.title.or(parsed.title),
            body_text: parsed.text,
            raw_markup: self.keep_raw_markup.then_some(document.markup),
            metadata: parsed.metadata,
            timestamp: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempts,
        };

        FetchOutcome {
            result,
            links: parsed.links,
            resources: parsed.resources,
        }
    }
}
