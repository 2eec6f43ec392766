//! Fetch strategy selection
//!
//! Before a page is fetched, its host is probed cheaply (HEAD, then a partial
//! GET) and the sampled markup is scored for both strategies. Script-heavy,
//! dynamic or complex markup pushes toward rendering; fast, small and
//! script-light markup pushes toward a static fetch.

use crate::config::StrategyMode;
use crate::url::extract_host;
use futures::StreamExt;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

const STATIC_BASELINE: i32 = 100;
const RENDERED_BASELINE: i32 = 40;

const HEAD_TIMEOUT: Duration = Duration::from_secs(5);
const GET_TIMEOUT: Duration = Duration::from_secs(10);

/// Most bytes of a page the probe reads
const PROBE_BYTES: usize = 256 * 1024;

/// Response time above which rendering gains points
const SLOW_RESPONSE_MS: u64 = 2000;

/// Fetch mechanism for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plain HTTP GET and a lightweight parse
    Static,
    /// Full browser load with script execution
    Rendered,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Both strategies' scores with the reasons that moved them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyScores {
    pub static_score: u8,
    pub rendered_score: u8,
    pub reasons: Vec<String>,
}

impl StrategyScores {
    /// The higher-scoring strategy; ties go to static
    pub fn winner(&self) -> Strategy {
        if self.rendered_score > self.static_score {
            Strategy::Rendered
        } else {
            Strategy::Static
        }
    }
}

/// Outcome of strategy selection for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyDecision {
    pub strategy: Strategy,

    /// Score of the chosen strategy (0..=100)
    pub score: u8,

    pub reasons: Vec<String>,
}

impl StrategyDecision {
    fn from_scores(scores: StrategyScores) -> Self {
        let strategy = scores.winner();
        let score = match strategy {
            Strategy::Static => scores.static_score,
            Strategy::Rendered => scores.rendered_score,
        };
        Self {
            strategy,
            score,
            reasons: scores.reasons,
        }
    }

    fn fixed(strategy: Strategy, score: u8, reason: impl Into<String>) -> Self {
        Self {
            strategy,
            score,
            reasons: vec![reason.into()],
        }
    }
}

fn js_indicators() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"<script|document\.addEventListener|window\.onload|@click=|v-if=|ng-|react|vue|angular",
        )
        .ok()
    })
    .as_ref()
}

fn dynamic_markers() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)loading|spinner|skeleton|lazy.*load|data-src=|fetch.*api|XMLHttpRequest|\$\.ajax",
        )
        .ok()
    })
    .as_ref()
}

/// Scores sampled markup for both strategies
///
/// Pure function of its inputs.
///
/// # Arguments
///
/// * `markup` - The sampled HTML
/// * `response_ms` - Time until the probe's response headers arrived
pub fn score_markup(markup: &str, response_ms: u64) -> StrategyScores {
    let mut static_score = STATIC_BASELINE;
    let mut rendered_score = RENDERED_BASELINE;
    let mut reasons = Vec::new();

    if js_indicators().is_some_and(|re| re.is_match(markup)) {
        static_score -= 40;
        rendered_score += 30;
        reasons.push("javascript indicators present".to_string());
    }

    if dynamic_markers().is_some_and(|re| re.is_match(markup)) {
        static_score -= 30;
        rendered_score += 25;
        reasons.push("dynamic content markers present".to_string());
    }

    let lower = markup.to_ascii_lowercase();
    let nodes = markup.matches('<').count();
    let scripts = lower.matches("<script").count();
    let iframes = lower.matches("<iframe").count();
    let styles = lower.matches("<style").count() + lower.matches("stylesheet").count();

    if nodes > 1000 || scripts > 10 || iframes > 2 {
        static_score -= 20;
        rendered_score += 20;
        reasons.push(format!(
            "high complexity ({} nodes, {} scripts, {} iframes)",
            nodes, scripts, iframes
        ));
    } else if nodes <= 300 && scripts <= 3 {
        static_score += 20;
        reasons.push(format!("low complexity ({} nodes, {} scripts)", nodes, scripts));
    }

    if response_ms > SLOW_RESPONSE_MS {
        rendered_score += 10;
        reasons.push(format!("slow response ({}ms)", response_ms));
    } else {
        static_score += 10;
        reasons.push(format!("fast response ({}ms)", response_ms));
    }

    if scripts < 3 && styles < 3 && markup.len() < 100_000 {
        static_score += 15;
        reasons.push("simple html".to_string());
    }

    StrategyScores {
        static_score: static_score.clamp(0, 100) as u8,
        rendered_score: rendered_score.clamp(0, 100) as u8,
        reasons,
    }
}

/// What the probe learned about a URL
enum Probe {
    /// HEAD reported a non-HTML content type
    NotHtml(String),
    /// Sampled markup and time to response headers
    Sampled { markup: String, response_ms: u64 },
}

/// Chooses a fetch strategy per URL, caching successful probes per host
pub struct StrategySelector {
    client: Client,
    mode: StrategyMode,
    cache: Mutex<HashMap<String, StrategyDecision>>,
}

impl StrategySelector {
    pub fn new(client: Client, mode: StrategyMode) -> Self {
        Self {
            client,
            mode,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Chooses the strategy for `url`
    ///
    /// A configured static or rendered mode is returned without probing. In
    /// auto mode the host's cached decision is reused; otherwise the URL is
    /// probed and scored. A failed probe selects rendered and is not cached.
    pub async fn select(&self, url: &Url) -> StrategyDecision {
        match self.mode {
            StrategyMode::Static => {
                return StrategyDecision::fixed(Strategy::Static, 100, "configured")
            }
            StrategyMode::Rendered => {
                return StrategyDecision::fixed(Strategy::Rendered, 100, "configured")
            }
            StrategyMode::Auto => {}
        }

        let host = extract_host(url).unwrap_or_default();
        if let Some(cached) = self.cached(&host) {
            tracing::trace!(url = %url, strategy = %cached.strategy, "Using cached strategy");
            return cached;
        }

        let decision = match self.probe(url).await {
            Ok(Probe::NotHtml(content_type)) => StrategyDecision::fixed(
                Strategy::Static,
                100,
                format!("non-html content ({})", content_type),
            ),
            Ok(Probe::Sampled {
                markup,
                response_ms,
            }) => StrategyDecision::from_scores(score_markup(&markup, response_ms)),
            Err(reason) => {
                tracing::debug!(url = %url, reason = %reason, "Probe failed, assuming rendered");
                return StrategyDecision::fixed(
                    Strategy::Rendered,
                    RENDERED_BASELINE as u8,
                    format!("probe failed: {}", reason),
                );
            }
        };

        tracing::debug!(
            url = %url,
            strategy = %decision.strategy,
            score = decision.score,
            "Strategy selected"
        );

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, decision.clone());
        decision
    }

    fn cached(&self, host: &str) -> Option<StrategyDecision> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    async fn probe(&self, url: &Url) -> Result<Probe, String> {
        match self
            .client
            .head(url.clone())
            .timeout(HEAD_TIMEOUT)
            .send()
            .await
        {
            Ok(head) if head.status().is_success() => {
                if let Some(content_type) = header_content_type(head.headers()) {
                    if !content_type.contains("html") {
                        return Ok(Probe::NotHtml(content_type));
                    }
                }
            }
            Ok(head) => {
                tracing::trace!(url = %url, status = head.status().as_u16(), "HEAD not usable");
            }
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "HEAD failed");
            }
        }

        let sample = async {
            let started = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let response_ms = started.elapsed().as_millis() as u64;

            if !response.status().is_success() {
                return Err(format!("HTTP {}", response.status().as_u16()));
            }

            let mut bytes: Vec<u8> = Vec::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| e.to_string())?;
                let room = PROBE_BYTES - bytes.len();
                bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if bytes.len() >= PROBE_BYTES {
                    break;
                }
            }

            Ok(Probe::Sampled {
                markup: String::from_utf8_lossy(&bytes).into_owned(),
                response_ms,
            })
        };

        tokio::time::timeout(GET_TIMEOUT, sample)
            .await
            .unwrap_or_else(|_| Err(format!("timed out after {}ms", GET_TIMEOUT.as_millis())))
    }
}

fn header_content_type(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
}
