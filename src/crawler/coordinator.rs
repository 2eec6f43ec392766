//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a session through its phases:
//! - Discovering: breadth-first rounds that fetch pages and expand their links
//! - Fetching: rounds over whatever is still queued, without expanding links
//! - Downloading: the resource inventory through the resource downloader
//! - Classifying: every fetched page through the classifier
//! - Reporting: the session report and the session directory

use crate::classify::Classifier;
use crate::config::{validate, Config, StrategyMode};
use crate::crawler::fetcher::{build_http_client, FetchOutcome, PageFetcher};
use crate::crawler::frontier::{EnqueueOutcome, Frontier};
use crate::crawler::strategy::{StrategyDecision, StrategySelector};
use crate::output::{write_report, SessionReport, SessionStatus};
use crate::render::{ChromiumEngine, RenderEngine};
use crate::resources::{DownloadState, ResourceDownloader, ResourceRecord};
use crate::robots::RobotsCache;
use crate::state::{CrawlPhase, CrawlSession, UrlState};
use crate::url::ScopePolicy;
use crate::{ConfigError, FetchOutcomeResult};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What one worker sends back for its URL
struct WorkerReport {
    url: Url,
    depth: u32,
    decision: StrategyDecision,
    result: FetchOutcomeResult<FetchOutcome>,
}

/// Why a sequence of rounds stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundsEnd {
    /// Nothing left in the queue
    Drained,
    /// `max-pages` URLs have been attempted
    PageLimit,
    Cancelled,
    BudgetExhausted,
}

/// Result of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub report: SessionReport,

    /// Directory the report and downloaded files were written to
    pub session_dir: PathBuf,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    scope: ScopePolicy,
    selector: Arc<StrategySelector>,
    fetcher: Arc<PageFetcher>,
    downloader: ResourceDownloader,
    classifier: Classifier,
    robots: Option<RobotsCache>,
    engine: Option<Arc<dyn RenderEngine>>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator, launching Chromium unless the strategy is static
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SiftError)` - Invalid configuration or the browser failed to launch
    pub async fn new(config: Config) -> crate::Result<Self> {
        validate(&config)?;

        let engine: Option<Arc<dyn RenderEngine>> = match config.crawler.strategy {
            StrategyMode::Static => None,
            StrategyMode::Auto | StrategyMode::Rendered => {
                let engine = ChromiumEngine::launch(
                    &config.browser,
                    &config.user_agent.header_value(),
                    Duration::from_millis(config.crawler.timeout_ms),
                )
                .await?;
                Some(Arc::new(engine))
            }
        };

        Self::with_engine(config, engine)
    }

    /// Creates a coordinator around an already constructed rendering engine
    ///
    /// A rendering engine is required unless the strategy is static.
    pub fn with_engine(
        config: Config,
        engine: Option<Arc<dyn RenderEngine>>,
    ) -> crate::Result<Self> {
        validate(&config)?;

        if config.crawler.strategy != StrategyMode::Static && engine.is_none() {
            return Err(ConfigError::Validation(
                "a rendering engine is required unless crawler.strategy is \"static\"".to_string(),
            )
            .into());
        }

        let client = build_http_client(&config.user_agent)?;
        let robots = config
            .crawler
            .respect_robots_txt
            .then(|| RobotsCache::new(client.clone(), config.user_agent.crawler_name.clone()));

        Ok(Self {
            scope: ScopePolicy::from_config(&config),
            selector: Arc::new(StrategySelector::new(
                client.clone(),
                config.crawler.strategy,
            )),
            fetcher: Arc::new(PageFetcher::new(
                client.clone(),
                &config.crawler,
                engine.clone(),
            )),
            downloader: ResourceDownloader::new(client, &config.resources),
            classifier: Classifier::new(&config.classifier),
            robots,
            engine,
            cancel: CancellationToken::new(),
            config_hash: String::new(),
            config: Arc::new(config),
        })
    }

    /// Sets the configuration hash recorded in the report
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Replaces the cancellation token, e.g. with one tied to Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the crawl when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    /// Runs a complete session
    ///
    /// Per-URL failures are recorded and never abort the run. The only errors
    /// returned are invariant violations and failures to write the report.
    pub async fn run(&self) -> crate::Result<CrawlOutcome> {
        let session = Arc::new(self.seed_session().await);
        let session_dir = self.config.output.dir.join(session.id());
        let started = Instant::now();

        tracing::info!(
            session = %session.id(),
            seeds = self.config.crawler.seeds.len(),
            strategy = ?self.config.crawler.strategy,
            "Starting crawl"
        );

        let crawl_end = if self.config.crawler.follow_links {
            session.advance(CrawlPhase::Discovering)?;
            match self.run_rounds(&session, true, started).await? {
                RoundsEnd::Drained | RoundsEnd::PageLimit => {
                    session.advance(CrawlPhase::Fetching)?;
                    self.run_rounds(&session, false, started).await?
                }
                end => end,
            }
        } else {
            session.advance(CrawlPhase::Fetching)?;
            self.run_rounds(&session, false, started).await?
        };

        let status = match crawl_end {
            RoundsEnd::Cancelled => SessionStatus::Cancelled,
            RoundsEnd::BudgetExhausted => SessionStatus::BudgetExhausted,
            RoundsEnd::Drained | RoundsEnd::PageLimit => SessionStatus::Completed,
        };

        if status == SessionStatus::Completed && self.config.resources.download {
            session.advance(CrawlPhase::Downloading)?;
            self.download_resources(&session, &session_dir).await;
        }

        if status != SessionStatus::BudgetExhausted && self.config.classifier.enabled {
            session.advance(CrawlPhase::Classifying)?;
            let records = self
                .classifier
                .classify_all(&session.pages(), &self.config.classifier);
            tracing::info!(records = records.len(), "Classification finished");
            session.set_records(records);
        }

        session.advance(CrawlPhase::Reporting)?;
        let report = SessionReport::from_session(&session, status);
        write_report(&report, &session_dir, self.config.output.write_summary)?;
        session.advance(CrawlPhase::Done)?;

        tracing::info!(
            session = %report.id,
            status = %report.status,
            processed = report.coverage.processed,
            failed = report.coverage.failed,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Crawl finished"
        );

        Ok(CrawlOutcome {
            report,
            session_dir,
        })
    }

    /// Shuts down the rendering engine, if any
    pub async fn shutdown(&self) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.shutdown().await {
                tracing::warn!(error = %e, "Rendering engine did not shut down cleanly");
            }
        }
    }

    /// Builds the session and queues the seeds at depth 0
    async fn seed_session(&self) -> CrawlSession {
        let mut frontier = Frontier::new(self.scope.clone(), self.config.crawler.max_depth);

        for seed in &self.config.crawler.seeds {
            let Ok(url) = Url::parse(seed) else {
                tracing::warn!(seed = %seed, "Skipping unparsable seed");
                continue;
            };
            if let Some(robots) = &self.robots {
                if !robots.allows(&url).await {
                    tracing::warn!(url = %url, "Seed disallowed by robots.txt");
                    frontier.skip(&url, "disallowed by robots.txt");
                    continue;
                }
            }
            if let EnqueueOutcome::Rejected(reason) = frontier.enqueue(&url, 0, None) {
                tracing::warn!(url = %url, reason = %reason, "Seed rejected");
            }
        }

        CrawlSession::new(frontier, self.config_hash.clone())
    }

    /// Runs breadth-first rounds until the queue drains or a limit is hit
    ///
    /// # Arguments
    ///
    /// * `session` - The session being crawled
    /// * `expand` - Whether links of fetched pages are queued
    /// * `started` - Session start, for the wall-clock budget
    async fn run_rounds(
        &self,
        session: &Arc<CrawlSession>,
        expand: bool,
        started: Instant,
    ) -> crate::Result<RoundsEnd> {
        let crawler = &self.config.crawler;
        let budget = crawler.session_budget_secs.map(Duration::from_secs);
        let round_delay = self.round_delay().await;
        let mut round = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Crawl cancelled");
                return Ok(RoundsEnd::Cancelled);
            }
            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                tracing::warn!("Session budget exhausted");
                return Ok(RoundsEnd::BudgetExhausted);
            }

            let batch = {
                let mut frontier = session.frontier();
                let attempted =
                    frontier.count(UrlState::Visited) + frontier.count(UrlState::Failed);
                let remaining = crawler.max_pages.saturating_sub(attempted);
                if remaining == 0 {
                    tracing::info!(max_pages = crawler.max_pages, "Page limit reached");
                    return Ok(RoundsEnd::PageLimit);
                }
                frontier.dequeue_batch(crawler.concurrency.max(1).min(remaining))
            };

            if batch.is_empty() {
                return Ok(RoundsEnd::Drained);
            }

            if round > 0 && !round_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(round_delay) => {}
                }
            }
            round += 1;

            let (tx, mut rx) = mpsc::channel::<WorkerReport>(batch.len());
            let mut pending: HashSet<String> = HashSet::with_capacity(batch.len());

            for entry in batch {
                pending.insert(entry.url.to_string());
                let tx = tx.clone();
                let selector = Arc::clone(&self.selector);
                let fetcher = Arc::clone(&self.fetcher);

                tokio::spawn(async move {
                    let decision = selector.select(&entry.url).await;
                    tracing::debug!(
                        url = %entry.url,
                        depth = entry.depth,
                        strategy = %decision.strategy,
                        score = decision.score,
                        "Fetching"
                    );
                    let result = fetcher.fetch(&entry.url, decision.strategy).await;
                    let report = WorkerReport {
                        url: entry.url,
                        depth: entry.depth,
                        decision,
                        result,
                    };
                    // The receiver only goes away if the coordinator itself is gone
                    let _ = tx.send(report).await;
                });
            }
            drop(tx);

            while let Some(report) = rx.recv().await {
                pending.remove(report.url.as_str());
                self.handle_report(session, report, expand).await?;
            }

            for url in pending {
                tracing::warn!(url = %url, "Worker ended without reporting");
                if let Ok(parsed) = Url::parse(&url) {
                    session.frontier().mark_failed(&parsed)?;
                }
                session.record_failure(&url, "aborted", "worker aborted");
            }

            let counters = session.counters();
            tracing::info!(
                round,
                pages = counters.pages_processed,
                errors = counters.errors,
                queued = session.frontier().queued_len(),
                "Round finished"
            );
        }
    }

    /// Folds one worker report into the session
    async fn handle_report(
        &self,
        session: &CrawlSession,
        report: WorkerReport,
        expand: bool,
    ) -> crate::Result<()> {
        let outcome = match report.result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    url = %report.url,
                    strategy = %report.decision.strategy,
                    error = %e,
                    "Fetch failed"
                );
                session.frontier().mark_failed(&report.url)?;
                session.record_error(report.url.as_str(), &e);
                return Ok(());
            }
        };

        session.frontier().mark_visited(&report.url)?;

        let kinds = &self.config.resources.kinds;
        for reference in outcome.resources.iter().filter(|r| kinds.contains(&r.kind)) {
            session.add_resource(ResourceRecord::pending(reference, &outcome.result.final_url));
        }

        if expand {
            self.enqueue_links(session, &report.url, &outcome.links, report.depth + 1)
                .await;
        }

        session.record_page(outcome.result);
        Ok(())
    }

    /// Queues outbound links, consulting robots.txt for in-scope ones
    async fn enqueue_links(&self, session: &CrawlSession, from: &Url, links: &[Url], depth: u32) {
        let mut queued = 0usize;

        for link in links {
            if session.frontier().is_known(link) {
                continue;
            }

            if let Some(robots) = &self.robots {
                let in_reach =
                    depth <= self.config.crawler.max_depth && self.scope.check(link, false).is_ok();
                if in_reach && !robots.allows(link).await {
                    tracing::debug!(url = %link, "Disallowed by robots.txt");
                    session.frontier().skip(link, "disallowed by robots.txt");
                    continue;
                }
            }

            if session.frontier().enqueue(link, depth, Some(from)) == EnqueueOutcome::Queued {
                queued += 1;
            }
        }

        tracing::debug!(url = %from, links = links.len(), queued, depth, "Links expanded");
    }

    /// Downloads the pending part of the resource inventory
    async fn download_resources(&self, session: &CrawlSession, session_dir: &std::path::Path) {
        let pending: Vec<ResourceRecord> = session
            .resources()
            .into_iter()
            .filter(|r| r.download_state == DownloadState::Pending)
            .collect();

        if pending.is_empty() {
            tracing::info!("No resources to download");
            return;
        }

        tracing::info!(resources = pending.len(), "Downloading resources");
        let finished = self
            .downloader
            .download_batch(pending, session_dir, &self.cancel)
            .await;
        session.update_resources(finished);
    }

    /// Delay between rounds: `delay-ms`, raised to the first seed's robots.txt crawl delay
    async fn round_delay(&self) -> Duration {
        let configured = Duration::from_millis(self.config.crawler.delay_ms);

        let robots_delay = match (&self.robots, self.config.crawler.seeds.first()) {
            (Some(robots), Some(seed)) => match Url::parse(seed) {
                Ok(url) => robots.crawl_delay(&url).await,
                Err(_) => None,
            },
            _ => None,
        };

        robots_delay.map_or(configured, |delay| delay.max(configured))
    }
}

/// Runs a complete crawl and shuts the rendering engine down afterwards
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash recorded in the report
/// * `cancel` - Token that stops the crawl early
///
/// # Example
///
/// ```no_run
/// use sitesift::config::load_config_with_hash;
/// use sitesift::crawler::run_crawl;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("sitesift.toml"))?;
/// let outcome = run_crawl(config, hash, CancellationToken::new()).await?;
/// println!("wrote {}", outcome.session_dir.display());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: String,
    cancel: CancellationToken,
) -> crate::Result<CrawlOutcome> {
    let coordinator = Coordinator::new(config)
        .await?
        .with_config_hash(config_hash)
        .with_cancellation(cancel);
    let outcome = coordinator.run().await;
    coordinator.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SiftError;

    fn create_test_config() -> Config {
        let mut config = Config::for_seeds(["http://site.test/"]);
        config.crawler.strategy = StrategyMode::Static;
        config
    }

    #[test]
    fn test_static_mode_needs_no_engine() {
        assert!(Coordinator::with_engine(create_test_config(), None).is_ok());
    }

    #[test]
    fn test_rendered_mode_requires_engine() {
        let mut config = create_test_config();
        config.crawler.strategy = StrategyMode::Rendered;

        let err = Coordinator::with_engine(config, None).err().unwrap();
        assert!(matches!(err, SiftError::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = create_test_config();
        config.crawler.seeds.clear();
        assert!(Coordinator::with_engine(config, None).is_err());
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let coordinator = Coordinator::with_engine(create_test_config(), None)
            .unwrap()
            .with_cancellation(token.clone());
        token.cancel();
        assert!(coordinator.cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.output.dir = dir.path().to_path_buf();

        let coordinator = Coordinator::with_engine(config, None).unwrap();
        coordinator.cancellation_token().cancel();

        let outcome = coordinator.run().await.unwrap();
        assert_eq!(outcome.report.status, SessionStatus::Cancelled);
        assert_eq!(outcome.report.coverage.discovered, 1);
        assert_eq!(outcome.report.coverage.unvisited, 1);
        assert!(outcome.session_dir.join("session.json").exists());
        assert!(outcome.session_dir.join("summary.md").exists());

        let phases: Vec<CrawlPhase> = outcome.report.phases.iter().map(|p| p.phase).collect();
        assert!(!phases.contains(&CrawlPhase::Downloading));
        assert!(phases.contains(&CrawlPhase::Classifying));
    }
}
