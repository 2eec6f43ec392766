//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use async_trait::async_trait;
use sitesift::classify::{ContentKind, PatternRule};
use sitesift::config::{Config, StrategyMode};
use sitesift::crawler::{Coordinator, CrawlOutcome, Strategy, StrategySelector};
use sitesift::render::{RenderEngine, RenderError, RenderedPage, WaitPolicy};
use sitesift::resources::DownloadState;
use sitesift::state::{CrawlPhase, UrlState};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a static-strategy test configuration writing into `output`
fn create_test_config(seed: &str, output: &Path) -> Config {
    let mut config = Config::for_seeds([seed]);
    config.crawler.strategy = StrategyMode::Static;
    config.crawler.delay_ms = 10;
    config.crawler.timeout_ms = 2000;
    config.crawler.retry_attempts = 0;
    config.resources.batch_delay_ms = 0;
    config.output.dir = output.to_path_buf();
    config
}

/// Mounts an HTML page at `route`
async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn run_static(config: Config) -> CrawlOutcome {
    Coordinator::with_engine(config, None)
        .expect("Failed to create coordinator")
        .run()
        .await
        .expect("Crawl failed")
}

fn urls_in(outcome: &CrawlOutcome, state: UrlState) -> HashSet<String> {
    outcome
        .report
        .sitemap
        .iter()
        .filter(|entry| entry.state == state)
        .map(|entry| entry.url.clone())
        .collect()
}

#[tokio::test]
async fn test_crawl_stays_within_depth_and_host() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><head><title>Home</title></head><body>
           <a href="/about">About</a>
           <a href="http://external.test/x">Elsewhere</a>
           </body></html>"#,
    )
    .await;
    mount_page(
        &server,
        "/about",
        r#"<html><head><title>About</title></head><body>
           <a href="/about/team">Team</a>
           </body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/about/team"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", base), dir.path());
    config.crawler.max_depth = 1;

    let outcome = run_static(config).await;

    let expected: HashSet<String> = [format!("{}/", base), format!("{}/about", base)]
        .into_iter()
        .collect();
    assert_eq!(urls_in(&outcome, UrlState::Visited), expected);
    assert_eq!(outcome.report.pages.len(), 2);
    assert_eq!(outcome.report.coverage.discovered, 2);

    assert!(!outcome
        .report
        .sitemap
        .iter()
        .any(|entry| entry.url.starts_with("http://external.test")));

    let skipped: HashSet<&str> = outcome.report.skipped.iter().map(|s| s.url.as_str()).collect();
    assert!(skipped.contains("http://external.test/x"));
    assert!(skipped.contains(format!("{}/about/team", base).as_str()));

    let about = outcome
        .report
        .sitemap
        .iter()
        .find(|entry| entry.url.ends_with("/about"))
        .unwrap();
    assert_eq!(about.depth, 1);
    assert_eq!(about.discovered_from.as_deref(), Some(format!("{}/", base).as_str()));
}

#[tokio::test]
async fn test_session_directory_layout() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "<html><head><title>Home</title></head><body><p>Hello</p></body></html>",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = run_static(create_test_config(&format!("{}/", server.uri()), dir.path())).await;

    assert!(outcome.session_dir.starts_with(dir.path()));
    for file in ["session.json", "sitemap.json", "resources.json", "summary.md"] {
        assert!(outcome.session_dir.join(file).exists(), "missing {}", file);
    }

    let session: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(outcome.session_dir.join("session.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(session["status"], "completed");
    assert_eq!(session["pages"][0]["title"], "Home");
    assert_eq!(session["pages"][0]["strategy_used"], "static");

    let phases: Vec<CrawlPhase> = outcome.report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases.first(), Some(&CrawlPhase::Initialized));
    assert_eq!(phases.last(), Some(&CrawlPhase::Done));
    assert!(phases.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_retry_after_timeout_succeeds() {
    let server = MockServer::start().await;

    // First attempt hangs past the timeout
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>slow</body></html>", "text/html")
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        "<html><head><title>Fast</title></head><body>fast</body></html>",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let seed = format!("{}/", server.uri());
    let mut config = create_test_config(&seed, dir.path());
    config.crawler.timeout_ms = 500;
    config.crawler.retry_attempts = 2;

    let outcome = run_static(config).await;

    assert_eq!(outcome.report.pages.len(), 1);
    let page = &outcome.report.pages[0];
    assert_eq!(page.http_status, 200);
    assert_eq!(page.attempts, 2);
    assert_eq!(page.title.as_deref(), Some("Fast"));
    assert!(outcome.report.errors.iter().all(|e| e.url != seed));
}

#[tokio::test]
async fn test_visited_urls_are_pages_or_failures() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body>
           <a href="/ok">ok</a>
           <a href="/missing">missing</a>
           <a href="/broken">broken</a>
           </body></html>"#,
    )
    .await;
    mount_page(&server, "/ok", "<html><body>fine</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.crawler.retry_attempts = 1;

    let outcome = run_static(config).await;

    let pages: HashSet<String> = outcome
        .report
        .pages
        .iter()
        .map(|p| p.url.to_string())
        .collect();
    let failed: HashSet<String> = outcome
        .report
        .failed_urls
        .iter()
        .map(|f| f.url.clone())
        .collect();

    assert_eq!(urls_in(&outcome, UrlState::Visited), pages);
    assert_eq!(urls_in(&outcome, UrlState::Failed), failed);
    assert!(pages.is_disjoint(&failed));
    assert_eq!(pages.len(), 2);
    assert_eq!(failed.len(), 2);
    assert_eq!(outcome.report.coverage.unvisited, 0);

    let missing = format!("{}/missing", server.uri());
    let reason = outcome
        .report
        .failed_urls
        .iter()
        .find(|f| f.url == missing)
        .map(|f| f.reason.as_str());
    assert_eq!(reason, Some("network error: HTTP 404"));
}

#[tokio::test]
async fn test_oversized_resource_fails_without_leaving_file() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body>
           <img src="/big.png">
           <img src="/small.png">
           </body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/big.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 2048])
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 512])
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.resources.max_size_bytes = 1024;

    let outcome = run_static(config).await;
    let resources = &outcome.report.resources;
    assert_eq!(resources.len(), 2);

    let big = resources.iter().find(|r| r.url.ends_with("/big.png")).unwrap();
    assert_eq!(big.download_state, DownloadState::Failed);
    assert!(big.error.as_deref().unwrap_or_default().contains("exceeds limit"));
    assert_eq!(big.error_kind.as_deref(), Some("size_exceeded"));
    if let Some(destination) = &big.destination_path {
        assert!(!destination.exists());
    }

    let small = resources.iter().find(|r| r.url.ends_with("/small.png")).unwrap();
    assert_eq!(small.download_state, DownloadState::Done);
    assert_eq!(small.byte_size, 512);
    let destination = small.destination_path.as_ref().unwrap();
    assert!(destination.starts_with(outcome.session_dir.join("images")));
    assert_eq!(std::fs::metadata(destination).unwrap().len(), 512);

    assert_eq!(outcome.report.counters.bytes_downloaded, 512);
    assert!(outcome
        .report
        .errors
        .iter()
        .any(|e| e.kind == "size_exceeded" && e.url.ends_with("/big.png")));

    // Nothing but the small file is left in the images directory
    let leftovers: Vec<_> = std::fs::read_dir(outcome.session_dir.join("images"))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_declared_oversize_on_head_skips_get() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<html><body><a href="/catalog.pdf">Catalog</a></body></html>"#).await;
    // The HEAD body is dropped on the wire; only its length is declared
    Mock::given(method("HEAD"))
        .and(path("/catalog.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 4096])
                .insert_header("content-type", "application/pdf"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/catalog.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.resources.max_size_bytes = 1024;

    let outcome = run_static(config).await;

    assert_eq!(outcome.report.resources.len(), 1);
    let catalog = &outcome.report.resources[0];
    assert_eq!(catalog.download_state, DownloadState::Failed);
    assert_eq!(catalog.error_kind.as_deref(), Some("size_exceeded"));
    assert_eq!(
        catalog.error.as_deref(),
        Some("size 4096 exceeds limit of 1024 bytes")
    );
    assert!(outcome
        .report
        .errors
        .iter()
        .any(|e| e.kind == "size_exceeded" && e.url.ends_with("/catalog.pdf")));

    let gets = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.to_string() == "GET" && r.url.path() == "/catalog.pdf")
        .count();
    assert_eq!(gets, 0);
}

#[tokio::test]
async fn test_resources_listed_but_not_downloaded_when_disabled() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<html><body><a href="/manual.pdf">Manual</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/manual.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.resources.download = false;

    let outcome = run_static(config).await;
    assert_eq!(outcome.report.resources.len(), 1);
    assert_eq!(outcome.report.resources[0].download_state, DownloadState::Pending);
    assert!(!outcome
        .report
        .phases
        .iter()
        .any(|p| p.phase == CrawlPhase::Downloading));
}

#[tokio::test]
async fn test_robots_disallowed_links_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<html><body>
           <a href="/public">Public</a>
           <a href="/private/report">Private</a>
           </body></html>"#,
    )
    .await;
    mount_page(&server, "/public", "<html><body>public</body></html>").await;
    Mock::given(method("GET"))
        .and(path("/private/report"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.crawler.respect_robots_txt = true;

    let outcome = run_static(config).await;

    assert_eq!(outcome.report.pages.len(), 2);
    let private = format!("{}/private/report", server.uri());
    let skipped = outcome
        .report
        .skipped
        .iter()
        .find(|s| s.url == private)
        .expect("private URL should be skipped");
    assert_eq!(skipped.reason, "disallowed by robots.txt");
}

#[tokio::test]
async fn test_follow_links_disabled_fetches_seeds_only() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<html><body><a href="/next">next</a></body></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.crawler.follow_links = false;

    let outcome = run_static(config).await;
    assert_eq!(outcome.report.pages.len(), 1);
    assert!(!outcome
        .report
        .phases
        .iter()
        .any(|p| p.phase == CrawlPhase::Discovering));
}

#[tokio::test]
async fn test_max_pages_limits_fetches() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/a">a</a><a href="/b">b</a><a href="/c">c</a></body></html>"#,
    )
    .await;
    for route in ["/a", "/b", "/c"] {
        mount_page(&server, route, "<html><body>leaf</body></html>").await;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&format!("{}/", server.uri()), dir.path());
    config.crawler.max_pages = 2;

    let outcome = run_static(config).await;
    assert_eq!(outcome.report.pages.len(), 2);
    assert_eq!(outcome.report.coverage.unvisited, 2);
    assert_eq!(outcome.report.status.as_str(), "completed");
}

#[tokio::test]
async fn test_product_page_is_classified() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/display.aspx",
        r#"<html><head><title>Colilert 检测试剂</title></head><body>
           <p>产品详情：本页面介绍一款用于水质检测的试剂产品。</p>
           <p>型号: X200</p>
           </body></html>"#,
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&format!("{}/display.aspx?id=12", server.uri()), dir.path());

    let outcome = run_static(config).await;
    assert_eq!(outcome.report.records.len(), 1);
    let record = &outcome.report.records[0];
    assert_eq!(record.kind, ContentKind::Product);
    assert_eq!(record.fields.get("型号").map(String::as_str), Some("X200"));
    assert_eq!(record.fields.get("title").map(String::as_str), Some("Colilert 检测试剂"));
}

#[tokio::test]
async fn test_custom_rule_added_before_run_extracts_field() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/display.aspx",
        r#"<html><head><title>Colilert 检测试剂</title></head><body>
           <p>产品详情：本页面介绍一款用于水质检测的试剂产品。</p>
           <p>订货编号 SKU-40917，现货供应。</p>
           </body></html>"#,
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&format!("{}/display.aspx?id=7", server.uri()), dir.path());

    let mut coordinator = Coordinator::with_engine(config, None).unwrap();
    coordinator
        .classifier_mut()
        .rules_mut()
        .push(PatternRule::new("sku", r"SKU-(\d+)", &[ContentKind::Product]).unwrap());
    let outcome = coordinator.run().await.expect("Crawl failed");

    assert_eq!(outcome.report.records.len(), 1);
    let record = &outcome.report.records[0];
    assert_eq!(record.kind, ContentKind::Product);
    assert_eq!(record.fields.get("sku").map(String::as_str), Some("40917"));
}

#[tokio::test]
async fn test_selector_prefers_rendering_for_script_heavy_page() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/app",
        r#"<html><head>
           <script src="/a.js"></script><script src="/b.js"></script>
           <script src="/c.js"></script><script src="/d.js"></script>
           <script>window.boot()</script>
           </head><body><div id="root">Loading...</div></body></html>"#,
    )
    .await;
    mount_page(&server, "/plain", "<html><body><p>Just text.</p></body></html>").await;

    let selector = StrategySelector::new(reqwest::Client::new(), StrategyMode::Auto);

    let app = Url::parse(&format!("{}/app", server.uri())).unwrap();
    let decision = selector.select(&app).await;
    assert_eq!(decision.strategy, Strategy::Rendered);

    // Decisions are cached per host, so a fresh selector judges the plain page
    let selector = StrategySelector::new(reqwest::Client::new(), StrategyMode::Auto);
    let plain = Url::parse(&format!("{}/plain", server.uri())).unwrap();
    assert_eq!(selector.select(&plain).await.strategy, Strategy::Static);
}

/// Serves fixed markup for every URL and counts opened and closed pages
#[derive(Default)]
struct FakeEngine {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

struct FakePage {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl RenderedPage for FakePage {
    async fn goto(&self, _url: &Url, _wait: WaitPolicy, _timeout: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, RenderError> {
        Ok(r#"<html><head><title>Rendered</title></head><body>
              <div id="app">Rendered by script</div>
              <a href="/next">next</a>
              </body></html>"#
            .to_string())
    }

    async fn title(&self) -> Result<Option<String>, RenderError> {
        Ok(Some("Rendered".to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RenderError> {
        if script.contains("responseStatus") {
            Ok(serde_json::json!(200))
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_rendered_crawl_with_fake_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config("http://render.test/", dir.path());
    config.crawler.strategy = StrategyMode::Rendered;
    config.crawler.max_depth = 1;

    let engine = Arc::new(FakeEngine::default());
    let coordinator =
        Coordinator::with_engine(config, Some(engine.clone() as Arc<dyn RenderEngine>)).unwrap();
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.report.pages.len(), 2);
    assert!(outcome
        .report
        .pages
        .iter()
        .all(|p| p.strategy_used == Strategy::Rendered && p.title.as_deref() == Some("Rendered")));
    assert_eq!(outcome.report.strategy_counts.get("rendered"), Some(&2));

    let opened = engine.opened.load(Ordering::SeqCst);
    assert_eq!(opened, 2);
    assert_eq!(engine.closed.load(Ordering::SeqCst), opened);
}
