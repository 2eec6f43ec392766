//! Chromium implementation of the rendering collaborator

use super::{RenderEngine, RenderError, RenderedPage, WaitPolicy};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiet period without new resource entries that counts as network idle
const IDLE_WINDOW: Duration = Duration::from_millis(500);

const READY_STATE_SCRIPT: &str = r#"
    (function() {
        return {
            readyState: document.readyState,
            bodyExists: document.body !== null,
            resources: performance.getEntriesByType('resource').length
        };
    })()
"#;

/// A launched Chromium process driven over the DevTools protocol
pub struct ChromiumEngine {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumEngine {
    /// Launches Chromium with the configured window and executable
    ///
    /// # Arguments
    ///
    /// * `config` - Browser settings
    /// * `user_agent` - User agent the browser sends, same as the HTTP client's
    /// * `request_timeout` - DevTools request timeout
    pub async fn launch(
        config: &BrowserConfig,
        user_agent: &str,
        request_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let mut builder = ChromeConfig::builder()
            .request_timeout(request_timeout)
            .window_size(config.window_width, config.window_height)
            .arg(format!("--user-agent={}", user_agent))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-background-networking")
            .arg("--mute-audio");

        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        if !config.headless {
            builder = builder.with_head();
        }

        let chrome_config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "Browser handler event error");
                }
            }
            tracing::debug!("Browser handler finished");
        });

        tracing::info!(headless = config.headless, "Browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;
        Ok(Box::new(ChromiumPage { page: Some(page) }))
    }

    async fn shutdown(&self) -> Result<(), RenderError> {
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Protocol(e.to_string()));
        // The process may already be gone; waiting only reaps it
        let _ = browser.wait().await;
        self.handler.abort();
        tracing::info!("Browser shut down");
        closed
    }
}

struct ChromiumPage {
    page: Option<Page>,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page.as_ref().ok_or(RenderError::Closed)
    }

    async fn ready_state(&self) -> Option<(String, bool, u64)> {
        let page = self.page().ok()?;
        let value = page
            .evaluate(READY_STATE_SCRIPT)
            .await
            .ok()?
            .into_value::<serde_json::Value>()
            .ok()?;
        Some((
            value.get("readyState")?.as_str()?.to_string(),
            value.get("bodyExists")?.as_bool()?,
            value.get("resources")?.as_u64()?,
        ))
    }

    /// Polls the document until the wait policy is satisfied
    async fn wait_until_loaded(&self, wait: WaitPolicy) {
        let mut last_resources = None;
        let mut quiet_since = Instant::now();

        loop {
            if let Some((state, body, resources)) = self.ready_state().await {
                match wait {
                    WaitPolicy::DomReady => {
                        if body && (state == "interactive" || state == "complete") {
                            return;
                        }
                    }
                    WaitPolicy::NetworkIdle => {
                        if last_resources != Some(resources) {
                            last_resources = Some(resources);
                            quiet_since = Instant::now();
                        } else if state == "complete" && quiet_since.elapsed() >= IDLE_WINDOW {
                            return;
                        }
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RenderedPage for ChromiumPage {
    async fn goto(
        &self,
        url: &Url,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let page = self.page()?;
        let navigate = async {
            page.goto(url.as_str())
                .await
                .map_err(|e| RenderError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            self.wait_until_loaded(wait).await;
            Ok(())
        };

        tokio::time::timeout(timeout, navigate)
            .await
            .unwrap_or(Err(RenderError::Timeout {
                elapsed_ms: timeout.as_millis() as u64,
            }))
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.page()?
            .content()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }

    async fn title(&self) -> Result<Option<String>, RenderError> {
        self.page()?
            .get_title()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RenderError> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| RenderError::Protocol(e.to_string())),
            None => Err(RenderError::Closed),
        }
    }
}
