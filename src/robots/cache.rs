//! Per-origin robots.txt cache

use crate::robots::RobotsPolicy;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches robots.txt once per origin and answers allow checks
///
/// A missing robots.txt (4xx) allows everything, as does one that cannot be
/// fetched at all. The lock is held across the fetch so an origin is never
/// requested twice.
pub struct RobotsCache {
    client: Client,
    agent: String,
    policies: Mutex<HashMap<String, RobotsPolicy>>,
}

impl RobotsCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for robots.txt requests
    /// * `agent` - Product token matched against `User-agent` lines
    pub fn new(client: Client, agent: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            policies: Mutex::new(HashMap::new()),
        }
    }

    /// Checks if `url` may be crawled
    pub async fn allows(&self, url: &Url) -> bool {
        self.policy_for(url).await.allows(url.as_str(), &self.agent)
    }

    /// Crawl delay the origin of `url` asks for
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        self.policy_for(url)
            .await
            .crawl_delay(&self.agent)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    async fn policy_for(&self, url: &Url) -> RobotsPolicy {
        let origin = url.origin().ascii_serialization();
        let mut policies = self.policies.lock().await;

        if let Some(policy) = policies.get(&origin) {
            return policy.clone();
        }

        let policy = self.fetch(&origin).await;
        policies.insert(origin, policy.clone());
        policy
    }

    async fn fetch(&self, origin: &str) -> RobotsPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        let response = self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    tracing::debug!(url = %robots_url, "Loaded robots.txt");
                    RobotsPolicy::from_content(&body)
                }
                Err(e) => {
                    tracing::warn!(url = %robots_url, error = %e, "Unreadable robots.txt, allowing all");
                    RobotsPolicy::allow_all()
                }
            },
            Ok(response) => {
                tracing::debug!(
                    url = %robots_url,
                    status = response.status().as_u16(),
                    "No robots.txt, allowing all"
                );
                RobotsPolicy::allow_all()
            }
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
                RobotsPolicy::allow_all()
            }
        }
    }
}
