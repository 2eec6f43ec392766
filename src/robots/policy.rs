//! robots.txt rules for one origin

use robotstxt::DefaultMatcher;

/// Parsed robots.txt rules
///
/// The `robotstxt` matcher evaluates allow/disallow rules on demand; the
/// crawl delay is read from the group that applies to the agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Raw robots.txt body; empty allows everything
    content: String,
}

impl RobotsPolicy {
    /// Creates a policy from a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Creates a policy that allows everything
    ///
    /// Used when an origin has no robots.txt or it cannot be fetched.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks if `url` may be fetched by `agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `agent` - Product token of the crawler (e.g. `sitesift`)
    pub fn allows(&self, url: &str, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// Crawl delay in seconds for `agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive user-agent lines share one group
                if !in_agent_lines {
                    group.clear();
                }
                group.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };

            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific.get_or_insert(delay);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard.get_or_insert(delay);
            }
        }

        specific.or(wildcard)
    }
}
