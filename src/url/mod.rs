//! URL handling module for Sitesift
//!
//! This module provides URL canonicalization, link resolution, host extraction,
//! scope pattern matching, URL hints and the crawl scope policy.

mod hint;
mod matcher;
mod normalize;

use crate::config::Config;
use crate::resources::ResourceKind;
use crate::{FetchError, FetchOutcomeResult};
use std::collections::HashSet;
use url::Url;

// Re-export main functions
pub use hint::UrlHint;
pub use matcher::{first_match, matches_pattern};
pub use normalize::{canonicalize, canonicalize_url, resolve};

/// Path extensions that are never pages and never downloaded
const NON_PAGE_EXTENSIONS: &[&str] = &["css", "js", "ico", "woff", "woff2", "ttf", "eot"];

/// Path fragments of endpoints that are never crawled
const EXCLUDED_PATH_FRAGMENTS: &[&str] = &["/admin", "/login", "/logout", "/_", "/api/"];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitesift::url::extract_host;
///
/// let url = Url::parse("https://Sub.Example.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the lowercase extension of the URL's last path segment, if any
pub fn path_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Decides which URLs belong to the crawl
///
/// Checks, in order:
/// 1. Host: only the seeds' hosts unless external links are followed
/// 2. Built-in exclusions: non-page file types, resources, admin/login/API paths
/// 3. Configured exclude patterns
/// 4. Configured include patterns (non-seed URLs only)
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    hosts: HashSet<String>,
    follow_external: bool,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ScopePolicy {
    /// Builds the policy from the configuration; the seed hosts form the home set
    pub fn from_config(config: &Config) -> Self {
        let hosts = config
            .crawler
            .seeds
            .iter()
            .filter_map(|seed| Url::parse(seed).ok())
            .filter_map(|url| extract_host(&url))
            .collect();

        Self {
            hosts,
            follow_external: config.crawler.follow_external_links,
            include: config.scope.include_patterns.clone(),
            exclude: config.scope.exclude_patterns.clone(),
        }
    }

    /// Returns true if the URL's host is one of the seed hosts
    pub fn is_home_host(&self, url: &Url) -> bool {
        extract_host(url).map_or(false, |host| self.hosts.contains(&host))
    }

    /// Checks a canonical URL against the policy
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The URL may be queued
    /// * `Err(FetchError::ScopeViolation)` - The URL is rejected, with the reason
    pub fn check(&self, url: &Url, is_seed: bool) -> FetchOutcomeResult<()> {
        if !self.follow_external && !self.is_home_host(url) {
            return Err(violation(format!(
                "external host {}",
                url.host_str().unwrap_or_default()
            )));
        }

        if let Some(ext) = path_extension(url) {
            if NON_PAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Err(violation(format!("non-page extension .{}", ext)));
            }
        }

        if let Some(kind) = ResourceKind::from_url(url) {
            return Err(violation(format!("{} resource", kind.as_str())));
        }

        let path = url.path().to_ascii_lowercase();
        if let Some(fragment) = EXCLUDED_PATH_FRAGMENTS
            .iter()
            .find(|fragment| path.contains(*fragment))
        {
            return Err(violation(format!("excluded path {}", fragment)));
        }

        if let Some(pattern) = first_match(&self.exclude, url.as_str()) {
            return Err(violation(format!("matches exclude pattern '{}'", pattern)));
        }

        if !is_seed && !self.include.is_empty() && first_match(&self.include, url.as_str()).is_none()
        {
            return Err(violation("matches no include pattern".to_string()));
        }

        Ok(())
    }
}

fn violation(reason: String) -> FetchError {
    FetchError::ScopeViolation { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config::for_seeds(["http://site.test/"])
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_home_host_allowed() {
        let policy = ScopePolicy::from_config(&create_test_config());
        assert!(policy.check(&url("http://site.test/about"), false).is_ok());
        assert!(policy.check(&url("http://SITE.test/news"), false).is_ok());
    }

    #[test]
    fn test_external_host_rejected_by_default() {
        let policy = ScopePolicy::from_config(&create_test_config());
        let result = policy.check(&url("http://external.test/x"), false);
        assert!(matches!(result, Err(FetchError::ScopeViolation { .. })));
    }

    #[test]
    fn test_external_host_allowed_when_enabled() {
        let mut config = create_test_config();
        config.crawler.follow_external_links = true;
        let policy = ScopePolicy::from_config(&config);
        assert!(policy.check(&url("http://external.test/x"), false).is_ok());
    }

    #[test]
    fn test_builtin_exclusions() {
        let policy = ScopePolicy::from_config(&create_test_config());
        for rejected in [
            "http://site.test/style.css",
            "http://site.test/app.js",
            "http://site.test/fonts/a.woff2",
            "http://site.test/logo.png",
            "http://site.test/catalog.pdf",
            "http://site.test/admin/index",
            "http://site.test/login",
            "http://site.test/_next/data",
            "http://site.test/api/items",
        ] {
            assert!(
                policy.check(&url(rejected), false).is_err(),
                "expected {} to be rejected",
                rejected
            );
        }
    }

    #[test]
    fn test_exclude_patterns() {
        let mut config = create_test_config();
        config.scope.exclude_patterns = vec!["/cart".to_string()];
        let policy = ScopePolicy::from_config(&config);
        assert!(policy.check(&url("http://site.test/cart/view"), false).is_err());
        assert!(policy.check(&url("http://site.test/catalog"), false).is_ok());
    }

    #[test]
    fn test_include_patterns_skip_seeds() {
        let mut config = create_test_config();
        config.scope.include_patterns = vec!["/products".to_string()];
        let policy = ScopePolicy::from_config(&config);

        assert!(policy.check(&url("http://site.test/"), true).is_ok());
        assert!(policy.check(&url("http://site.test/"), false).is_err());
        assert!(policy
            .check(&url("http://site.test/products/1"), false)
            .is_ok());
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(
            path_extension(&url("http://s.test/a/B.PDF?x=1")),
            Some("pdf".to_string())
        );
        assert_eq!(path_extension(&url("http://s.test/a/b")), None);
        assert_eq!(path_extension(&url("http://s.test/")), None);
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host(&url("https://blog.example.com/post")),
            Some("blog.example.com".to_string())
        );
        assert_eq!(
            extract_host(&url("http://127.0.0.1:9000/")),
            Some("127.0.0.1".to_string())
        );
    }
}
