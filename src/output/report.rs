//! Final session report
//!
//! A `SessionReport` is the serializable snapshot of a finished crawl: what
//! was discovered, fetched, downloaded and classified, what failed and why.

use crate::classify::ClassifiedRecord;
use crate::crawler::FetchResult;
use crate::resources::{DownloadState, ResourceRecord};
use crate::state::{CrawlPhase, CrawlSession, ErrorEntry, SessionCounters, UrlState};
use crate::url::UrlHint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Cancelled,
    BudgetExhausted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coverage counters over the frontier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// URLs accepted into the frontier
    pub discovered: usize,

    /// URLs fetched successfully
    pub processed: usize,

    pub failed: usize,

    /// URLs observed but rejected (scope, depth, robots.txt)
    pub skipped: usize,

    /// URLs still queued when the session stopped
    pub unvisited: usize,
}

/// One discovered URL in the sitemap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub url: String,
    pub depth: u32,
    pub hint: UrlHint,
    pub discovered_from: Option<String>,
    pub state: UrlState,
    pub first_seen_at: DateTime<Utc>,
}

/// A URL that ended failed, with the last recorded reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub reason: String,
}

/// A URL that was observed but never queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: CrawlPhase,
    pub entered_at: DateTime<Utc>,
}

/// Everything a finished crawl produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub config_hash: String,

    pub coverage: Coverage,
    pub counters: SessionCounters,

    /// Pages fetched per strategy (`static`, `rendered`)
    pub strategy_counts: BTreeMap<String, usize>,

    /// Pages per HTTP status code
    pub status_histogram: BTreeMap<u16, usize>,

    /// Classified records per kind
    pub record_kinds: BTreeMap<String, usize>,

    /// Resources per download state
    pub resource_states: BTreeMap<String, usize>,

    pub phases: Vec<PhaseEntry>,

    pub pages: Vec<FetchResult>,
    pub resources: Vec<ResourceRecord>,
    pub records: Vec<ClassifiedRecord>,
    pub errors: Vec<ErrorEntry>,
    pub failed_urls: Vec<FailedUrl>,
    pub skipped: Vec<SkippedUrl>,
    pub sitemap: Vec<SitemapEntry>,
}

impl SessionReport {
    /// Snapshots a session into a report
    ///
    /// # Arguments
    ///
    /// * `session` - The session to snapshot; it is only read
    /// * `status` - How the session ended
    pub fn from_session(session: &CrawlSession, status: SessionStatus) -> Self {
        let pages = session.pages();
        let resources = session.resources();
        let records = session.records();
        let errors = session.errors();

        let (sitemap, skipped) = {
            let frontier = session.frontier();
            let sitemap: Vec<SitemapEntry> = frontier
                .entries()
                .map(|(entry, state)| SitemapEntry {
                    url: entry.url.to_string(),
                    depth: entry.depth,
                    hint: entry.hint,
                    discovered_from: entry.discovered_from.as_ref().map(|u| u.to_string()),
                    state,
                    first_seen_at: entry.first_seen_at,
                })
                .collect();
            let skipped = frontier
                .skipped()
                .into_iter()
                .map(|(url, reason)| SkippedUrl { url, reason })
                .collect::<Vec<_>>();
            (sitemap, skipped)
        };

        let count_state = |state: UrlState| sitemap.iter().filter(|e| e.state == state).count();
        let coverage = Coverage {
            discovered: sitemap.len(),
            processed: count_state(UrlState::Visited),
            failed: count_state(UrlState::Failed),
            skipped: skipped.len(),
            unvisited: count_state(UrlState::Queued) + count_state(UrlState::InFlight),
        };

        let failed_urls = sitemap
            .iter()
            .filter(|e| e.state == UrlState::Failed)
            .map(|e| FailedUrl {
                url: e.url.clone(),
                reason: errors
                    .iter()
                    .rev()
                    .find(|err| err.url == e.url)
                    .map(|err| err.reason.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();

        let mut strategy_counts = BTreeMap::new();
        let mut status_histogram = BTreeMap::new();
        for page in &pages {
            *strategy_counts
                .entry(page.strategy_used.to_string())
                .or_insert(0) += 1;
            *status_histogram.entry(page.http_status).or_insert(0) += 1;
        }

        let mut record_kinds = BTreeMap::new();
        for record in &records {
            *record_kinds.entry(record.kind.to_string()).or_insert(0) += 1;
        }

        let mut resource_states = BTreeMap::new();
        for resource in &resources {
            let label = match resource.download_state {
                DownloadState::Pending => "pending",
                DownloadState::Downloading => "downloading",
                DownloadState::Done => "done",
                DownloadState::Failed => "failed",
            };
            *resource_states.entry(label.to_string()).or_insert(0) += 1;
        }

        let phases = session
            .phase_log()
            .into_iter()
            .map(|(phase, entered_at)| PhaseEntry { phase, entered_at })
            .collect();

        Self {
            id: session.id().to_string(),
            started_at: session.started_at(),
            finished_at: Utc::now(),
            status,
            config_hash: session.config_hash().to_string(),
            coverage,
            counters: session.counters(),
            strategy_counts,
            status_histogram,
            record_kinds,
            resource_states,
            phases,
            pages,
            resources,
            records,
            errors,
            failed_urls,
            skipped,
            sitemap,
        }
    }

    /// Wall-clock duration of the session in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Share of fetched-or-failed URLs that were fetched, as a percentage
    pub fn success_rate(&self) -> f64 {
        let attempted = self.coverage.processed + self.coverage.failed;
        if attempted == 0 {
            return 0.0;
        }
        (self.coverage.processed as f64 / attempted as f64) * 100.0
    }
}
