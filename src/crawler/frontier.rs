//! URL frontier for managing traversal
//!
//! This module handles:
//! - Canonical deduplication of every URL the crawl observes
//! - Depth limiting and scope checks at enqueue time
//! - Breadth-first dequeue order (lower depth first, then discovery order)
//! - The queued -> in-flight -> visited/failed lifecycle

use crate::state::UrlState;
use crate::url::{canonicalize_url, ScopePolicy, UrlHint};
use crate::SiftError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use url::Url;

/// A URL the crawl has observed and accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredUrl {
    /// Canonical URL
    pub url: Url,

    /// Link distance from the seed (seeds are depth 0)
    pub depth: u32,

    /// Page the link was found on; None for seeds
    pub discovered_from: Option<Url>,

    pub hint: UrlHint,

    pub first_seen_at: DateTime<Utc>,
}

/// What `enqueue` did with a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The URL is new and now waits in the queue
    Queued,

    /// The canonical URL was already known
    Duplicate,

    /// The URL lies beyond the configured max depth
    TooDeep,

    /// The URL is malformed or outside the crawl scope
    Rejected(String),
}

/// A queue entry (lower depth pops first, then lower sequence number)
#[derive(Debug, Clone)]
struct QueuedUrl {
    key: String,
    depth: u32,
    seq: u64,
}

// BinaryHeap is a max-heap, so the comparison is reversed
impl Ord for QueuedUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedUrl {}

/// The set of known, queued, in-flight, visited and failed URLs
///
/// All keys are canonical URL strings, so two spellings of the same URL are
/// one entry. A URL's state only moves `Queued -> InFlight -> Visited | Failed`,
/// which guarantees that no URL is ever dequeued twice.
#[derive(Debug)]
pub struct Frontier {
    scope: ScopePolicy,
    max_depth: u32,
    queue: BinaryHeap<QueuedUrl>,
    known: HashMap<String, DiscoveredUrl>,
    states: HashMap<String, UrlState>,
    /// Canonical keys in discovery order
    order: Vec<String>,
    /// Rejected URLs with the rejection reason
    skipped: HashMap<String, String>,
    next_seq: u64,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `scope` - Host and pattern policy applied to every enqueued URL
    /// * `max_depth` - Deepest depth that is still queued
    pub fn new(scope: ScopePolicy, max_depth: u32) -> Self {
        Self {
            scope,
            max_depth,
            queue: BinaryHeap::new(),
            known: HashMap::new(),
            states: HashMap::new(),
            order: Vec::new(),
            skipped: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Adds a URL if it is new, within depth and in scope
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL; it is canonicalized before any check
    /// * `depth` - Depth the URL would be crawled at
    /// * `from` - Page the link was found on, or None for a seed
    pub fn enqueue(&mut self, url: &Url, depth: u32, from: Option<&Url>) -> EnqueueOutcome {
        let canonical = match canonicalize_url(url.clone()) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Rejected malformed URL");
                return EnqueueOutcome::Rejected(e.to_string());
            }
        };
        let key = canonical.to_string();

        if self.known.contains_key(&key) || self.skipped.contains_key(&key) {
            return EnqueueOutcome::Duplicate;
        }

        if depth > self.max_depth {
            tracing::trace!(url = %canonical, depth, "Beyond max depth");
            self.skipped.insert(key, "beyond max depth".to_string());
            return EnqueueOutcome::TooDeep;
        }

        if let Err(e) = self.scope.check(&canonical, from.is_none()) {
            tracing::debug!(url = %canonical, reason = %e, "Out of scope");
            let reason = e.to_string();
            self.skipped.insert(key, reason.clone());
            return EnqueueOutcome::Rejected(reason);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = DiscoveredUrl {
            hint: UrlHint::from_url(&canonical),
            url: canonical,
            depth,
            discovered_from: from.cloned(),
            first_seen_at: Utc::now(),
        };

        self.queue.push(QueuedUrl {
            key: key.clone(),
            depth,
            seq,
        });
        self.known.insert(key.clone(), entry);
        self.states.insert(key.clone(), UrlState::Queued);
        self.order.push(key);

        EnqueueOutcome::Queued
    }

    /// Records a URL as skipped without queueing it
    ///
    /// Used for rejections decided outside the frontier, such as robots.txt.
    /// Returns false if the URL was already known.
    pub fn skip(&mut self, url: &Url, reason: impl Into<String>) -> bool {
        let Ok(canonical) = canonicalize_url(url.clone()) else {
            return false;
        };
        let key = canonical.to_string();
        if self.known.contains_key(&key) || self.skipped.contains_key(&key) {
            return false;
        }
        self.skipped.insert(key, reason.into());
        true
    }

    /// Returns true if the canonical form of `url` was queued or skipped before
    pub fn is_known(&self, url: &Url) -> bool {
        canonicalize_url(url.clone())
            .map(|canonical| {
                let key = canonical.to_string();
                self.known.contains_key(&key) || self.skipped.contains_key(&key)
            })
            .unwrap_or(false)
    }

    /// Takes up to `n` queued URLs and marks them in-flight
    pub fn dequeue_batch(&mut self, n: usize) -> Vec<DiscoveredUrl> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));

        while batch.len() < n {
            let Some(queued) = self.queue.pop() else {
                break;
            };

            // The heap only ever holds Queued keys; anything else is stale
            if self.states.get(&queued.key) != Some(&UrlState::Queued) {
                continue;
            }

            self.states.insert(queued.key.clone(), UrlState::InFlight);
            if let Some(entry) = self.known.get(&queued.key) {
                batch.push(entry.clone());
            }
        }

        batch
    }

    /// Transitions an in-flight URL to visited
    pub fn mark_visited(&mut self, url: &Url) -> crate::Result<()> {
        self.transition(url, UrlState::Visited)
    }

    /// Transitions an in-flight URL to failed
    pub fn mark_failed(&mut self, url: &Url) -> crate::Result<()> {
        self.transition(url, UrlState::Failed)
    }

    fn transition(&mut self, url: &Url, next: UrlState) -> crate::Result<()> {
        let key = canonicalize_url(url.clone())
            .map(|canonical| canonical.to_string())
            .unwrap_or_else(|_| url.to_string());
        let current = self
            .states
            .get_mut(&key)
            .ok_or_else(|| SiftError::UnknownUrl(key.clone()))?;

        if !current.can_transition_to(next) {
            return Err(SiftError::InvalidTransition {
                from: *current,
                to: next,
            });
        }

        *current = next;
        Ok(())
    }

    /// Current state of a URL, if the frontier knows it
    pub fn state_of(&self, url: &Url) -> Option<UrlState> {
        let canonical = canonicalize_url(url.clone()).ok()?;
        self.states.get(canonical.as_str()).copied()
    }

    /// Number of URLs currently waiting in the queue
    pub fn queued_len(&self) -> usize {
        self.count(UrlState::Queued)
    }

    /// Returns true if no URL is waiting
    pub fn is_empty(&self) -> bool {
        self.queued_len() == 0
    }

    /// Number of URLs in the given state
    pub fn count(&self, state: UrlState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    /// Number of accepted URLs in any state
    pub fn discovered_len(&self) -> usize {
        self.known.len()
    }

    /// Number of URLs rejected by depth, scope or robots rules
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    /// URLs in the given state, in discovery order
    pub fn urls_in(&self, state: UrlState) -> Vec<Url> {
        self.entries()
            .filter(|(_, s)| *s == state)
            .map(|(entry, _)| entry.url.clone())
            .collect()
    }

    /// All accepted URLs with their current state, in discovery order
    pub fn entries(&self) -> impl Iterator<Item = (&DiscoveredUrl, UrlState)> + '_ {
        self.order.iter().filter_map(move |key| {
            let entry = self.known.get(key)?;
            let state = self.states.get(key)?;
            Some((entry, *state))
        })
    }

    /// Rejected URLs with their reasons, sorted by URL
    pub fn skipped(&self) -> Vec<(String, String)> {
        let mut skipped: Vec<(String, String)> = self
            .skipped
            .iter()
            .map(|(url, reason)| (url.clone(), reason.clone()))
            .collect();
        skipped.sort();
        skipped
    }
}
