/// URL lifecycle states
///
/// Every URL the frontier accepts is in exactly one of these states.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a URL in the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlState {
    // ===== Active States =====
    /// Accepted by the frontier and waiting for a worker
    Queued,

    /// Handed to a worker by `dequeue_batch`
    InFlight,

    // ===== Terminal States =====
    /// Fetched successfully; a FetchResult exists for it
    Visited,

    /// Fetch failed after all retries, or the worker never reported
    Failed,
}

impl UrlState {
    /// Returns true if no further work will happen for the URL
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Visited | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// Only `Queued -> InFlight` and `InFlight -> Visited | Failed` are legal.
    pub fn can_transition_to(&self, next: UrlState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InFlight)
                | (Self::InFlight, Self::Visited)
                | (Self::InFlight, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Visited => "visited",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
