//! Crawl phase machine

use crate::SiftError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a crawl session
///
/// Phases only move forward. Skipping ahead is allowed (a session without
/// link following never enters `Discovering`, a cancelled one never enters
/// `Downloading`), going back is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    /// Session created, no work started yet
    Initialized,
    Discovering,
    Fetching,
    Downloading,
    Classifying,
    Reporting,
    Done,
}

impl CrawlPhase {
    /// Moves to `next`, failing unless `next` lies strictly after the current phase
    pub fn advance_to(self, next: CrawlPhase) -> crate::Result<CrawlPhase> {
        if next > self {
            Ok(next)
        } else {
            Err(SiftError::InvalidPhase {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Discovering => "discovering",
            Self::Fetching => "fetching",
            Self::Downloading => "downloading",
            Self::Classifying => "classifying",
            Self::Reporting => "reporting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
