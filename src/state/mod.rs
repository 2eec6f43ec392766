//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState`: Lifecycle of a single URL (queued, in-flight, visited, failed)
//! - `CrawlPhase`: Forward-only phase machine of a session
//! - `CrawlSession`: Aggregate of everything one crawl run produces

mod phase;
mod session;
mod url_state;

// Re-export main types
pub use phase::CrawlPhase;
pub use session::{CrawlSession, ErrorEntry, SessionCounters};
pub use url_state::UrlState;
