//! Robots.txt handling module
//!
//! Optional politeness layer: when enabled, robots.txt is fetched once per
//! origin and disallowed URLs are dropped before they are queued.

mod cache;
mod policy;

pub use cache::RobotsCache;
pub use policy::RobotsPolicy;
