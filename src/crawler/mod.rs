//! Crawler module for page discovery, fetching and orchestration
//!
//! This module contains the core crawling logic, including:
//! - The URL frontier (dedup, depth limits, breadth-first order)
//! - Per-page strategy selection (static or rendered)
//! - Page fetching with timeout and retry under either strategy
//! - HTML parsing for text, metadata, links and resources
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod strategy;

pub use coordinator::{run_crawl, Coordinator, CrawlOutcome};
pub use fetcher::{
    build_http_client, FetchOutcome, FetchResult, FetchStrategy, PageFetcher, RawDocument,
    RenderedFetcher, StaticFetcher,
};
pub use frontier::{DiscoveredUrl, EnqueueOutcome, Frontier};
pub use parser::{parse_page, PageMetadata, ParsedPage};
pub use strategy::{score_markup, Strategy, StrategyDecision, StrategyScores, StrategySelector};
