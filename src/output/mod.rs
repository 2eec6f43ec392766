//! Output module for session reports
//!
//! This module handles:
//! - Building the final `SessionReport` from a crawl session
//! - Writing the JSON files of the session directory
//! - Generating the markdown summary
//! - Printing console statistics

mod json;
mod markdown;
mod report;
pub mod stats;

pub use json::{write_json, write_session_files};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use report::{
    Coverage, FailedUrl, PhaseEntry, SessionReport, SessionStatus, SitemapEntry, SkippedUrl,
};
pub use stats::print_statistics;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Writes every report file into `dir`, creating it if needed
///
/// # Arguments
///
/// * `report` - The finished session report
/// * `dir` - The session directory
/// * `write_summary` - Whether `summary.md` is written
///
/// # Returns
///
/// The paths of the files written
pub fn write_report(
    report: &SessionReport,
    dir: &Path,
    write_summary: bool,
) -> OutputResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    write_session_files(report, dir)?;

    let mut written = vec![
        dir.join("session.json"),
        dir.join("sitemap.json"),
        dir.join("resources.json"),
    ];

    if write_summary {
        let path = dir.join("summary.md");
        generate_markdown_summary(report, &path)?;
        written.push(path);
    }

    tracing::info!(dir = %dir.display(), files = written.len(), "Report written");
    Ok(written)
}
