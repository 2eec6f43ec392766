//! Markdown summary generation
//!
//! This module generates the human-readable `summary.md` of a session,
//! including coverage, per-strategy statistics, classified records and errors.

use crate::output::report::SessionReport;
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Rows shown in the failed and skipped URL tables
const TABLE_LIMIT: usize = 50;

/// Generates a markdown summary of a session report
///
/// # Arguments
///
/// * `report` - The finished session report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(report: &SessionReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a session report as markdown
pub fn format_markdown_summary(report: &SessionReport) -> String {
    let mut md = String::new();

    md.push_str("# Sitesift Crawl Summary\n\n");

    // Session metadata
    md.push_str("## Session Information\n\n");
    md.push_str(&format!("- **Session ID**: {}\n", report.id));
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        report.duration_secs()
    ));
    md.push_str(&format!("- **Status**: {}\n", report.status));
    md.push_str(&format!("- **Config Hash**: {}\n\n", report.config_hash));

    // Coverage
    md.push_str("## Coverage\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Discovered | {} |\n", report.coverage.discovered));
    md.push_str(&format!("| Processed | {} |\n", report.coverage.processed));
    md.push_str(&format!("| Failed | {} |\n", report.coverage.failed));
    md.push_str(&format!("| Skipped | {} |\n", report.coverage.skipped));
    md.push_str(&format!("| Unvisited | {} |\n\n", report.coverage.unvisited));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        report.success_rate()
    ));
    md.push_str(&format!(
        "- **Bytes Downloaded**: {}\n",
        report.counters.bytes_downloaded
    ));
    md.push_str(&format!("- **Errors**: {}\n\n", report.counters.errors));

    if !report.strategy_counts.is_empty() {
        md.push_str("## Fetch Strategies\n\n");
        md.push_str("| Strategy | Pages |\n");
        md.push_str("|----------|-------|\n");
        for (strategy, count) in &report.strategy_counts {
            md.push_str(&format!("| {} | {} |\n", strategy, count));
        }
        md.push('\n');
    }

    if !report.status_histogram.is_empty() {
        md.push_str("## HTTP Status Codes\n\n");
        md.push_str("| Status | Pages |\n");
        md.push_str("|--------|-------|\n");
        for (status, count) in &report.status_histogram {
            md.push_str(&format!("| {} | {} |\n", status, count));
        }
        md.push('\n');
    }

    if !report.resource_states.is_empty() {
        md.push_str("## Resources\n\n");
        md.push_str("| State | Count |\n");
        md.push_str("|-------|-------|\n");
        for (state, count) in &report.resource_states {
            md.push_str(&format!("| {} | {} |\n", state, count));
        }
        md.push('\n');
    }

    if !report.record_kinds.is_empty() {
        md.push_str("## Classified Records\n\n");
        md.push_str("| Kind | Records |\n");
        md.push_str("|------|---------|\n");
        for (kind, count) in &report.record_kinds {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !report.failed_urls.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for failed in report.failed_urls.iter().take(TABLE_LIMIT) {
            md.push_str(&format!("| {} | {} |\n", failed.url, escape_cell(&failed.reason)));
        }
        if report.failed_urls.len() > TABLE_LIMIT {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.failed_urls.len() - TABLE_LIMIT
            ));
        }
        md.push('\n');
    }

    if !report.skipped.is_empty() {
        md.push_str("## Skipped URLs\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for skipped in report.skipped.iter().take(TABLE_LIMIT) {
            md.push_str(&format!("| {} | {} |\n", skipped.url, escape_cell(&skipped.reason)));
        }
        if report.skipped.len() > TABLE_LIMIT {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.skipped.len() - TABLE_LIMIT
            ));
        }
        md.push('\n');
    }

    // Error log grouped by kind
    if !report.errors.is_empty() {
        let mut by_kind = std::collections::BTreeMap::new();
        for error in &report.errors {
            *by_kind.entry(error.kind.as_str()).or_insert(0usize) += 1;
        }
        md.push_str("## Error Summary\n\n");
        md.push_str("| Error Type | Count |\n");
        md.push_str("|------------|-------|\n");
        for (kind, count) in by_kind {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
