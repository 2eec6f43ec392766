//! Console statistics for a finished session

use crate::output::report::SessionReport;

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_statistics(report: &SessionReport) {
    println!("=== Crawl Statistics ===\n");

    println!("Session {} ({})", report.id, report.status);
    println!("  Duration: {:.1}s", report.duration_secs());
    println!();

    println!("Coverage:");
    println!("  Discovered: {}", report.coverage.discovered);
    println!("  Processed:  {}", report.coverage.processed);
    println!("  Failed:     {}", report.coverage.failed);
    println!("  Skipped:    {}", report.coverage.skipped);
    if report.coverage.unvisited > 0 {
        println!("  Unvisited:  {}", report.coverage.unvisited);
    }
    println!();

    if !report.strategy_counts.is_empty() {
        println!("Pages by Strategy:");
        for (strategy, count) in &report.strategy_counts {
            println!("  {}: {}", strategy, count);
        }
        println!();
    }

    if !report.resources.is_empty() {
        println!("Resources ({}):", report.resources.len());
        for (state, count) in &report.resource_states {
            println!("  {}: {}", state, count);
        }
        println!("  Bytes downloaded: {}", report.counters.bytes_downloaded);
        println!();
    }

    if !report.record_kinds.is_empty() {
        println!("Classified Records:");
        let mut kinds: Vec<_> = report.record_kinds.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in kinds {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !report.failed_urls.is_empty() {
        println!("Failed URLs ({}):", report.failed_urls.len());
        for failed in report.failed_urls.iter().take(10) {
            println!("  - {} ({})", failed.url, failed.reason);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages successfully processed)",
        report.success_rate(),
        report.coverage.processed,
        report.coverage.processed + report.coverage.failed
    );
}
