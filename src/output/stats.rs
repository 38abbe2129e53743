//! Statistics generation from the novel database
//!
//! This module provides functionality for extracting and displaying
//! record counts and run history from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::SpiderError;

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct NovelStatistics {
    /// Total number of stored novels
    pub total_novels: u64,

    /// Novel counts per category, largest first
    pub by_category: Vec<(String, u64)>,

    /// Novel counts per serialization status, largest first
    pub by_status: Vec<(String, u64)>,

    /// Most recent crawl run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(NovelStatistics)` - Successfully loaded statistics
/// * `Err(SpiderError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<NovelStatistics, SpiderError> {
    Ok(NovelStatistics {
        total_novels: storage.count_novels()?,
        by_category: storage.count_by_category()?,
        by_status: storage.count_by_status()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Formats statistics for the console
pub fn format_statistics(stats: &NovelStatistics) -> String {
    let mut out = String::new();

    out.push_str("=== Novel Statistics ===\n\n");
    out.push_str(&format!("Total novels: {}\n\n", stats.total_novels));

    push_breakdown(&mut out, "By Category", &stats.by_category, stats.total_novels);
    push_breakdown(&mut out, "By Status", &stats.by_status, stats.total_novels);

    match &stats.latest_run {
        Some(run) => {
            out.push_str("Latest Run:\n");
            out.push_str(&format!("  Run ID: {}\n", run.id));
            out.push_str(&format!("  Status: {}\n", run.status.to_db_string()));
            out.push_str(&format!("  Started: {}\n", run.started_at));
            if let Some(finished) = &run.finished_at {
                out.push_str(&format!("  Finished: {}\n", finished));
            }
            out.push_str(&format!(
                "  Pages: {} after page {} ({} fetched, {} failed)\n",
                run.page_count, run.from_page, run.totals.pages_fetched, run.totals.pages_failed
            ));
            out.push_str(&format!("  Novels saved: {}\n", run.totals.records_saved));
        }
        None => out.push_str("No crawl runs recorded\n"),
    }

    out
}

fn push_breakdown(out: &mut String, title: &str, counts: &[(String, u64)], total: u64) {
    if counts.is_empty() {
        return;
    }

    out.push_str(&format!("{}:\n", title));
    for (name, count) in counts {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        out.push_str(&format!("  {}: {} ({:.1}%)\n", name, count, percentage));
    }
    out.push('\n');
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &NovelStatistics) {
    print!("{}", format_statistics(stats));
}
