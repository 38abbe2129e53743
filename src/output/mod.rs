//! Output module for console rendering
//!
//! This module handles:
//! - Rendering search result pages
//! - Rendering crawl run summaries
//! - Recording store statistics

pub mod stats;

pub use stats::{format_statistics, load_statistics, print_statistics, NovelStatistics};

use crate::crawler::{CrawlSummary, StopReason};
use crate::storage::{Novel, SearchPage, TIMESTAMP_FORMAT};

/// Formats a single novel as one console line
pub fn format_novel(novel: &Novel) -> String {
    format!(
        "[{}] {} - {} | {} | {} | {}字 | {} | {}",
        novel.id,
        novel.title,
        novel.author,
        novel.category,
        novel.status,
        novel.word_count,
        novel.updated_at.format(TIMESTAMP_FORMAT),
        novel.source_url
    )
}

/// Formats a page of search results
pub fn format_search_page(page: &SearchPage) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Found {} novel(s), page {} of {} ({} per page)\n\n",
        page.total,
        page.page + 1,
        page.total_pages().max(1),
        page.page_size
    ));

    for novel in &page.items {
        out.push_str(&format_novel(novel));
        out.push('\n');
        if !novel.description.is_empty() {
            out.push_str(&format!("    {}\n", novel.description));
        }
    }

    out
}

/// Formats the summary of a finished crawl run
pub fn format_run_summary(summary: &CrawlSummary) -> String {
    let mut out = String::new();

    out.push_str("=== Crawl Summary ===\n\n");
    match summary.run_id {
        Some(id) => out.push_str(&format!("Run ID: {}\n", id)),
        None => out.push_str("Run ID: (not recorded)\n"),
    }
    out.push_str(&format!("Pages fetched: {}\n", summary.pages_fetched));
    out.push_str(&format!("Pages failed: {}\n", summary.pages_failed));
    out.push_str(&format!("Novels saved: {}\n", summary.records_saved));
    out.push_str(&format!("Items skipped: {}\n", summary.items_skipped));

    let stop = match summary.stop {
        StopReason::Completed => "all requested pages visited".to_string(),
        StopReason::EmptyPage(page) => format!("page {} had no novels", page),
        StopReason::TooManyErrors(errors) => format!("{} pages failed in a row", errors),
    };
    out.push_str(&format!("Stopped: {}\n", stop));

    out
}

pub fn print_search_page(page: &SearchPage) {
    print!("{}", format_search_page(page));
}

pub fn print_run_summary(summary: &CrawlSummary) {
    print!("{}", format_run_summary(summary));
}
