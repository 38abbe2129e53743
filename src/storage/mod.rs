//! Storage module for persisting crawl results
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Novel upsert keyed by the listing id
//! - Filtered, paged novel search
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RunTotals, Storage, StorageError, StorageResult};

use chrono::NaiveDateTime;

/// Text format used for every stored timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest page size accepted by `search_novels`
pub const MAX_PAGE_SIZE: u32 = 100;

/// One listed novel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Novel {
    /// Natural key taken from the detail-page URL
    pub id: i64,
    pub title: String,
    pub author: String,
    pub category: String,
    pub status: String,
    /// Characters, already multiplied out from the 万字 unit
    pub word_count: i64,
    pub description: String,
    /// Absolute URL of the detail page
    pub source_url: String,
    /// Set by storage on first insert; `None` until then
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

/// Filters and paging for a novel search
///
/// Empty strings are treated the same as absent filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    /// Zero-based page index
    pub page: u32,
    pub page_size: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            title: None,
            author: None,
            status: None,
            category: None,
            page: 0,
            page_size: 20,
        }
    }
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<Novel>,
    /// Matching rows across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl SearchPage {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub from_page: u32,
    pub page_count: u32,
    pub totals: RunTotals,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Every requested page was visited
    Completed,
    /// A stop condition ended the run early
    Stopped,
    /// The process died while the run was active
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Stopped,
            RunStatus::Interrupted,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_total_pages() {
        let page = SearchPage {
            items: Vec::new(),
            total: 41,
            page: 0,
            page_size: 20,
        };
        assert_eq!(page.total_pages(), 3);

        let empty = SearchPage {
            total: 0,
            ..page
        };
        assert_eq!(empty.total_pages(), 0);
    }
}
