//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{Novel, RunRecord, RunStatus, SearchPage, SearchQuery};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Counters written when a crawl run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub records_saved: u64,
}

/// Trait for storage backend implementations
///
/// This is the store gateway consumed by the crawl coordinator: upsert by
/// novel id, filtered paged search, and crawl run bookkeeping.
pub trait Storage {
    // ===== Novels =====

    /// Inserts a novel or updates the existing row with the same id
    ///
    /// `created_at` is written only when the row is first inserted.
    fn upsert_novel(&mut self, novel: &Novel) -> StorageResult<()>;

    /// Gets a novel by id
    fn get_novel(&self, id: i64) -> StorageResult<Option<Novel>>;

    /// Searches novels with optional filters
    ///
    /// Title and author match by substring, status and category exactly.
    fn search_novels(&self, query: &SearchQuery) -> StorageResult<SearchPage>;

    /// Gets the total number of stored novels
    fn count_novels(&self) -> StorageResult<u64>;

    /// Gets novel counts grouped by category, largest first
    fn count_by_category(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Gets novel counts grouped by status, largest first
    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(&mut self, config_hash: &str, from_page: u32, page_count: u32)
        -> StorageResult<i64>;

    /// Marks a run as finished with its final status and counters
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: RunTotals)
        -> StorageResult<()>;

    /// Gets a run by id
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks runs left in the running state by a dead process as interrupted
    ///
    /// Returns the number of runs updated.
    fn mark_interrupted_runs(&mut self) -> StorageResult<usize>;
}
