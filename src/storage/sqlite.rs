//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RunTotals, Storage, StorageError, StorageResult};
use crate::storage::{
    Novel, RunRecord, RunStatus, SearchPage, SearchQuery, MAX_PAGE_SIZE, TIMESTAMP_FORMAT,
};
use crate::SpiderError;
use chrono::{Local, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const NOVEL_COLUMNS: &str = "id, title, author, category, status, word_count, description,
     source_url, created_at, updated_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, from_page,
     page_count, pages_fetched, pages_failed, records_saved";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SpiderError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SpiderError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SpiderError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn novel_from_row(row: &Row<'_>) -> rusqlite::Result<Novel> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Novel {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        category: row.get(3)?,
        status: row.get(4)?,
        word_count: row.get(5)?,
        description: row.get(6)?,
        source_url: row.get(7)?,
        created_at: Some(parse_timestamp(8, &created_at)?),
        updated_at: parse_timestamp(9, &updated_at)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(4)?;
    let status = RunStatus::from_db_string(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            Box::new(StorageError::InvalidValue(format!("run status '{}'", status))),
        )
    })?;

    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status,
        from_page: row.get(5)?,
        page_count: row.get(6)?,
        totals: RunTotals {
            pages_fetched: row.get(7)?,
            pages_failed: row.get(8)?,
            records_saved: row.get::<_, i64>(9)? as u64,
        },
    })
}

/// Turns an optional filter into a bound parameter, treating blank as absent
fn filter_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Builds a `LIKE ... ESCAPE '\'` pattern matching `value` as a substring
fn like_pattern(value: Option<&str>) -> Option<String> {
    value.map(|v| {
        let escaped = v
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{}%", escaped)
    })
}

fn count_grouped(conn: &Connection, column: &str) -> StorageResult<Vec<(String, u64)>> {
    let query = format!(
        "SELECT {col}, COUNT(*) AS count FROM novels GROUP BY {col} ORDER BY count DESC, {col}",
        col = column
    );
    let mut stmt = conn.prepare(&query)?;

    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counts)
}

impl Storage for SqliteStorage {
    // ===== Novels =====

    fn upsert_novel(&mut self, novel: &Novel) -> StorageResult<()> {
        let created_at = novel
            .created_at
            .unwrap_or_else(|| Local::now().naive_local());

        self.conn.execute(
            "INSERT INTO novels (id, title, author, category, status, word_count, description,
             source_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                category = excluded.category,
                status = excluded.status,
                word_count = excluded.word_count,
                description = excluded.description,
                source_url = excluded.source_url,
                updated_at = excluded.updated_at",
            params![
                novel.id,
                novel.title,
                novel.author,
                novel.category,
                novel.status,
                novel.word_count,
                novel.description,
                novel.source_url,
                format_timestamp(&created_at),
                format_timestamp(&novel.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_novel(&self, id: i64) -> StorageResult<Option<Novel>> {
        let query = format!("SELECT {} FROM novels WHERE id = ?1", NOVEL_COLUMNS);
        let novel = self
            .conn
            .query_row(&query, params![id], novel_from_row)
            .optional()?;
        Ok(novel)
    }

    fn search_novels(&self, query: &SearchQuery) -> StorageResult<SearchPage> {
        let title = like_pattern(filter_value(&query.title));
        let author = like_pattern(filter_value(&query.author));
        let status = filter_value(&query.status);
        let category = filter_value(&query.category);

        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = query.page as i64 * page_size as i64;

        let filter = "(?1 IS NULL OR title LIKE ?1 ESCAPE '\\')
             AND (?2 IS NULL OR author LIKE ?2 ESCAPE '\\')
             AND (?3 IS NULL OR status = ?3)
             AND (?4 IS NULL OR category = ?4)";

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM novels WHERE {}", filter),
            params![title, author, status, category],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM novels WHERE {} ORDER BY updated_at DESC, id DESC LIMIT ?5 OFFSET ?6",
            NOVEL_COLUMNS, filter
        ))?;

        let items = stmt
            .query_map(
                params![title, author, status, category, page_size, offset],
                novel_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            items,
            total: total as u64,
            page: query.page,
            page_size,
        })
    }

    fn count_novels(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM novels", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        count_grouped(&self.conn, "category")
    }

    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>> {
        count_grouped(&self.conn, "status")
    }

    // ===== Run Management =====

    fn create_run(
        &mut self,
        config_hash: &str,
        from_page: u32,
        page_count: u32,
    ) -> StorageResult<i64> {
        let now = format_timestamp(&Local::now().naive_local());
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status, from_page, page_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                now,
                config_hash,
                RunStatus::Running.to_db_string(),
                from_page,
                page_count
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: RunTotals,
    ) -> StorageResult<()> {
        let now = format_timestamp(&Local::now().naive_local());
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_fetched = ?3,
             pages_failed = ?4, records_saved = ?5 WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                totals.pages_fetched,
                totals.pages_failed,
                totals.records_saved as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let query = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&query, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let query = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&query, [], run_from_row).optional()?;
        Ok(run)
    }

    fn mark_interrupted_runs(&mut self) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE status = ?2",
            params![
                RunStatus::Interrupted.to_db_string(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(updated)
    }
}
