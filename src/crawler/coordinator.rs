//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that drives a range of listing pages
//! through the fetcher and parser and upserts the resulting records. It
//! guarantees that at most one run is active per process, paces requests
//! between pages, and stops early when the site runs out of entries or keeps
//! failing.

use crate::config::Config;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::parser::parse_listing;
use crate::crawler::scheduler::Pacing;
use crate::state::RunFlag;
use crate::storage::{Novel, RunStatus, RunTotals, SqliteStorage, Storage};
use crate::SpiderError;
use chrono::Local;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use url::Url;

/// Why a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every requested page was visited
    Completed,
    /// The given page yielded no records
    EmptyPage(u32),
    /// The error counter exceeded the configured maximum
    TooManyErrors(u32),
}

/// Outcome of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Run history id, if the run could be recorded
    pub run_id: Option<i64>,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub records_saved: u64,
    pub items_skipped: usize,
    pub stop: StopReason,
}

impl CrawlSummary {
    fn new(run_id: Option<i64>) -> Self {
        Self {
            run_id,
            pages_fetched: 0,
            pages_failed: 0,
            records_saved: 0,
            items_skipped: 0,
            stop: StopReason::Completed,
        }
    }

    pub fn run_status(&self) -> RunStatus {
        match self.stop {
            StopReason::Completed => RunStatus::Completed,
            StopReason::EmptyPage(_) | StopReason::TooManyErrors(_) => RunStatus::Stopped,
        }
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            pages_fetched: self.pages_fetched,
            pages_failed: self.pages_failed,
            records_saved: self.records_saved,
        }
    }
}

/// Main crawler coordinator
///
/// Cloning is cheap; all clones share the same storage, session and run flag.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: Arc<str>,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<PageFetcher>,
    pacing: Pacing,
    base_url: Url,
    running: RunFlag,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens the configured database, loads the persisted session cookie and
    /// marks runs left over from a dead process as interrupted.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, recorded with each run
    pub fn new(config: Config, config_hash: &str) -> Result<Self, SpiderError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let fetcher = PageFetcher::from_config(&config)?;
        Self::from_parts(config, config_hash, storage, fetcher)
    }

    /// Creates a coordinator from an already opened storage and fetcher
    pub fn from_parts(
        config: Config,
        config_hash: &str,
        mut storage: SqliteStorage,
        fetcher: PageFetcher,
    ) -> Result<Self, SpiderError> {
        let interrupted = storage.mark_interrupted_runs()?;
        if interrupted > 0 {
            tracing::warn!("Marked {} unfinished run(s) as interrupted", interrupted);
        }

        let base_url = Url::parse(config.spider.base())?;

        Ok(Self {
            pacing: Pacing::new(config.pacing.clone()),
            config: Arc::new(config),
            config_hash: Arc::from(config_hash),
            storage: Arc::new(Mutex::new(storage)),
            fetcher: Arc::new(fetcher),
            base_url,
            running: RunFlag::new(),
        })
    }

    /// Shared handle to the store, for searches and statistics
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true while a crawl run is active
    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Starts a crawl of pages `from_page + 1 ..= from_page + page_count`
    ///
    /// The run executes on a background task. Returns `None` without doing
    /// anything if a run is already active; otherwise returns the task handle,
    /// which resolves to the run summary.
    pub fn start(&self, from_page: u32, page_count: u32) -> Option<JoinHandle<CrawlSummary>> {
        let Some(guard) = self.running.try_acquire() else {
            tracing::info!("Crawl already running, ignoring start request");
            return None;
        };

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            // Released on every exit path, including a panic inside the run
            let _guard = guard;
            let summary = coordinator.run(from_page, page_count).await;
            tracing::info!("Crawl run finished, run flag reset");
            summary
        }))
    }

    /// Starts a run over the configured default page count from page 0
    pub fn start_scheduled(&self) -> Option<JoinHandle<CrawlSummary>> {
        if self.is_running() {
            return None;
        }
        self.start(0, self.config.spider.max_pages)
    }

    /// Starts a run and waits for it to finish
    ///
    /// Returns `None` if another run was already active or the run task died.
    pub async fn crawl(&self, from_page: u32, page_count: u32) -> Option<CrawlSummary> {
        let handle = self.start(from_page, page_count)?;
        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("Crawl task failed: {}", e);
                None
            }
        }
    }

    /// Runs the page loop; every failure is contained in the summary
    async fn run(&self, from_page: u32, page_count: u32) -> CrawlSummary {
        let run_id = match self
            .lock_storage()
            .create_run(&self.config_hash, from_page, page_count)
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Failed to record crawl run: {}", e);
                None
            }
        };

        let mut summary = CrawlSummary::new(run_id);
        let max_errors = self.config.crawl.max_errors;
        let mut errors: u32 = 0;

        tracing::info!(
            "Starting crawl run {:?}: {} page(s) after page {}",
            run_id,
            page_count,
            from_page
        );

        for offset in 1..=page_count {
            let Some(page) = from_page.checked_add(offset) else {
                break;
            };

            match self.fetcher.fetch_page(page).await {
                Ok(body) => {
                    summary.pages_fetched += 1;

                    let parsed = parse_listing(&body, &self.base_url, Local::now().naive_local());
                    summary.items_skipped += parsed.skipped.len();
                    summary.records_saved += self.save_novels(&parsed.novels);

                    tracing::info!(
                        "Page {} done: {} novel(s), {} skipped",
                        page,
                        parsed.novels.len(),
                        parsed.skipped.len()
                    );

                    if parsed.novels.is_empty() {
                        tracing::info!("Page {} has no novels, stopping", page);
                        summary.stop = StopReason::EmptyPage(page);
                        break;
                    }
                    errors = 0;
                }
                Err(e) => {
                    summary.pages_failed += 1;
                    errors += 1;
                    tracing::error!("Failed to crawl page {}: {}", page, e);

                    if errors > max_errors {
                        tracing::warn!("{} consecutive page failures, stopping", errors);
                        summary.stop = StopReason::TooManyErrors(errors);
                        break;
                    }
                }
            }

            if offset < page_count {
                let delay = self.pacing.delay_after(page);
                tracing::debug!("Sleeping {:?} before next page", delay);
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(run_id) = run_id {
            if let Err(e) =
                self.lock_storage()
                    .finish_run(run_id, summary.run_status(), summary.totals())
            {
                tracing::warn!("Failed to record end of crawl run {}: {}", run_id, e);
            }
        }

        tracing::info!(
            "Crawl run {:?} ended ({:?}): {} page(s) fetched, {} failed, {} novel(s) saved",
            run_id,
            summary.stop,
            summary.pages_fetched,
            summary.pages_failed,
            summary.records_saved
        );

        summary
    }

    /// Upserts parsed novels, returning how many were stored
    fn save_novels(&self, novels: &[Novel]) -> u64 {
        let mut storage = self.lock_storage();
        let mut saved = 0;

        for novel in novels {
            match storage.upsert_novel(novel) {
                Ok(()) => {
                    saved += 1;
                    tracing::info!(
                        "Saved novel: {} {} - {}",
                        novel.source_url,
                        novel.title,
                        novel.author
                    );
                }
                Err(e) => tracing::error!("Failed to save novel {}: {}", novel.id, e),
            }
        }

        saved
    }

    fn lock_storage(&self) -> MutexGuard<'_, SqliteStorage> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
