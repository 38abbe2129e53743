//! Crawler module for listing page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with session cookies, retries and block detection
//! - Listing page parsing into novel records
//! - Relative update-time normalization
//! - Request pacing and the periodic trigger
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod time;

pub use coordinator::{Coordinator, CrawlSummary, StopReason};
pub use fetcher::{build_http_client, is_block_signature, Attempt, PageFetcher};
pub use parser::{novel_id_from_url, parse_listing, parse_word_count, ParsedPage, SkipReason};
pub use scheduler::{run_schedule, until_next_tick, Pacing};
pub use time::{normalize_update_time, TimeParseError};

