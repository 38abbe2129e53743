//! Novel-Spider: a paced crawler for a single novel-listing site
//!
//! This crate fetches paginated listing pages, extracts novel records from
//! them and upserts the records into a SQLite store for later search. The
//! session cookie issued by the site is tracked across requests and persisted
//! across restarts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Novel-Spider operations
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Upstream closed the connection without a response for {url}: {message}")]
    UpstreamBlocked { url: String, message: String },

    #[error("Session challenge for page {page} not resolved after {challenges} cookie updates")]
    SessionChallenge { page: u32, challenges: u32 },

    #[error("Page {page} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        page: u32,
        attempts: u32,
        last: Box<SpiderError>,
    },

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Novel-Spider operations
pub type Result<T> = std::result::Result<T, SpiderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlSummary, StopReason};
pub use state::{RunFlag, SessionState};
pub use storage::{Novel, SearchPage, SearchQuery, SqliteStorage};
