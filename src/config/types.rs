use serde::Deserialize;
use std::time::Duration;

/// Browser user agent presented to the listing site
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

/// Cookie used until the site issues a fresh session
pub const DEFAULT_COOKIE: &str = "fontSize=20px; ismini=1; isnight=1; server_name_session=c570e5ab596085fde0ac25c25e6b570f; 21b687374f9f2d27e97e76ebcbed1570=692740f22aa1e357e1043b306172f70f";

/// Main configuration structure for Novel-Spider
///
/// Every section is optional; an empty file yields the production defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spider: SpiderConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub pacing: PacingConfig,
    pub crawl: CrawlConfig,
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
}

/// Source site configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpiderConfig {
    /// Base URL of the listing site, without trailing slash
    pub base_url: String,

    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,

    /// Number of pages covered by a scheduled run
    pub max_pages: u32,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://www.999xiaoshuo.cc".to_string(),
            timeout_ms: 10_000,
            max_pages: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SpiderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Base URL with any trailing slash removed
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// File holding the last known cookie string
    pub cookie_file: String,

    /// Cookie used when no persisted cookie exists
    pub default_cookie: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_file: "cookies.txt".to_string(),
            default_cookie: DEFAULT_COOKIE.to_string(),
        }
    }
}

/// Per-page retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Failed attempts allowed per page
    pub max_attempts: u32,

    /// First backoff delay (milliseconds), doubled after every failure
    pub initial_delay_ms: u64,

    /// Cooldown after the upstream drops a connection without headers (milliseconds)
    pub block_cooldown_ms: u64,

    /// Consecutive session challenges tolerated per page
    pub max_challenges: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 5_000,
            block_cooldown_ms: 300_000,
            max_challenges: 3,
        }
    }
}

/// Delay between consecutive listing pages
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PacingConfig {
    pub base_delay_ms: u64,
    pub per_page_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 10_000,
            per_page_delay_ms: 10,
            jitter_ms: 1_000,
        }
    }
}

/// Run-level stop conditions
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// The run stops once the error counter exceeds this value
    pub max_errors: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self { max_errors: 10 }
    }
}

/// Periodic trigger configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Seconds between scheduled runs; ticks align to multiples of this value
    pub interval_secs: u64,

    /// Whether to start a run immediately when the daemon starts
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            run_on_start: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "novels.db".to_string(),
        }
    }
}
