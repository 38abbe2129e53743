//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Sending the session cookie and merging rotated cookies back
//! - Retry logic with exponential backoff
//! - Recognizing upstream blocks, which get a long cooldown instead

use crate::config::{Config, RetryConfig, SpiderConfig};
use crate::state::SessionState;
use crate::SpiderError;
use reqwest::header::{HeaderValue, COOKIE, REFERER, SET_COOKIE};
use reqwest::Client;
use std::error::Error as StdError;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Transport error text produced when the server hangs up before sending any
/// response header bytes
const BLOCK_SIGNATURES: &[&str] = &[
    "connection closed before message completed",
    "header parser received no bytes",
    "empty reply from server",
];

/// Outcome of a single request attempt
#[derive(Debug)]
pub enum Attempt {
    /// The listing page body
    Page(String),

    /// The server rotated the session cookie; the page must be requested again
    SessionChallenge,

    /// A transient failure worth retrying after backoff
    Retryable(SpiderError),

    /// The upstream dropped the connection without headers
    Blocked(SpiderError),

    /// A failure that retrying cannot fix
    Fatal(SpiderError),
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The source site configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SpiderConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if `message` looks like the upstream block signature
pub fn is_block_signature(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    BLOCK_SIGNATURES.iter().any(|sig| message.contains(sig))
}

/// Walks an error's source chain looking for the upstream block signature
fn is_upstream_block(error: &reqwest::Error) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if is_block_signature(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

/// Fetches listing pages, owning the session cookie
pub struct PageFetcher {
    client: Client,
    base_url: String,
    retry: RetryConfig,
    session: Mutex<SessionState>,
}

impl PageFetcher {
    /// Creates a fetcher with an explicit session
    pub fn new(
        spider: &SpiderConfig,
        retry: RetryConfig,
        session: SessionState,
    ) -> Result<Self, SpiderError> {
        Ok(Self {
            client: build_http_client(spider)?,
            base_url: spider.base().to_string(),
            retry,
            session: Mutex::new(session),
        })
    }

    /// Creates a fetcher whose session is loaded from the configured cookie file
    pub fn from_config(config: &Config) -> Result<Self, SpiderError> {
        let session = SessionState::load(
            &config.session.cookie_file,
            &config.session.default_cookie,
        );
        Self::new(&config.spider, config.retry.clone(), session)
    }

    /// URL of a listing page
    pub fn page_url(&self, page: u32) -> String {
        format!("{}/html/{}.html", self.base_url, page)
    }

    /// Returns a copy of the current cookie string
    pub fn current_cookie(&self) -> String {
        self.session().current().to_string()
    }

    fn session(&self) -> MutexGuard<'_, SessionState> {
        // A poisoned lock still holds a usable cookie string
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetches one listing page, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Outcome | Action |
    /// |---------|--------|
    /// | Page body | Return it |
    /// | `Set-Cookie` present | Merge cookie, request again at once |
    /// | Transport/body error | Retry after backoff (doubling) |
    /// | Connection closed without headers | Retry after the block cooldown |
    /// | Invalid request header | Fail immediately |
    ///
    /// Session challenges do not count as failed attempts but are capped by
    /// `max_challenges`. After `max_attempts` failures the last error is
    /// returned wrapped in `SpiderError::RetriesExhausted`.
    pub async fn fetch_page(&self, page: u32) -> Result<String, SpiderError> {
        let url = self.page_url(page);
        let mut backoff = Duration::from_millis(self.retry.initial_delay_ms);
        let mut failures = 0;
        let mut challenges = 0;

        loop {
            tracing::info!("Fetching page {} {}", page, url);

            let (error, delay) = match self.attempt(&url).await {
                Attempt::Page(body) => return Ok(body),
                Attempt::SessionChallenge => {
                    challenges += 1;
                    if challenges > self.retry.max_challenges {
                        return Err(SpiderError::SessionChallenge { page, challenges });
                    }
                    tracing::info!("Session challenge on page {}, retrying with new cookie", page);
                    continue;
                }
                Attempt::Fatal(error) => return Err(error),
                Attempt::Blocked(error) => {
                    (error, Duration::from_millis(self.retry.block_cooldown_ms))
                }
                Attempt::Retryable(error) => {
                    let delay = backoff;
                    backoff = backoff.saturating_mul(2);
                    (error, delay)
                }
            };

            failures += 1;
            tracing::warn!(
                "Failed to fetch page {} (attempt {}/{}): {}",
                page,
                failures,
                self.retry.max_attempts,
                error
            );

            if failures >= self.retry.max_attempts {
                return Err(SpiderError::RetriesExhausted {
                    page,
                    attempts: failures,
                    last: Box::new(error),
                });
            }

            if matches!(error, SpiderError::UpstreamBlocked { .. }) {
                tracing::warn!("Upstream block detected, cooling down for {:?}", delay);
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Performs a single GET of `url`
    ///
    /// Non-2xx responses are not errors; their body is returned like any
    /// other page.
    pub async fn attempt(&self, url: &str) -> Attempt {
        let cookie = self.current_cookie();
        let cookie = match HeaderValue::from_str(&cookie) {
            Ok(value) => value,
            Err(_) => {
                return Attempt::Fatal(SpiderError::InvalidHeader(format!(
                    "cookie '{}'",
                    cookie
                )))
            }
        };

        let request = self
            .client
            .get(url)
            .header(REFERER, self.base_url.as_str())
            .header(COOKIE, cookie);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_transport_error(url, e),
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Page {} answered with HTTP {}", url, status);
        }

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        let merged = self.session().merge(set_cookies.iter().map(String::as_str));
        if merged {
            return Attempt::SessionChallenge;
        }

        match response.text().await {
            Ok(body) => Attempt::Page(body),
            Err(e) => classify_transport_error(url, e),
        }
    }
}

/// Maps a reqwest error onto a retry decision
fn classify_transport_error(url: &str, error: reqwest::Error) -> Attempt {
    if is_upstream_block(&error) {
        Attempt::Blocked(SpiderError::UpstreamBlocked {
            url: url.to_string(),
            message: error.to_string(),
        })
    } else if error.is_timeout() {
        Attempt::Retryable(SpiderError::Timeout {
            url: url.to_string(),
        })
    } else if error.is_builder() {
        Attempt::Fatal(SpiderError::Http {
            url: url.to_string(),
            source: error,
        })
    } else {
        Attempt::Retryable(SpiderError::Http {
            url: url.to_string(),
            source: error,
        })
    }
}
