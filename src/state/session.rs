//! Session cookie state shared by every request of the process
//!
//! The listing site rotates its session cookie as an anti-scraping measure.
//! Whenever a response carries `Set-Cookie` headers, the new pairs are merged
//! into the current cookie string, and the result is mirrored to a small file
//! so a restarted process resumes with the last known session.

use std::fs;
use std::path::{Path, PathBuf};

/// The active cookie string plus the file it is persisted to
#[derive(Debug, Clone)]
pub struct SessionState {
    cookie: String,
    path: Option<PathBuf>,
}

impl SessionState {
    /// Creates an in-memory session that is never persisted
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            path: None,
        }
    }

    /// Loads the persisted cookie, falling back to `default_cookie`
    ///
    /// A missing, empty or unreadable file is not an error: the default is
    /// used and the situation is logged.
    pub fn load(path: impl Into<PathBuf>, default_cookie: &str) -> Self {
        let path = path.into();

        let cookie = match fs::read_to_string(&path) {
            Ok(saved) if !saved.trim().is_empty() => {
                let saved = saved.trim().to_string();
                tracing::info!("Loaded cookie from {}: {}", path.display(), saved);
                saved
            }
            Ok(_) => {
                tracing::info!("Cookie file {} is empty, using default cookie", path.display());
                default_cookie.to_string()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Cookie file {} not found, using default cookie", path.display());
                default_cookie.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read cookie file {}, using default cookie: {}",
                    path.display(),
                    e
                );
                default_cookie.to_string()
            }
        };

        Self {
            cookie,
            path: Some(path),
        }
    }

    /// Returns the cookie string to send with the next request
    pub fn current(&self) -> &str {
        &self.cookie
    }

    /// Returns the file the cookie is persisted to, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Merges `Set-Cookie` header values into the current cookie
    ///
    /// Only the first `;`-delimited segment of each header is used. Existing
    /// pairs are overwritten by name and pairs whose value ends up empty are
    /// dropped. Returns `false` when there were no headers to merge.
    pub fn merge<'a, I>(&mut self, set_cookies: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set_cookies = set_cookies.into_iter().peekable();
        if set_cookies.peek().is_none() {
            return false;
        }

        let mut pairs = parse_cookie_pairs(&self.cookie);

        for header in set_cookies {
            let pair = header.split(';').next().unwrap_or_default();
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            match pairs.iter_mut().find(|(existing, _)| existing == name) {
                Some(entry) => entry.1 = value.trim().to_string(),
                None => pairs.push((name.to_string(), value.trim().to_string())),
            }
        }

        self.cookie = pairs
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");

        tracing::info!("Updated cookie: {}", self.cookie);
        self.persist();
        true
    }

    /// Writes the cookie to its file; failures are logged only
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };

        match fs::write(path, &self.cookie) {
            Ok(()) => tracing::debug!("Cookie saved to {}", path.display()),
            Err(e) => tracing::warn!("Failed to save cookie to {}: {}", path.display(), e),
        }
    }
}

/// Splits a `name=value; name=value` string into ordered pairs
///
/// Segments without `=` are discarded.
fn parse_cookie_pairs(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split("; ")
        .filter_map(|segment| segment.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .collect()
}
