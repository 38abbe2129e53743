//! Config file loading
//!
//! Every key in the file is optional; missing keys and whole missing sections
//! take their values from the `#[serde(default)]` impls in `types.rs`. The
//! file text is hashed alongside parsing so each crawl run can record which
//! settings it ran with.

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates a config file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use novel_spider::config::load_config;
///
/// let config = load_config(Path::new("spider.toml")).unwrap();
/// println!("Base URL: {}", config.spider.base_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parses and validates config text; an empty string yields the defaults
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of the config file as stored on disk
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(hash_text(&text))
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Loads a config file together with the hash recorded on each crawl run
///
/// The file is read once, so the hash always describes the text that was
/// actually parsed.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    Ok((config, hash_text(&text)))
}
