//! Environment configuration

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::backends::MokaCacheConfig;
use crate::cache_manager::DEFAULT_TAG_MARK_CAPACITY;
use crate::invalidation::InvalidationConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {name} has invalid value {value:?}")]
    InvalidEnvVar { name: &'static str, value: String },
    #[error("Failed to load environment file {path}: {message}")]
    EnvFile { path: String, message: String },
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct ParityConfig {
    pub cache: MokaCacheConfig,
    pub invalidation: InvalidationConfig,
    /// Invalidation marks kept before the oldest are folded into a floor
    pub tag_mark_capacity: usize,
    /// Public URL of this server, used in embed snippets and branding links
    pub server_base_url: String,
    /// Country assumed when a banner request carries none (local development)
    pub test_country_code: Option<String>,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            cache: MokaCacheConfig::default(),
            invalidation: InvalidationConfig::default(),
            tag_mark_capacity: DEFAULT_TAG_MARK_CAPACITY,
            server_base_url: "http://localhost:3000".to_string(),
            test_country_code: None,
        }
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar { name, value }),
    }
}

impl ParityConfig {
    /// Read configuration from the process environment
    ///
    /// Loads a `.env` file first if one is present. Unset variables keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for a variable that does not
    /// parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load `path` into the process environment, then read it like
    /// [`ParityConfig::from_env`]. Variables already set take precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvFile`] if the file cannot be read or parsed,
    /// and [`ConfigError::InvalidEnvVar`] for a variable that does not parse.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] for a variable that does not
    /// parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("PARITY_SERVER_URL").filter(|u| !u.trim().is_empty()) {
            config.server_base_url = url.trim().trim_end_matches('/').to_string();
        }
        config.test_country_code = lookup("PARITY_TEST_COUNTRY_CODE")
            .map(|code| code.trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty());

        if let Some(capacity) = parse(&lookup, "PARITY_CACHE_MAX_CAPACITY")? {
            config.cache.max_capacity = capacity;
        }
        if let Some(secs) = parse(&lookup, "PARITY_CACHE_TTL_SECS")? {
            config.cache.time_to_live = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "PARITY_CACHE_TTI_SECS")? {
            config.cache.time_to_idle = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse(&lookup, "PARITY_INVALIDATION_MAX_ATTEMPTS")? {
            config.invalidation.max_attempts = attempts;
        }
        if let Some(ms) = parse(&lookup, "PARITY_INVALIDATION_BACKOFF_MS")? {
            config.invalidation.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse(&lookup, "PARITY_CACHE_TAG_MARK_CAPACITY")? {
            config.tag_mark_capacity = capacity;
        }

        Ok(config)
    }
}
