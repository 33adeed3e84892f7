//! Configuration for the sync service.

use std::env;
use std::time::Duration;

use tandem_engine::{StoreConfig, DEFAULT_CACHE_KEY};

/// Quiet period before a burst of local edits is written.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Pause between consecutive remote writes.
pub const DEFAULT_WRITE_PAUSE: Duration = Duration::from_millis(100);

/// Sync configuration, loadable from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Debounce window for outbound writes
    pub debounce: Duration,
    /// Pause between two queued writes
    pub write_pause: Duration,
    /// Local cache key for the warm-start profile
    pub cache_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            write_pause: DEFAULT_WRITE_PAUSE,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// - `TANDEM_DEBOUNCE_MS` (default 500)
    /// - `TANDEM_WRITE_PAUSE_MS` (default 100)
    /// - `TANDEM_CACHE_KEY` (default `tandem.currentProfile`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let debounce = match lookup("TANDEM_DEBOUNCE_MS") {
            Some(raw) => parse_millis(&raw).ok_or(ConfigError::InvalidDebounce(raw))?,
            None => defaults.debounce,
        };

        let write_pause = match lookup("TANDEM_WRITE_PAUSE_MS") {
            Some(raw) => parse_millis(&raw).ok_or(ConfigError::InvalidWritePause(raw))?,
            None => defaults.write_pause,
        };

        let cache_key = match lookup("TANDEM_CACHE_KEY") {
            Some(key) if key.trim().is_empty() => return Err(ConfigError::EmptyCacheKey),
            Some(key) => key,
            None => defaults.cache_key,
        };

        Ok(Self {
            debounce,
            write_pause,
            cache_key,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_write_pause(mut self, pause: Duration) -> Self {
        self.write_pause = pause;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    /// Store configuration matching this sync configuration.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            cache_key: self.cache_key.clone(),
        }
    }
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_millis)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TANDEM_DEBOUNCE_MS value: {0}")]
    InvalidDebounce(String),

    #[error("Invalid TANDEM_WRITE_PAUSE_MS value: {0}")]
    InvalidWritePause(String),

    #[error("TANDEM_CACHE_KEY must not be empty")]
    EmptyCacheKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(500));
    }

    #[test]
    fn reads_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("TANDEM_DEBOUNCE_MS", "250"),
            ("TANDEM_WRITE_PAUSE_MS", " 20 "),
            ("TANDEM_CACHE_KEY", "profiles/current"),
        ]))
        .unwrap();

        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.write_pause, Duration::from_millis(20));
        assert_eq!(config.store_config().cache_key, "profiles/current");
    }

    #[test]
    fn rejects_bad_values() {
        let err = SyncConfig::from_lookup(lookup(&[("TANDEM_DEBOUNCE_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDebounce(_)));

        let err = SyncConfig::from_lookup(lookup(&[("TANDEM_WRITE_PAUSE_MS", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWritePause(_)));

        let err = SyncConfig::from_lookup(lookup(&[("TANDEM_CACHE_KEY", " ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCacheKey));
    }
}
