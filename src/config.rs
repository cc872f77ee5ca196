use std::path::PathBuf;
use std::time::Duration;

use crate::limits::DEFAULT_MAX_PARTY_SIZE;
use crate::retry::RetryPolicy;

/// Host-level settings, read from `TABLEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// JSON slot catalog. Required by [`crate::open`].
    pub catalog_path: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    /// WAL appends between background compactions.
    pub compact_threshold: u64,
    /// How long an admission waits for its slot's lock before giving up.
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_party_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            catalog_path: None,
            metrics_port: None,
            compact_threshold: 1000,
            lock_timeout: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
            max_party_size: DEFAULT_MAX_PARTY_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let retry = RetryPolicy {
            max_retries: parsed("TABLEBOOK_BOOK_RETRIES")
                .map_or(defaults.retry.max_retries, |n| n as usize),
            ..defaults.retry.clone()
        };

        Self {
            data_dir: lookup("TABLEBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            catalog_path: lookup("TABLEBOOK_CATALOG").map(PathBuf::from),
            metrics_port: lookup("TABLEBOOK_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            compact_threshold: parsed("TABLEBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            lock_timeout: parsed("TABLEBOOK_LOCK_TIMEOUT_MS")
                .map_or(defaults.lock_timeout, Duration::from_millis),
            retry,
            max_party_size: parsed("TABLEBOOK_MAX_PARTY_SIZE")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_party_size),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
    Missing(&'static str),
    Metrics(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(e) => write!(f, "invalid config: {e}"),
            ConfigError::Missing(key) => write!(f, "missing config: {key}"),
            ConfigError::Metrics(e) => write!(f, "metrics exporter: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
