//! Configuration loading
//!
//! Settings come from an optional config file (TOML, YAML or JSON, chosen by
//! extension) overlaid with `KEYLOCK_*` environment variables. Nested keys
//! use `__`, e.g. `KEYLOCK_RETRY__BASE_MS=200`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::client::LockOptions;
use crate::error::{LockError, Result};
use crate::retry::RetryStrategy;
use crate::token::{DEFAULT_TOKEN_LEN, TokenGenerator};

pub const ENV_PREFIX: &str = "KEYLOCK";

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_ttl_ms() -> u64 {
    30000 // 30 seconds
}

fn default_token_len() -> usize {
    DEFAULT_TOKEN_LEN
}

fn default_base_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    5000
}

/// Backoff family selected in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    #[default]
    None,
    Linear,
    Exponential,
}

/// Retry settings, mapped onto a [`RetryStrategy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub kind: RetryKind,
    /// Linear interval, or the first exponential delay
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Cap for exponential delays
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    /// Jitter factor for exponential delays (0.0 to 1.0)
    #[serde(default)]
    pub jitter: f64,
    /// Stop after this many retries (unset = until the context ends)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kind: RetryKind::None,
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            jitter: 0.0,
            max_retries: None,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind != RetryKind::None && self.base_ms == 0 {
            return Err(LockError::Config("retry.base_ms must be positive".to_string()));
        }
        if self.kind == RetryKind::Exponential && self.max_ms < self.base_ms {
            return Err(LockError::Config(format!(
                "retry.max_ms ({}) must not be below retry.base_ms ({})",
                self.max_ms, self.base_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(LockError::Config(format!(
                "retry.jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    pub fn to_strategy(&self) -> RetryStrategy {
        let base = Duration::from_millis(self.base_ms);
        let strategy = match self.kind {
            RetryKind::None => return RetryStrategy::NoRetry,
            RetryKind::Linear => RetryStrategy::linear(base),
            RetryKind::Exponential => {
                RetryStrategy::exponential(base, Duration::from_millis(self.max_ms))
                    .with_jitter(self.jitter)
            }
        };
        match self.max_retries {
            Some(max_retries) => strategy.limit(max_retries),
            None => strategy,
        }
    }
}

/// Top-level keylock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeylockConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Default lock TTL in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Random bytes per generated token
    #[serde(default = "default_token_len")]
    pub token_len: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for KeylockConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            ttl_ms: default_ttl_ms(),
            token_len: default_token_len(),
            retry: RetryConfig::default(),
        }
    }
}

impl KeylockConfig {
    /// Load from `path` (if given and present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_ms == 0 {
            return Err(LockError::Config("ttl_ms must be positive".to_string()));
        }
        if self.token_len == 0 {
            return Err(LockError::Config("token_len must be positive".to_string()));
        }
        self.retry.validate()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn token_generator(&self) -> TokenGenerator {
        TokenGenerator::new().with_len(self.token_len)
    }

    /// Acquisition options carrying the configured retry strategy
    pub fn lock_options(&self) -> LockOptions {
        LockOptions::new().with_retry_strategy(self.retry.to_strategy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = KeylockConfig::default();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.ttl(), Duration::from_secs(30));
        assert_eq!(config.token_len, 16);
        assert_eq!(config.retry.to_strategy(), RetryStrategy::NoRetry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
redis_url = "redis://cache:6380"
ttl_ms = 1500
token_len = 24

[retry]
kind = "linear"
base_ms = 100
max_retries = 3
"#,
        );

        let config = KeylockConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.redis_url, "redis://cache:6380");
        assert_eq!(config.ttl(), Duration::from_millis(1500));
        assert_eq!(config.token_generator().byte_len(), 24);
        assert_eq!(
            config.lock_options().retry_strategy,
            RetryStrategy::linear(Duration::from_millis(100)).limit(3)
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            KeylockConfig::load(Some(Path::new("/nonexistent/keylock.toml"))).unwrap();
        assert_eq!(config.ttl_ms, 30000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config("ttl_ms = 0\n");
        let err = KeylockConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));

        let retry = RetryConfig {
            kind: RetryKind::Exponential,
            base_ms: 500,
            max_ms: 100,
            ..Default::default()
        };
        assert!(retry.validate().is_err());

        let retry = RetryConfig {
            jitter: 1.5,
            ..Default::default()
        };
        assert!(retry.validate().is_err());
    }

    #[test]
    fn test_exponential_strategy() {
        let retry = RetryConfig {
            kind: RetryKind::Exponential,
            base_ms: 10,
            max_ms: 80,
            jitter: 0.0,
            max_retries: None,
        };
        assert_eq!(
            retry.to_strategy(),
            RetryStrategy::exponential(Duration::from_millis(10), Duration::from_millis(80))
        );
    }
}
