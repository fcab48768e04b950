//! Command line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use keylock::{Context, KeylockConfig, LockOptions, RetryStrategy};

/// Acquire, inspect and release store-coordinated locks
#[derive(Debug, Parser)]
#[command(name = "keylockctl", version, about)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(short, long, env = "KEYLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Redis server URL, overriding the config file
    #[arg(long, env = "KEYLOCK_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Obtain a lock and print its token
    Obtain {
        #[arg(short, long)]
        key: String,
        /// Lock TTL in milliseconds (default from config)
        #[arg(long)]
        ttl_ms: Option<u64>,
        /// Use this token instead of a random one
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        metadata: Option<String>,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Release a lock obtained earlier
    Release {
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Extend a lock obtained earlier
    Refresh {
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        metadata: Option<String>,
        #[arg(long)]
        ttl_ms: Option<u64>,
    },
    /// Print the remaining TTL of a key in milliseconds
    Ttl {
        #[arg(short, long)]
        key: String,
    },
    /// Run a command while holding a lock
    Run {
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        ttl_ms: Option<u64>,
        #[command(flatten)]
        retry: RetryArgs,
        /// Command and arguments to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

/// Retry flags shared by `obtain` and `run`
#[derive(Debug, Clone, Default, Args)]
pub struct RetryArgs {
    /// Retry every N milliseconds while the lock is held elsewhere
    #[arg(long)]
    pub retry_ms: Option<u64>,
    /// Give up after this many retries
    #[arg(long)]
    pub retries: Option<u32>,
    /// Give up waiting after N milliseconds
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

impl RetryArgs {
    /// Options from the flags, falling back to the configured retry strategy
    pub fn lock_options(&self, config: &KeylockConfig) -> LockOptions {
        let mut opts = config.lock_options();
        if let Some(retry_ms) = self.retry_ms {
            opts.retry_strategy = RetryStrategy::linear(Duration::from_millis(retry_ms));
        }
        if let Some(retries) = self.retries {
            opts.retry_strategy = opts.retry_strategy.limit(retries);
        }
        opts
    }

    pub fn context(&self) -> Context {
        match self.wait_ms {
            Some(wait_ms) => Context::with_timeout(Duration::from_millis(wait_ms)),
            None => Context::background(),
        }
    }
}

/// TTL flag in milliseconds, or the configured default
pub fn ttl_or_default(ttl_ms: Option<u64>, config: &KeylockConfig) -> Duration {
    ttl_ms.map(Duration::from_millis).unwrap_or_else(|| config.ttl())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_obtain() {
        let cli = Cli::try_parse_from([
            "keylockctl",
            "--redis-url",
            "redis://cache:6379",
            "obtain",
            "--key",
            "jobs",
            "--ttl-ms",
            "500",
            "--retry-ms",
            "100",
            "--retries",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.redis_url.as_deref(), Some("redis://cache:6379"));
        match cli.command {
            Command::Obtain {
                key, ttl_ms, retry, ..
            } => {
                assert_eq!(key, "jobs");
                assert_eq!(ttl_ms, Some(500));
                let opts = retry.lock_options(&KeylockConfig::default());
                assert_eq!(
                    opts.retry_strategy,
                    RetryStrategy::linear(Duration::from_millis(100)).limit(3)
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_collects_trailing_command() {
        let cli = Cli::try_parse_from([
            "keylockctl", "run", "-k", "deploy", "--", "make", "-j", "4",
        ])
        .unwrap();

        match cli.command {
            Command::Run { key, command, .. } => {
                assert_eq!(key, "deploy");
                assert_eq!(command, vec!["make", "-j", "4"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["keylockctl", "run", "-k", "deploy"]).is_err());
    }

    #[test]
    fn test_defaults_come_from_config() {
        let config = KeylockConfig::default();
        assert_eq!(ttl_or_default(None, &config), Duration::from_secs(30));
        assert_eq!(ttl_or_default(Some(20), &config), Duration::from_millis(20));

        let retry = RetryArgs::default();
        assert_eq!(retry.lock_options(&config).retry_strategy, RetryStrategy::NoRetry);
        assert!(retry.context().deadline().is_none());
    }
}
