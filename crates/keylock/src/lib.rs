//! Keylock - mutual-exclusion locks coordinated through a shared key-value store
//!
//! This crate provides:
//! - Lock acquisition with pluggable retry strategies and cancellation
//! - Lock handles with safe release, refresh and TTL queries
//! - The atomic store adapter contract, with in-memory and Redis stores
//! - Configuration loading and metrics
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use keylock::{Context, LockClient, LockOptions, MemoryLockStore, RetryStrategy};
//!
//! # async fn run() -> keylock::Result<()> {
//! let client = LockClient::new(Arc::new(MemoryLockStore::new()));
//! let ctx = Context::with_timeout(Duration::from_secs(5));
//! let opts = LockOptions::new()
//!     .with_retry_strategy(RetryStrategy::linear(Duration::from_millis(100)).limit(3));
//!
//! let lock = client.obtain(&ctx, "my-key", Duration::from_secs(1), &opts).await?;
//! lock.refresh(&ctx, Duration::from_secs(1)).await?;
//! lock.release(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token;

pub use client::{LockClient, LockOptions, obtain};
pub use self::config::{KeylockConfig, RetryConfig, RetryKind};
pub use context::{CancelHandle, Context};
pub use error::{LockError, Result};
pub use lock::{Lock, LockStatus};
pub use retry::RetryStrategy;
#[cfg(feature = "redis")]
pub use store::RedisLockStore;
pub use store::{LockStore, MemoryLockStore};
pub use token::{OsTokenSource, Token, TokenGenerator, TokenSource};
