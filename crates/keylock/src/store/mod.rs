//! Store adapter contract
//!
//! The lock protocol needs exactly four operations from the backing store.
//! Each one must be evaluated by the store as a single indivisible step; a
//! client-side read-then-write would reopen the race between two holders.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryLockStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisLockStore;

/// Atomic key-value operations backing the lock protocol
///
/// Errors are transport or protocol faults only. Contention and ownership
/// mismatches are reported through the boolean results.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create the record only if no live record exists for `key`.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Delete the record only if its value equals `value`.
    async fn compare_and_delete(&self, key: &str, value: &str) -> anyhow::Result<bool>;

    /// Reset the record's expiry to `ttl` only if its value equals `value`.
    async fn compare_and_expire(&self, key: &str, value: &str, ttl: Duration)
    -> anyhow::Result<bool>;

    /// Remaining time-to-live; missing or expired records report zero.
    async fn pttl(&self, key: &str) -> anyhow::Result<Duration>;
}

#[async_trait]
impl<T: LockStore + ?Sized> LockStore for Arc<T> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        (**self).compare_and_delete(key, value).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        (**self).compare_and_expire(key, value, ttl).await
    }

    async fn pttl(&self, key: &str) -> anyhow::Result<Duration> {
        (**self).pttl(key).await
    }
}
