//! In-process lock store
//!
//! Records live in a sharded [`DashMap`]. Every operation runs while holding
//! the shard lock for its key, which makes each call atomic with respect to
//! every other caller sharing the store. Expiry is measured on the tokio clock,
//! so paused-time tests advance it deterministically.
//!
//! Expired records are evicted lazily when their key is reused, and in bulk
//! every [`PURGE_INTERVAL`] acquisitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::trace;

use super::LockStore;

/// Number of `set_if_absent` calls between bulk evictions of expired records
pub const PURGE_INTERVAL: u64 = 1024;

/// Stand-in for expiries beyond what the clock can represent (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Instant at which a record written at `now` with `ttl` expires
///
/// Saturates instead of overflowing, so arbitrarily long TTLs are accepted.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct Record {
    value: String,
    expires_at: Instant,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Lock store kept in process memory
///
/// Cloning shares the underlying map, so clones act as separate clients of
/// one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<DashMap<String, Record>>,
    writes: Arc<AtomicU64>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current value for `key`, if a live record exists
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value.clone())
    }

    /// Evict expired records; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            trace!(removed, "Purged expired lock records");
        }
        removed
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        let now = Instant::now();
        let record = Record {
            value: value.to_string(),
            expires_at: expiry(now, ttl),
        };

        let inserted = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(record);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        };

        // Shard locks are released above; retain locks every shard in turn
        if self.writes.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % PURGE_INTERVAL == 0 {
            self.purge_expired();
        }
        Ok(inserted)
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        let now = Instant::now();
        let removed = self
            .records
            .remove_if(key, |_, record| {
                !record.is_expired(now) && record.value == value
            })
            .is_some();
        Ok(removed)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let now = Instant::now();
        match self.records.get_mut(key) {
            Some(mut record) if !record.is_expired(now) && record.value == value => {
                record.expires_at = expiry(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pttl(&self, key: &str) -> anyhow::Result<Duration> {
        let now = Instant::now();
        Ok(self
            .records
            .get(key)
            .map(|record| record.expires_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO))
    }
}
