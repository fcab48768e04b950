//! Redis-backed lock store
//!
//! Acquisition is a single `SET NX PX`. The compare-based operations run as
//! Lua scripts, which Redis evaluates without interleaving other commands.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::debug;

use super::LockStore;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

const REFRESH_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Lock store talking to a single Redis server
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    release: Script,
    refresh: Script,
}

impl RedisLockStore {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!("Connected lock store to {}", url);
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection manager
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
            refresh: Script::new(REFRESH_SCRIPT),
        }
    }
}

/// Redis expiry resolution is one millisecond; round anything smaller up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .refresh
            .key(key)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn pttl(&self, key: &str) -> anyhow::Result<Duration> {
        let mut conn = self.conn.clone();
        // -2 for a missing key, -1 for a key without expiry
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(u64::try_from(millis)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[test]
    fn test_ttl_millis_rounds_up() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(150)), 150);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_store_roundtrip() -> anyhow::Result<()> {
        let store = RedisLockStore::connect(TEST_REDIS_URL).await?;
        let key = "keylock:test:store";
        let ttl = Duration::from_secs(5);

        store.compare_and_delete(key, "a").await?;
        assert!(store.set_if_absent(key, "a", ttl).await?);
        assert!(!store.set_if_absent(key, "b", ttl).await?);

        assert!(!store.compare_and_expire(key, "b", ttl).await?);
        assert!(store.compare_and_expire(key, "a", ttl * 2).await?);
        assert!(store.pttl(key).await? > ttl);

        assert!(!store.compare_and_delete(key, "b").await?);
        assert!(store.compare_and_delete(key, "a").await?);
        assert_eq!(store.pttl(key).await?, Duration::ZERO);
        Ok(())
    }
}
