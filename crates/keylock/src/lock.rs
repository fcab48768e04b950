//! Lock handle returned by a successful acquisition

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{LockError, Result};
use crate::metrics;
use crate::store::LockStore;
use crate::token::Token;

/// Ownership state tracked by a [`Lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The handle believes it owns the record
    Live,
    /// Released by this handle
    Released,
    /// Expired or taken over; the handle owns nothing
    Lost,
}

/// One successful acquisition of a lock key
///
/// Locks are never renewed or released in the background. Callers must
/// [`refresh`](Lock::refresh) before the TTL elapses and should
/// [`release`](Lock::release) when done.
pub struct Lock {
    store: Arc<dyn LockStore>,
    key: String,
    token: Token,
    metadata: String,
    value: String,
    status: Mutex<LockStatus>,
}

impl Lock {
    pub(crate) fn new(
        store: Arc<dyn LockStore>,
        key: String,
        token: Token,
        metadata: String,
    ) -> Self {
        let value = record_value(&token, &metadata);
        Self {
            store,
            key,
            token,
            metadata,
            value,
            status: Mutex::new(LockStatus::Live),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Metadata supplied at acquisition, empty if none
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn status(&self) -> LockStatus {
        *self.status.lock()
    }

    pub fn is_live(&self) -> bool {
        self.status() == LockStatus::Live
    }

    fn set_status(&self, status: LockStatus) {
        *self.status.lock() = status;
    }

    /// Release the lock
    ///
    /// Succeeds when the record is already gone; the handle is then marked
    /// lost. Releasing a handle that is no longer live is a no-op.
    pub async fn release(&self, ctx: &Context) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }

        let deleted = match ctx
            .run(self.store.compare_and_delete(&self.key, &self.value))
            .await
        {
            Ok(Ok(deleted)) => deleted,
            Ok(Err(e)) => {
                metrics::record_release("error");
                return Err(LockError::Store(e));
            }
            Err(e) => {
                metrics::record_release("error");
                return Err(e);
            }
        };

        if deleted {
            self.set_status(LockStatus::Released);
            metrics::record_release("released");
            debug!(key = %self.key, "Released lock");
        } else {
            self.set_status(LockStatus::Lost);
            metrics::record_release("already_gone");
            warn!(key = %self.key, "Lock was already gone on release");
        }
        Ok(())
    }

    /// Reset the lock's expiry to `ttl` from now
    ///
    /// Fails with [`LockError::NotHeld`] once the handle no longer owns the
    /// record; the caller must stop assuming exclusive access.
    pub async fn refresh(&self, ctx: &Context, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl(ttl));
        }
        if !self.is_live() {
            metrics::record_refresh("not_held");
            return Err(LockError::NotHeld);
        }

        let refreshed = match ctx
            .run(self.store.compare_and_expire(&self.key, &self.value, ttl))
            .await
        {
            Ok(Ok(refreshed)) => refreshed,
            Ok(Err(e)) => {
                metrics::record_refresh("error");
                return Err(LockError::Store(e));
            }
            Err(e) => {
                metrics::record_refresh("error");
                return Err(e);
            }
        };

        if refreshed {
            metrics::record_refresh("refreshed");
            debug!(key = %self.key, ttl_ms = ttl.as_millis() as u64, "Refreshed lock");
            Ok(())
        } else {
            self.set_status(LockStatus::Lost);
            metrics::record_refresh("not_held");
            warn!(key = %self.key, "Lock lost before refresh");
            Err(LockError::NotHeld)
        }
    }

    /// Remaining time-to-live of the lock record
    ///
    /// Zero means the lock expired or is gone. The value is advisory: time keeps
    /// passing between this call and any later refresh or release.
    pub async fn ttl(&self, ctx: &Context) -> Result<Duration> {
        if !self.is_live() {
            return Ok(Duration::ZERO);
        }

        let remaining = ctx.run(self.store.pttl(&self.key)).await??;
        if remaining.is_zero() {
            self.set_status(LockStatus::Lost);
            debug!(key = %self.key, "Lock expired");
        }
        Ok(remaining)
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("metadata", &self.metadata)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Value stored in the lock record: the token followed by the metadata
pub(crate) fn record_value(token: &Token, metadata: &str) -> String {
    let mut value = String::with_capacity(token.as_str().len() + metadata.len());
    value.push_str(token.as_str());
    value.push_str(metadata);
    value
}
