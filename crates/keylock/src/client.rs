//! Lock client: acquisition with retries
//!
//! Acquisition runs `ATTEMPTING -> OBTAINED | NOT_OBTAINED | CANCELLED`.
//! Only contention is retried; store faults are returned to the caller as-is.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{LockError, Result};
use crate::lock::{Lock, record_value};
use crate::metrics;
use crate::retry::RetryStrategy;
use crate::store::LockStore;
use crate::token::{Token, TokenGenerator};

/// Per-call acquisition options
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    /// Backoff between attempts (default: no retry)
    pub retry_strategy: RetryStrategy,
    /// Explicit token, used verbatim instead of a generated one
    ///
    /// A token does not bypass exclusion: a second `obtain` with the same
    /// token fails with [`LockError::NotObtained`] while the record is live.
    /// Processes sharing a token share one lock identity instead: any of them
    /// can [`adopt`](LockClient::adopt) the record and release or refresh it.
    pub token: Option<String>,
    /// Opaque data stored after the token in the lock record
    pub metadata: Option<String>,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Obtains locks against a shared store
///
/// The client holds no lock state of its own; clones share the store and the
/// token generator and may be used concurrently.
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
    tokens: TokenGenerator,
}

impl LockClient {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            tokens: TokenGenerator::new(),
        }
    }

    /// Replace the token generator
    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Try to obtain the lock for `key`, held for `ttl` once acquired.
    ///
    /// Retries follow `opts.retry_strategy` until it gives up
    /// ([`LockError::NotObtained`]) or `ctx` ends ([`LockError::Cancelled`] or
    /// [`LockError::DeadlineExceeded`]). With an unbounded strategy and a
    /// background context this waits for as long as the key stays held.
    pub async fn obtain(
        &self,
        ctx: &Context,
        key: &str,
        ttl: Duration,
        opts: &LockOptions,
    ) -> Result<Lock> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl(ttl));
        }
        if key.is_empty() {
            return Err(LockError::InvalidKey(key.to_string()));
        }

        let token = match &opts.token {
            Some(token) => Token::from(token.as_str()),
            None => self.tokens.generate(),
        };
        let metadata = opts.metadata.clone().unwrap_or_default();
        let value = record_value(&token, &metadata);

        let result = self
            .acquire(ctx, key, &value, ttl, &opts.retry_strategy)
            .await;
        match result {
            Ok(attempts) => {
                metrics::record_obtain("obtained");
                debug!(key, attempts, ttl_ms = ttl.as_millis() as u64, "Obtained lock");
                Ok(Lock::new(
                    self.store.clone(),
                    key.to_string(),
                    token,
                    metadata,
                ))
            }
            Err(e) => {
                let outcome = match &e {
                    LockError::NotObtained => "not_obtained",
                    e if e.is_cancellation() => "cancelled",
                    _ => "error",
                };
                metrics::record_obtain(outcome);
                debug!(key, error = %e, "Failed to obtain lock");
                Err(e)
            }
        }
    }

    /// Attempt loop; returns the number of attempts on success.
    async fn acquire(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
        strategy: &RetryStrategy,
    ) -> Result<u32> {
        let mut attempt: u32 = 0;
        loop {
            metrics::record_attempt();
            if ctx.run(self.store.set_if_absent(key, value, ttl)).await?? {
                return Ok(attempt + 1);
            }

            let Some(wait) = strategy.next_backoff(attempt) else {
                return Err(LockError::NotObtained);
            };
            trace!(key, attempt, wait_ms = wait.as_millis() as u64, "Lock held, retrying");
            ctx.sleep(wait).await?;
            attempt = attempt.saturating_add(1);
        }
    }

    /// Build a live handle for a record written under a shared token
    ///
    /// No store call is made; a later release or refresh reveals whether the
    /// record still carries `token` and `metadata`.
    pub fn adopt(
        &self,
        key: impl Into<String>,
        token: impl Into<String>,
        metadata: Option<String>,
    ) -> Lock {
        Lock::new(
            self.store.clone(),
            key.into(),
            Token::from(token.into()),
            metadata.unwrap_or_default(),
        )
    }
}

/// Obtain a lock with a one-off client over `store`
pub async fn obtain(
    store: Arc<dyn LockStore>,
    ctx: &Context,
    key: &str,
    ttl: Duration,
    opts: &LockOptions,
) -> Result<Lock> {
    LockClient::new(store).obtain(ctx, key, ttl, opts).await
}
