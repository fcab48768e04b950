//! Retry strategies for lock acquisition
//!
//! A strategy maps the number of retries already performed to the wait before
//! the next attempt, or `None` to give up. Strategies hold no per-call state,
//! so one value can be shared by any number of concurrent `obtain` calls.

use std::time::Duration;

/// Backoff policy consulted after every failed acquisition attempt
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RetryStrategy {
    /// Attempt exactly once
    #[default]
    NoRetry,
    /// Wait a constant interval, forever
    Linear(Duration),
    /// Wait `base * 2^attempt` capped at `max`, forever
    Exponential {
        base: Duration,
        max: Duration,
        /// Random spread as a fraction of the computed delay (0.0 to 1.0)
        jitter: f64,
    },
    /// Stop after `max_retries` retries of the inner strategy
    Limited {
        inner: Box<RetryStrategy>,
        max_retries: u32,
    },
}

impl RetryStrategy {
    pub fn no_retry() -> Self {
        Self::NoRetry
    }

    pub fn linear(interval: Duration) -> Self {
        Self::Linear(interval)
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            max,
            jitter: 0.0,
        }
    }

    /// Add random jitter to an exponential strategy; other variants are unchanged
    /// except `Limited`, which forwards to its inner strategy.
    /// A non-finite factor disables jitter.
    pub fn with_jitter(self, factor: f64) -> Self {
        let factor = clamp_jitter(factor);
        match self {
            Self::Exponential { base, max, .. } => Self::Exponential {
                base,
                max,
                jitter: factor,
            },
            Self::Limited { inner, max_retries } => Self::Limited {
                inner: Box::new(inner.with_jitter(factor)),
                max_retries,
            },
            other => other,
        }
    }

    /// Wrap this strategy so that it gives up after `max_retries` retries
    pub fn limit(self, max_retries: u32) -> Self {
        Self::Limited {
            inner: Box::new(self),
            max_retries,
        }
    }

    /// Wait before the next attempt, given the number of retries already made.
    ///
    /// Returns `None` when acquisition should stop.
    pub fn next_backoff(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::NoRetry => None,
            Self::Linear(interval) => Some(*interval),
            Self::Exponential { base, max, jitter } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                let delay = base.saturating_mul(factor).min(*max);
                Some(apply_jitter(delay, *max, *jitter))
            }
            Self::Limited { inner, max_retries } => {
                if attempt >= *max_retries {
                    None
                } else {
                    inner.next_backoff(attempt)
                }
            }
        }
    }

    /// Whether this strategy can ever stop on its own
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::NoRetry | Self::Limited { .. })
    }
}

fn clamp_jitter(factor: f64) -> f64 {
    if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn apply_jitter(delay: Duration, max: Duration, jitter: f64) -> Duration {
    let jitter = clamp_jitter(jitter);
    if jitter == 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = delay.as_secs_f64() * jitter;
    let offset = (rand::random::<f64>() - 0.5) * 2.0 * spread;
    let jittered = (delay.as_secs_f64() + offset).clamp(0.0, max.as_secs_f64());
    // as_secs_f64 rounds, so a max near Duration::MAX may not convert back
    Duration::try_from_secs_f64(jittered).map_or(max, |d| d.min(max))
}
