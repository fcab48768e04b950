//! Cancellation and deadline signal for lock operations
//!
//! A [`Context`] bounds every suspension point of the lock protocol: store
//! round-trips and the wait between acquisition attempts.

use std::future::{Future, pending};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};

use crate::error::{LockError, Result};

/// Deadline and cancellation carried by a caller into lock operations
///
/// Cloning is cheap; clones observe the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Fires the cancellation signal of the [`Context`] it was created with
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that never ends
    pub fn background() -> Self {
        Self::default()
    }

    /// A context ending `timeout` from now
    ///
    /// A timeout too large for the clock to represent means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::background().deadline_at(deadline),
            None => Self::background(),
        }
    }

    /// A context ending at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::background().deadline_at(deadline)
    }

    /// Tighten the deadline; an earlier existing deadline is kept.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a cancellable context and the handle that cancels it
    ///
    /// A previously attached cancellation signal is replaced.
    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancel = Some(receiver);
        (self, CancelHandle { sender })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context has ended, or `None` while it is still active
    pub fn err(&self) -> Option<LockError> {
        if let Some(cancel) = &self.cancel
            && *cancel.borrow()
        {
            return Some(LockError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(LockError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context ends; pends forever for a background context.
    pub async fn done(&self) -> LockError {
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending().await,
            }
        };

        let cancelled = async {
            match &self.cancel {
                Some(cancel) => {
                    let mut cancel = cancel.clone();
                    let fired = cancel.wait_for(|cancelled| *cancelled).await.map(|_| ());
                    // A dropped handle can no longer cancel
                    if fired.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => LockError::Cancelled,
            _ = deadline => LockError::DeadlineExceeded,
        }
    }

    /// Run `fut` unless the context ends first
    ///
    /// An already ended context wins even if `fut` is immediately ready.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration` unless the context ends first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_background_never_ends() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
        assert!(ctx.sleep(Duration::from_secs(3600)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let start = Instant::now();

        let result = ctx.sleep(Duration::from_secs(10)).await;

        assert!(matches!(result, Err(LockError::DeadlineExceeded)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60));
        assert!(matches!(ctx.err(), Some(LockError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let (ctx, handle) = Context::background().with_cancel();

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.sleep(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert!(handle.is_cancelled());
        assert!(matches!(ctx.err(), Some(LockError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ended_context_wins_over_ready_future() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let result = ctx.run(async { 42 }).await;
        assert!(matches!(result, Err(LockError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_output() {
        let ctx = Context::with_timeout(Duration::from_secs(1));
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_timeout(Duration::from_millis(20)).with_cancel();
        drop(handle);

        let result = ctx.sleep(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LockError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_has_no_deadline() {
        let ctx = Context::with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(ctx.err().is_none());
        assert_eq!(ctx.run(async { 1 }).await.unwrap(), 1);
    }

    #[test]
    fn test_deadline_only_tightens() {
        let now = Instant::now();
        let ctx = Context::with_deadline(now + Duration::from_secs(1))
            .deadline_at(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));

        let ctx = ctx.deadline_at(now + Duration::from_millis(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_millis(10)));
    }
}
