//! Error types for lock operations

use std::time::Duration;

/// Error type for lock acquisition and lock handle operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder owns the key and the retry strategy gave up.
    #[error("lock not obtained")]
    NotObtained,

    /// The handle no longer owns the lock record.
    #[error("lock not held")]
    NotHeld,

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid ttl: {0:?}")]
    InvalidTtl(Duration),

    #[error("invalid lock key: {0:?}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl LockError {
    /// Returns true for the expected "someone else holds it" outcome.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::NotObtained)
    }

    /// Returns true when the caller's context ended.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    pub fn is_lock_lost(&self) -> bool {
        matches!(self, Self::NotHeld)
    }
}

impl From<config::ConfigError> for LockError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
