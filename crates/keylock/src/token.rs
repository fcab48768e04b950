//! Lock token generation
//!
//! Every acquisition is proven by an opaque token stored as the lock record's
//! value. Tokens are random bytes encoded as unpadded URL-safe base64.

use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use rand::RngCore;

/// Default number of random bytes per token
pub const DEFAULT_TOKEN_LEN: usize = 16;

/// Opaque ownership proof for one acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Source of random bytes for tokens
///
/// Production code uses [`OsTokenSource`]; tests may plug in a deterministic
/// source.
pub trait TokenSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// Cryptographically secure source backed by the OS-seeded thread RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn fill(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Produces a fresh [`Token`] per acquisition
#[derive(Clone)]
pub struct TokenGenerator {
    source: Arc<dyn TokenSource>,
    len: usize,
}

impl TokenGenerator {
    /// Create a generator drawing [`DEFAULT_TOKEN_LEN`] bytes from the OS source
    pub fn new() -> Self {
        Self {
            source: Arc::new(OsTokenSource),
            len: DEFAULT_TOKEN_LEN,
        }
    }

    /// Replace the randomness source
    pub fn with_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.source = source;
        self
    }

    /// Set the number of random bytes per token (at least 1)
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len.max(1);
        self
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }

    pub fn generate(&self) -> Token {
        let mut buf = vec![0u8; self.len];
        self.source.fill(&mut buf);
        Token(BASE64.encode(&buf))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
