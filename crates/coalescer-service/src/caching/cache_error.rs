use std::time::Duration;

use thiserror::Error;

/// An error that is returned to callers of the coalesced read path.
///
/// One error value is fanned out to every caller that joined the same episode, which is why this
/// type is [`Clone`] and carries its details as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The origin loader failed to produce a value.
    ///
    /// The attached string contains the origin's error message.
    #[error("origin failed: {0}")]
    Origin(String),
    /// The computation ended without producing a result, for example because it panicked or
    /// its task was aborted.
    #[error("computation interrupted: {0}")]
    Interrupted(String),
}

impl CacheError {
    /// Wraps any error coming out of an origin loader.
    pub fn origin<E: std::fmt::Display>(err: E) -> Self {
        Self::Origin(err.to_string())
    }
}

/// An error raised by a [`CacheStore`](super::CacheStore).
///
/// These never reach callers of the read path: read failures are handled as a miss, and write
/// failures are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    /// The store did not answer in time.
    #[error("cache store timed out after {0:?}")]
    Timeout(Duration),
    /// Any other failure reported by the store.
    #[error("cache store error: {0}")]
    Other(String),
}

/// The result of a coalesced computation, shared between all of its subscribers.
pub type CacheEntry<T> = Result<T, CacheError>;
