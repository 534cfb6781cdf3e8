use futures::future::BoxFuture;

use super::{CacheEntry, CacheValue};

/// The source of truth that values are loaded from on a cache miss.
///
/// Loads may be slow and may fail. The coalescer never retries a failed load by itself.
pub trait Origin: Send + Sync + 'static {
    /// The type of value this origin produces.
    type Value: CacheValue;

    /// Loads the current value for `logical_id`.
    ///
    /// Failures should be reported as [`CacheError::Origin`](super::CacheError::Origin).
    fn load<'a>(&'a self, logical_id: &'a str) -> BoxFuture<'a, CacheEntry<Self::Value>>;
}
