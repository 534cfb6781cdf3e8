use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use super::StoreError;

/// An external key-value store that the coalescer reads from and writes through to.
///
/// The store owns expiry and eviction of its entries. Implementations must be safe to call
/// concurrently.
pub trait CacheStore: Send + Sync + 'static {
    /// Looks up the raw payload stored under `key`.
    ///
    /// Returns `Ok(None)` if there is no entry or it has expired.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    /// Stores `value` under `key`, expiring it after `ttl`.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct StoredItem {
    /// The raw payload.
    value: String,
    /// The TTL the item was written with.
    ttl: Duration,
}

/// A struct implementing [`moka::Expiry`] that expires each item after the TTL it was stored with.
struct StoreExpiration;

impl moka::Expiry<String, StoredItem> for StoreExpiration {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredItem,
        _current_time: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredItem,
        _current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// A process-local [`CacheStore`] backed by a bounded moka cache.
///
/// Every entry expires after the TTL it was written with. Once the capacity is reached, moka
/// evicts entries by its own admission policy.
#[derive(Clone)]
pub struct InMemoryStore {
    cache: moka::future::Cache<String, StoredItem>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new(capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("coalescer.in_memory_store")
            .expire_after(StoreExpiration)
            .build();
        Self { cache }
    }

    /// Returns the TTL the live entry under `key` was written with.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.cache.get(key).await.map(|item| item.ttl)
    }
}

impl CacheStore for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move { Ok(self.cache.get(key).await.map(|item| item.value)) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.cache
                .insert(key.to_owned(), StoredItem { value, ttl })
                .await;
            Ok(())
        })
    }
}
