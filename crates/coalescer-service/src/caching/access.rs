use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheEntry, CacheKey, CacheStore, CacheValue, CoalescingRegistry, TtlJitter};

/// The read path in front of a [`CacheStore`].
///
/// Reads are served from the store when possible. On a miss, concurrent requests for the same key
/// are coalesced into a single origin load, whose result is written through to the store with a
/// jittered TTL and handed to every waiting caller.
pub struct CacheAccess<T> {
    store: Arc<dyn CacheStore>,
    registry: CoalescingRegistry<T>,
    jitter: TtlJitter,
}

impl<T> std::fmt::Debug for CacheAccess<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAccess")
            .field("registry", &self.registry)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for CacheAccess<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            jitter: self.jitter,
        }
    }
}

impl<T: CacheValue> CacheAccess<T> {
    pub fn new(store: Arc<dyn CacheStore>, jitter: TtlJitter) -> Self {
        Self {
            store,
            registry: CoalescingRegistry::new(),
            jitter,
        }
    }

    /// The registry coalescing this instance's origin loads.
    pub fn registry(&self) -> &CoalescingRegistry<T> {
        &self.registry
    }

    /// Returns the cached value for `logical_id` in `namespace`, loading it on a miss.
    ///
    /// This tries the following things in order:
    /// 1. Reads the value from the cache store. A well-formed hit is returned right away.
    /// 2. Joins the in-flight load for the key, or starts one which:
    ///    - re-checks the cache store, as a concurrent episode may have filled it meanwhile,
    ///    - calls `load_fn`,
    ///    - writes a loaded value to the store with a TTL jittered around `base_ttl`.
    ///
    /// # Errors
    ///
    /// Only origin failures are returned, and every caller of the failed episode receives the
    /// same error. Errors are never written to the cache store. Failing store reads and
    /// malformed payloads are handled like a miss, failing writes are logged.
    #[tracing::instrument(skip_all, fields(namespace = %namespace, logical_id = %logical_id))]
    pub async fn get_cached_or_load<F, Fut>(
        &self,
        logical_id: &str,
        namespace: &str,
        load_fn: F,
        base_ttl: Duration,
    ) -> CacheEntry<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheEntry<T>> + Send + 'static,
    {
        let key = CacheKey::new(logical_id, namespace);
        metric!(counter("caches.access") += 1);

        if let Some(value) = lookup::<T>(&*self.store, &key).await {
            metric!(counter("caches.store.hit") += 1);
            return Ok(value);
        }

        let store = Arc::clone(&self.store);
        let jitter = self.jitter;
        let episode_key = key.clone();
        let load = move || async move {
            // Another episode may have written the value between our read and now.
            if let Some(value) = lookup::<T>(&*store, &episode_key).await {
                metric!(counter("caches.store.late_hit") += 1);
                return Ok(value);
            }

            metric!(counter("caches.computation") += 1);
            let load_start = Instant::now();
            let result = load_fn().await;
            metric!(timer("caches.origin.duration") = load_start.elapsed());

            let value = match result {
                Ok(value) => value,
                Err(err) => {
                    metric!(counter("caches.origin.error") += 1);
                    tracing::debug!(
                        error = &err as &dyn std::error::Error,
                        key = %episode_key,
                        "Origin load failed"
                    );
                    return Err(err);
                }
            };

            write_through(&*store, &episode_key, &value, jitter.jitter(base_ttl)).await;
            Ok(value)
        };

        self.registry.join_or_start(key, load).await
    }
}

/// Reads and decodes the value under `key`, treating every failure as a miss.
async fn lookup<T: CacheValue>(store: &dyn CacheStore, key: &CacheKey) -> Option<T> {
    match store.get(key.as_str()).await {
        Ok(Some(raw)) => {
            let value = T::decode(&raw);
            if value.is_none() {
                metric!(counter("caches.store.malformed") += 1);
                tracing::warn!(%key, payload = %raw, "Ignoring malformed cache entry");
            }
            value
        }
        Ok(None) => None,
        Err(err) => {
            metric!(counter("caches.store.read_error") += 1);
            tracing::warn!(
                error = &err as &dyn std::error::Error,
                %key,
                "Failed to read from cache store"
            );
            None
        }
    }
}

/// Stores a freshly loaded value. Failures are logged, the value stays usable for the caller.
async fn write_through<T: CacheValue>(
    store: &dyn CacheStore,
    key: &CacheKey,
    value: &T,
    ttl: Duration,
) {
    tracing::debug!(%key, ?ttl, "Writing loaded value to cache store");

    if let Err(err) = store.set(key.as_str(), value.encode(), ttl).await {
        metric!(counter("caches.store.write_error") += 1);
        tracing::error!(
            error = &err as &dyn std::error::Error,
            %key,
            "Failed to write value to cache store"
        );
    }
}
