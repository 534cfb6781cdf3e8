use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared, TryFutureExt};
use tokio::runtime::Handle;
use tracing::Instrument;

use super::{CacheEntry, CacheError, CacheKey};
use crate::utils::defer::defer;

type ComputationChannel<T> = Shared<oneshot::Receiver<CacheEntry<T>>>;
type ComputationMap<T> = Arc<Mutex<BTreeMap<CacheKey, ComputationChannel<T>>>>;

/// Deduplicates concurrent computations by their [`CacheKey`].
///
/// While a computation for a key is running, every further request for that key subscribes to
/// the running computation instead of starting a new one. The interval between starting a
/// computation and removing it from the registry is called an episode.
///
/// The registry never retains results: once an episode ends, its entry is gone and the next
/// request starts a fresh episode. Persisting values is the job of the cache store.
pub struct CoalescingRegistry<T> {
    /// Currently running computations.
    current_computations: ComputationMap<T>,
}

impl<T> std::fmt::Debug for CoalescingRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let in_flight = self
            .current_computations
            .try_lock()
            .map(|c| c.len())
            .unwrap_or_default();
        f.debug_struct("CoalescingRegistry")
            .field("in_flight", &in_flight)
            .finish()
    }
}

impl<T> Clone for CoalescingRegistry<T> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            current_computations: Arc::clone(&self.current_computations),
        }
    }
}

impl<T> Default for CoalescingRegistry<T> {
    fn default() -> Self {
        Self {
            current_computations: Default::default(),
        }
    }
}

impl<T> CoalescingRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of episodes currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.current_computations).len()
    }

    /// Whether an episode for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        lock(&self.current_computations).contains_key(key)
    }

    /// Creates a shareable channel that runs `computation` as a separate task.
    ///
    /// The entry for `key` is removed from the registry when the task finishes, and also when it
    /// panics or is aborted. In the latter cases the sender is dropped without a value, which all
    /// subscribers observe as a cancelled channel.
    fn create_channel<F>(
        &self,
        runtime: &Handle,
        key: CacheKey,
        computation: F,
    ) -> ComputationChannel<T>
    where
        F: Future<Output = CacheEntry<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let current_computations = Arc::clone(&self.current_computations);
        let remove_computation_token = defer(move || {
            let mut current_computations = lock(&current_computations);
            current_computations.remove(&key);
            metric!(gauge("caches.in_flight") = current_computations.len() as u64);
        });

        let channel = async move {
            let result = computation.await;
            // Drop the token first to evict from the map. This ensures that callers either
            // get a channel that will receive data, or they create a new channel.
            drop(remove_computation_token);
            sender.send(result).ok();
        }
        .in_current_span();

        runtime.spawn(channel);

        receiver.shared()
    }

    /// Joins the running episode for `key`, or starts a new one by invoking `compute`.
    ///
    /// `compute` is only called when no episode for `key` is in flight, and its future is the
    /// only computation running for this episode. Every caller that joins while it is running
    /// receives a clone of the very same result, errors included.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly spawn the computation
    /// on an executor, even if you don’t explicitly `await` its results. Dropping the returned
    /// future only unsubscribes this caller and never cancels the computation.
    ///
    /// # Errors
    ///
    /// Starting a new episode requires a tokio runtime. Outside of one, `compute` is not called
    /// and the returned future resolves to [`CacheError::Interrupted`]. Joining a running episode
    /// works from anywhere.
    pub fn join_or_start<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
    ) -> BoxFuture<'static, CacheEntry<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheEntry<T>> + Send + 'static,
    {
        // Must not be looked up under the lock. Failing to spawn drops the computation, whose
        // guard locks the map again.
        let runtime = Handle::try_current();

        let channel = {
            let mut current_computations = lock(&self.current_computations);
            if let Some(channel) = current_computations.get(&key) {
                // A concurrent lookup was deduplicated.
                metric!(counter("caches.channel.hit") += 1);
                tracing::trace!(%key, "joining in-flight computation");
                channel.clone()
            } else {
                let runtime = match runtime {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        tracing::error!(
                            error = &err as &dyn std::error::Error,
                            %key,
                            "Cannot start computation outside of a runtime"
                        );
                        let error = CacheError::Interrupted(format!(
                            "computation for `{key}` needs a tokio runtime"
                        ));
                        return Box::pin(future::ready(Err(error)));
                    }
                };

                metric!(counter("caches.channel.miss") += 1);
                tracing::trace!(%key, "starting computation");

                let channel = self.create_channel(&runtime, key.clone(), compute());
                let evicted = current_computations.insert(key.clone(), channel.clone());
                debug_assert!(evicted.is_none());
                metric!(gauge("caches.in_flight") = current_computations.len() as u64);
                channel
            }
        };

        let future = channel.unwrap_or_else(move |_cancelled_error| {
            tracing::error!(%key, "computation channel dropped");
            Err(CacheError::Interrupted(format!(
                "computation for `{key}` ended without a result"
            )))
        });

        Box::pin(future)
    }
}

/// Locks the computation map.
///
/// The map is only mutated by `insert` and `remove`, neither of which can leave it in an
/// inconsistent state, so a poisoned lock is safe to recover.
fn lock<T>(map: &Mutex<T>) -> MutexGuard<'_, T> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
