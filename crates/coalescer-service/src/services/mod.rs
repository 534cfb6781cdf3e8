//! Services built on top of the coalesced cache.

use std::sync::Arc;

use crate::caching::{CacheAccess, CacheStore, InMemoryStore, Origin, TtlJitter};
use crate::config::Config;

mod balance;

pub use balance::{BALANCE_NAMESPACE, Balance, BalanceService};

/// Creates a [`BalanceService`] backed by `store`, using the TTL settings from `config`.
pub fn create_balance_service<O>(
    config: &Config,
    store: Arc<dyn CacheStore>,
    origin: O,
) -> BalanceService<O>
where
    O: Origin<Value = Balance>,
{
    let jitter = TtlJitter::new(config.caching.jitter_spread);
    let access = CacheAccess::new(store, jitter);
    BalanceService::new(access, origin, config.caching.base_ttl)
}

/// Creates a process-local [`InMemoryStore`] sized by `config`.
pub fn create_in_memory_store(config: &Config) -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(config.caching.in_memory_capacity))
}
