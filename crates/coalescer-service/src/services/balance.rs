use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::caching::{CacheAccess, CacheEntry, CacheValue, Origin};

/// The namespace user balances are cached under.
pub const BALANCE_NAMESPACE: &str = "user:balance";

/// A monetary amount, cached as a decimal string with two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Balance(pub f64);

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl CacheValue for Balance {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(raw: &str) -> Option<Self> {
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|amount| amount.is_finite())
            .map(Balance)
    }
}

/// Looks up user balances through the coalesced cache.
pub struct BalanceService<O> {
    access: CacheAccess<Balance>,
    origin: Arc<O>,
    base_ttl: Duration,
}

impl<O> Clone for BalanceService<O> {
    fn clone(&self) -> Self {
        Self {
            access: self.access.clone(),
            origin: Arc::clone(&self.origin),
            base_ttl: self.base_ttl,
        }
    }
}

impl<O> fmt::Debug for BalanceService<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceService")
            .field("access", &self.access)
            .field("base_ttl", &self.base_ttl)
            .finish_non_exhaustive()
    }
}

impl<O: Origin<Value = Balance>> BalanceService<O> {
    pub fn new(access: CacheAccess<Balance>, origin: O, base_ttl: Duration) -> Self {
        Self {
            access,
            origin: Arc::new(origin),
            base_ttl,
        }
    }

    /// The underlying cache access, mostly useful for introspection.
    pub fn access(&self) -> &CacheAccess<Balance> {
        &self.access
    }

    /// Returns the balance of `user_id`, loading it from the origin on a cache miss.
    pub async fn get_user_balance(&self, user_id: &str) -> CacheEntry<Balance> {
        let origin = Arc::clone(&self.origin);
        let id = user_id.to_owned();
        let load = move || async move { origin.load(&id).await };

        self.access
            .get_cached_or_load(user_id, BALANCE_NAMESPACE, load, self.base_ttl)
            .await
    }
}
