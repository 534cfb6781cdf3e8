//! # Coalesced cache access
//!
//! The coalescer sits between many concurrent readers and a slow origin. It guarantees that at
//! most one origin load per key is in flight at any time, that every reader overlapping with that
//! load receives its result, and that values written to the cache expire with a jittered TTL.
//!
//! ## Layers
//!
//! A read goes through the following steps, see [`CacheAccess::get_cached_or_load`]:
//!
//! - The [`CacheKey`] is derived from a namespace tag and a logical identifier.
//! - The external [`CacheStore`] is queried. A hit that [decodes](CacheValue::decode) is
//!   returned right away, without touching the registry.
//! - On a miss, the caller joins the in-flight episode for the key in the
//!   [`CoalescingRegistry`], or starts one. Only the starter's computation runs: it re-checks the
//!   store, calls the [`Origin`] loader, and writes the value through to the store with a TTL
//!   drawn by [`TtlJitter`].
//! - When the computation finishes, the registry entry is removed, and the result is sent to
//!   every subscriber of the episode.
//!
//! ## Failure handling
//!
//! Only origin failures reach the caller, as [`CacheError::Origin`]. They are relayed to every
//! caller of the failed episode and are never written to the store, so the next request starts
//! a fresh load.
//!
//! Failures of the cache store are absorbed: a failed or malformed read is handled like a miss,
//! and a failed write is logged while the freshly loaded value is still returned.
//!
//! Computations run as spawned tasks. Cancelling any caller, including the one that started the
//! episode, does not cancel the load. Should the computation panic, all subscribers receive
//! [`CacheError::Interrupted`] and the registry entry is removed all the same.
//!
//! ## Metrics
//!
//! - `caches.access`: All reads.
//! - `caches.store.hit`: Reads served by the fast path.
//! - `caches.store.late_hit`: Episodes that found the value on their re-check.
//! - `caches.channel.hit` / `caches.channel.miss`: Reads that joined / started an episode.
//! - `caches.computation`: Actual origin loads.
//! - `caches.origin.duration`: Timer for origin loads, failed ones included.
//! - `caches.in_flight`: Gauge of running episodes.
//! - `caches.origin.error`, `caches.store.read_error`, `caches.store.malformed`,
//!   `caches.store.write_error`: Failures per kind.

mod access;
mod cache_error;
mod cache_key;
mod jitter;
mod origin;
mod registry;
mod store;
mod value;

pub use access::CacheAccess;
pub use cache_error::{CacheEntry, CacheError, StoreError};
pub use cache_key::CacheKey;
pub use jitter::TtlJitter;
pub use origin::Origin;
pub use registry::CoalescingRegistry;
pub use store::{CacheStore, InMemoryStore};
pub use value::CacheValue;
