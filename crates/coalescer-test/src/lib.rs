//! Helpers for testing the coalescer.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp directory is held for the
//!    entire lifetime of the test, otherwise files written into it are deleted early.
//!
//!  - [`FakeStore`] and [`FakeOrigin`] count their calls and can be told to fail or miss, so
//!    tests can assert on how often the coalescer reached out to them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use coalescer_service::caching::{
    CacheEntry, CacheError, CacheStore, CacheValue, InMemoryStore, Origin, StoreError,
};

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `coalescer_service` crate and
///    mutes all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("coalescer_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Writes `yaml` to a `config.yml` inside `dir` and returns its path.
pub fn config_file(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("config.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// A single `set` call observed by a [`FakeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

#[derive(Debug, Default)]
struct FakeStoreInner {
    gets: AtomicUsize,
    missed_reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<RecordedWrite>>,
}

/// A [`CacheStore`] backed by an [`InMemoryStore`], with call recording and fault injection.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct FakeStore {
    store: InMemoryStore,
    inner: Arc<FakeStoreInner>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            store: InMemoryStore::new(1_000),
            inner: Default::default(),
        }
    }

    /// Puts a raw payload into the store without recording it as a write.
    pub async fn seed(&self, key: &str, value: &str, ttl: Duration) {
        self.store.set(key, value.to_owned(), ttl).await.unwrap();
    }

    /// Makes every following `get` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `get` report a miss, whether or not the key is stored.
    pub fn miss_reads(&self, count: usize) {
        self.inner.missed_reads.store(count, Ordering::SeqCst);
    }

    /// Makes every following `set` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The number of `get` calls so far.
    pub fn gets(&self) -> usize {
        self.inner.gets.load(Ordering::SeqCst)
    }

    /// All `set` calls so far, including failed ones.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.writes.lock().unwrap().clone()
    }

    /// Reads the raw payload under `key`, bypassing fault injection.
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.store.get(key).await.unwrap()
    }
}

impl CacheStore for FakeStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            self.inner.gets.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            let missed = self
                .inner
                .missed_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if missed.is_ok() {
                return Ok(None);
            }
            self.store.get(key).await
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.inner.writes.lock().unwrap().push(RecordedWrite {
                key: key.to_owned(),
                value: value.clone(),
                ttl,
            });
            if self.inner.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout(Duration::from_millis(100)));
            }
            self.store.set(key, value, ttl).await
        })
    }
}

/// An [`Origin`] that answers every load with a fixed result after a delay.
#[derive(Debug, Clone)]
pub struct FakeOrigin<V> {
    result: Arc<Mutex<CacheEntry<V>>>,
    delay: Duration,
    loads: Arc<AtomicUsize>,
}

impl<V: CacheValue> FakeOrigin<V> {
    /// An origin that loads `value`.
    pub fn new(value: V, delay: Duration) -> Self {
        Self::with_result(Ok(value), delay)
    }

    /// An origin that fails with an origin error carrying `message`.
    pub fn failing(message: &str, delay: Duration) -> Self {
        Self::with_result(Err(CacheError::Origin(message.to_owned())), delay)
    }

    fn with_result(result: CacheEntry<V>, delay: Duration) -> Self {
        Self {
            result: Arc::new(Mutex::new(result)),
            delay,
            loads: Default::default(),
        }
    }

    /// Changes what following loads return.
    pub fn set_result(&self, result: CacheEntry<V>) {
        *self.result.lock().unwrap() = result;
    }

    /// The number of loads started so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl<V: CacheValue> Origin for FakeOrigin<V> {
    type Value = V;

    fn load<'a>(&'a self, _logical_id: &'a str) -> BoxFuture<'a, CacheEntry<V>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.result.lock().unwrap().clone()
        })
    }
}
