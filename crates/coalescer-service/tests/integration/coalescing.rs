use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, join_all};

use coalescer_service::caching::{CacheAccess, CacheError, CacheKey, TtlJitter};
use coalescer_test::{FakeOrigin, FakeStore, setup};

const BASE_TTL: Duration = Duration::from_secs(60);

fn access(store: &FakeStore) -> CacheAccess<String> {
    CacheAccess::new(Arc::new(store.clone()), TtlJitter::default())
}

fn load_from(
    origin: &FakeOrigin<String>,
    id: &'static str,
) -> impl FnOnce() -> BoxFuture<'static, Result<String, CacheError>> + Send + 'static {
    use coalescer_service::caching::Origin;

    let origin = origin.clone();
    move || Box::pin(async move { origin.load(id).await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_across_threads() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::new("value".to_owned(), Duration::from_millis(100));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let access = access.clone();
            let load = load_from(&origin, "42");
            tokio::spawn(async move {
                access
                    .get_cached_or_load("42", "things", load, BASE_TTL)
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        assert_eq!(result.unwrap(), Ok("value".to_owned()));
    }

    assert_eq!(origin.loads(), 1);
    assert_eq!(store.writes().len(), 1);
    assert_eq!(access.registry().in_flight(), 0);
}

#[tokio::test]
async fn test_fast_path_never_creates_episode() {
    setup();
    let store = FakeStore::new();
    store.seed("things:42", "cached", BASE_TTL).await;
    let access = access(&store);
    let origin = FakeOrigin::new("fresh".to_owned(), Duration::ZERO);

    let requests = (0..10).map(|_| {
        access.get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
    });
    let results = join_all(requests).await;

    assert!(results.iter().all(|r| *r == Ok("cached".to_owned())));
    assert_eq!(origin.loads(), 0);
    assert!(store.writes().is_empty());
    assert!(!access.registry().is_in_flight(&CacheKey::new("42", "things")));
}

#[tokio::test]
async fn test_recheck_hit_skips_origin() {
    setup();
    let store = FakeStore::new();
    store.seed("things:42", "written meanwhile", BASE_TTL).await;
    // The fast path misses, the re-check inside the episode finds the value.
    store.miss_reads(1);
    let access = access(&store);
    let origin = FakeOrigin::new("fresh".to_owned(), Duration::ZERO);

    let value = access
        .get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
        .await;

    assert_eq!(value, Ok("written meanwhile".to_owned()));
    assert_eq!(origin.loads(), 0);
    assert_eq!(store.gets(), 2);
    assert!(store.writes().is_empty());
    assert_eq!(access.registry().in_flight(), 0);
}

#[tokio::test]
async fn test_waiters_share_origin_error() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::<String>::failing("database unavailable", Duration::from_millis(50));

    let requests = (0..5).map(|_| {
        access.get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
    });
    let results = join_all(requests).await;

    let expected = Err(CacheError::Origin("database unavailable".into()));
    assert!(results.iter().all(|r| *r == expected));
    assert_eq!(origin.loads(), 1);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_failure_is_not_replayed() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::<String>::failing("database unavailable", Duration::from_millis(10));

    let first = access
        .get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
        .await;
    assert!(first.is_err());

    origin.set_result(Ok("recovered".to_owned()));
    let second = access
        .get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
        .await;

    assert_eq!(second, Ok("recovered".to_owned()));
    assert_eq!(origin.loads(), 2);
    assert_eq!(store.raw("things:42").await.as_deref(), Some("recovered"));
}

#[tokio::test]
async fn test_consecutive_episodes() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::new("value".to_owned(), Duration::from_millis(10));

    // Without write-through every call is a miss, and each must start its own episode rather
    // than block on a finished one.
    store.fail_writes(true);
    for expected_loads in 1..=3 {
        let value = access
            .get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL)
            .await;
        assert_eq!(value, Ok("value".to_owned()));
        assert_eq!(origin.loads(), expected_loads);
        assert_eq!(access.registry().in_flight(), 0);
    }
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_cancel_load() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::new("value".to_owned(), Duration::from_millis(100));

    let starter = {
        let access = access.clone();
        let load = load_from(&origin, "42");
        tokio::spawn(async move {
            access
                .get_cached_or_load("42", "things", load, BASE_TTL)
                .await
        })
    };
    let waiter = {
        let access = access.clone();
        let load = load_from(&origin, "42");
        tokio::spawn(async move {
            access
                .get_cached_or_load("42", "things", load, BASE_TTL)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    waiter.abort();

    assert_eq!(starter.await.unwrap(), Ok("value".to_owned()));
    assert_eq!(origin.loads(), 1);
}

#[tokio::test]
async fn test_cancelled_starter_still_completes_episode() {
    setup();
    let store = FakeStore::new();
    let access = access(&store);
    let origin = FakeOrigin::new("value".to_owned(), Duration::from_millis(100));

    let starter = {
        let access = access.clone();
        let load = load_from(&origin, "42");
        tokio::spawn(async move {
            access
                .get_cached_or_load("42", "things", load, BASE_TTL)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waiter = access.get_cached_or_load("42", "things", load_from(&origin, "42"), BASE_TTL);
    starter.abort();

    assert_eq!(waiter.await, Ok("value".to_owned()));
    assert_eq!(origin.loads(), 1);
    assert_eq!(access.registry().in_flight(), 0);
    assert_eq!(store.raw("things:42").await.as_deref(), Some("value"));
}
