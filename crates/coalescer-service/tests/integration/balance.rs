use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use coalescer_service::caching::CacheKey;
use coalescer_service::config::Config;
use coalescer_service::services::{
    BALANCE_NAMESPACE, Balance, create_balance_service, create_in_memory_store,
};
use coalescer_test::{FakeOrigin, FakeStore, setup};

/// Ten concurrent lookups of one cold user balance result in exactly one origin load.
#[tokio::test]
async fn test_concurrent_balance_lookups() {
    setup();
    let config = Config::default();
    let store = FakeStore::new();
    let origin = FakeOrigin::new(Balance(1234.56), Duration::from_millis(200));
    let service = create_balance_service(&config, Arc::new(store.clone()), origin.clone());

    let requests = (0..10).map(|_| service.get_user_balance("u:123"));
    let results = join_all(requests).await;

    assert_eq!(results.len(), 10);
    for result in results {
        assert_eq!(result, Ok(Balance(1234.56)));
    }
    assert_eq!(origin.loads(), 1);

    let key = CacheKey::new("u:123", BALANCE_NAMESPACE);
    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].key, key.as_str());
    assert_eq!(writes[0].value, "1234.56");
    assert!(writes[0].ttl >= Duration::from_secs(48));
    assert!(writes[0].ttl <= Duration::from_secs(72));

    assert_eq!(store.raw(key.as_str()).await.as_deref(), Some("1234.56"));
    assert_eq!(service.access().registry().in_flight(), 0);
}

#[tokio::test]
async fn test_cached_balance_is_served() {
    setup();
    let config = Config::default();
    let store = FakeStore::new();
    let key = CacheKey::new("7", BALANCE_NAMESPACE);
    store.seed(key.as_str(), "99.90", Duration::from_secs(60)).await;
    let origin = FakeOrigin::new(Balance(0.0), Duration::ZERO);
    let service = create_balance_service(&config, Arc::new(store.clone()), origin.clone());

    assert_eq!(service.get_user_balance("7").await, Ok(Balance(99.9)));
    assert_eq!(origin.loads(), 0);
}

#[tokio::test]
async fn test_distinct_users_load_separately() {
    setup();
    let config = Config::default();
    let store = FakeStore::new();
    let origin = FakeOrigin::new(Balance(10.0), Duration::from_millis(20));
    let service = create_balance_service(&config, Arc::new(store.clone()), origin.clone());

    let (a, b) = futures::join!(service.get_user_balance("1"), service.get_user_balance("2"));

    assert_eq!(a, Ok(Balance(10.0)));
    assert_eq!(b, Ok(Balance(10.0)));
    assert_eq!(origin.loads(), 2);
    assert_eq!(store.writes().len(), 2);
}

#[tokio::test]
async fn test_in_memory_store_from_config() {
    setup();
    let config = Config::default();
    let store = create_in_memory_store(&config);
    let origin = FakeOrigin::new(Balance(42.0), Duration::from_millis(20));
    let service = create_balance_service(&config, store.clone(), origin.clone());

    let requests = (0..5).map(|_| service.get_user_balance("9"));
    let results = join_all(requests).await;
    assert!(results.iter().all(|r| *r == Ok(Balance(42.0))));
    assert_eq!(origin.loads(), 1);

    let ttl = store
        .ttl(CacheKey::new("9", BALANCE_NAMESPACE).as_str())
        .await
        .unwrap();
    assert!(ttl >= Duration::from_secs(48) && ttl <= Duration::from_secs(72));

    assert_eq!(service.get_user_balance("9").await, Ok(Balance(42.0)));
    assert_eq!(origin.loads(), 1);
}
