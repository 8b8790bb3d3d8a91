//! Round trips against a live Redis at `REDIS_URL` (default `redis://127.0.0.1/`).
//!
//! Run with `cargo test -- --ignored`.

use std::time::Duration;

use civicdb::{
    ConnectionManager, EntityCache, LockBackend, LockManager, RedisHashCache, RedisLockBackend,
    RedisStreamPublisher, TopicPublisher, cleanup_pattern, config::LockSettings, keys::KeyContext,
};
use serial_test::serial;

const PREFIX: &str = "civicdb_test";

async fn redis_connection() -> ConnectionManager {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let client = redis::Client::open(url).expect("redis client");
    client.get_connection_manager().await.expect("connection manager")
}

async fn reset(conn: &mut ConnectionManager) {
    cleanup_pattern(conn, &format!("{PREFIX}:*")).await.expect("cleanup");
}

#[tokio::test]
#[ignore = "requires a running Redis"]
#[serial]
async fn hash_cache_round_trip() {
    let mut conn = redis_connection().await;
    reset(&mut conn).await;
    let cache = RedisHashCache::new(conn.clone(), PREFIX);

    let entries = vec![
        ("H1".to_string(), r#"{"id":"H1"}"#.to_string()),
        ("H2".to_string(), r#"{"id":"H2"}"#.to_string()),
    ];
    cache
        .put_many("household", &entries, Duration::from_secs(60))
        .await
        .expect("put");

    let found = cache
        .get_many("household", &["H2".to_string(), "H3".to_string()])
        .await
        .expect("get");
    assert_eq!(found, vec![Some(r#"{"id":"H2"}"#.to_string()), None]);

    let ttl = cache.time_to_live("household").await.expect("ttl").expect("exists");
    assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(50));

    let mut all = cache.get_all("household").await.expect("all");
    all.sort();
    assert_eq!(all, entries);

    assert!(cache.evict("household").await.expect("evict"));
    assert_eq!(cache.time_to_live("household").await.expect("ttl"), None);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
#[serial]
async fn lock_scripts_are_all_or_nothing() {
    let mut conn = redis_connection().await;
    reset(&mut conn).await;
    let backend = RedisLockBackend::new(conn.clone());
    let keys = KeyContext::new(PREFIX);
    let r1 = keys.record_lock("R1");
    let r2 = keys.record_lock("R2");

    assert!(
        backend
            .try_acquire(std::slice::from_ref(&r2), "other", Duration::from_secs(10))
            .await
            .unwrap()
    );
    assert!(
        !backend
            .try_acquire(&[r1.clone(), r2.clone()], "me", Duration::from_secs(10))
            .await
            .unwrap()
    );
    assert_eq!(backend.holder(&r1).await.unwrap(), None);

    assert_eq!(backend.release(&[r2.clone()], "me").await.unwrap(), 0);
    assert_eq!(backend.release(&[r2.clone()], "other").await.unwrap(), 1);

    let held = backend.scan(&keys.lock_pattern()).await.unwrap();
    assert!(held.is_empty());
}

#[tokio::test]
#[ignore = "requires a running Redis"]
#[serial]
async fn lock_manager_against_redis() {
    let mut conn = redis_connection().await;
    reset(&mut conn).await;
    let settings = LockSettings {
        wait_secs: 0,
        lease_secs: 10,
        retry_interval_ms: 50,
    };
    let manager = LockManager::new(RedisLockBackend::new(conn.clone()), PREFIX, settings);
    let records = vec!["R1".to_string(), "R2".to_string()];

    assert!(manager.lock_records(&records).await);
    let held = manager.backend().scan(&KeyContext::new(PREFIX).lock_pattern()).await.unwrap();
    assert_eq!(held.len(), 2);
    assert!(held.iter().all(|(_, owner)| owner == manager.owner_token()));

    assert_eq!(manager.release_locks(&records).await.unwrap(), 2);
}

#[tokio::test]
#[ignore = "requires a running Redis"]
#[serial]
async fn stream_publisher_appends_one_entry_per_publish() {
    let mut conn = redis_connection().await;
    reset(&mut conn).await;
    let topic = format!("{PREFIX}:save-household-topic");
    let publisher = RedisStreamPublisher::new(conn.clone()).with_max_len(Some(100));

    publisher.publish(&topic, r#"[{"id":"H1"}]"#).await.expect("publish");
    publisher.publish(&topic, "[]").await.expect("publish");

    let len: u64 = redis::cmd("XLEN").arg(&topic).query_async(&mut conn).await.unwrap();
    assert_eq!(len, 2);
}
