//! Integration tests for `RedisLock` using testcontainers.
//!
//! These tests are marked as `#[ignore]` by default because they need Docker to
//! start a `Redis` container.
//!
//! ```bash
//! cargo test -p ticketlock-redis --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use ticketlock_core::lock::{DistributedLock, LockKey, LockOwner};
use ticketlock_redis::{BackoffPolicy, RedisLock};

const LEASE: Duration = Duration::from_secs(5);

/// Start a Redis container and connect a lock to it.
///
/// Returns both the container (to keep it alive) and the lock.
async fn setup_redis_lock() -> (ContainerAsync<Redis>, RedisLock, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");

    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    let redis_url = format!("redis://127.0.0.1:{port}");

    let mut retries = 0;
    loop {
        if let Ok(lock) = RedisLock::new(&redis_url).await {
            if lock.ping().await.is_ok() {
                return (container, lock, redis_url);
            }
        }
        assert!(retries < 30, "Redis not ready after {retries} retries");
        retries += 1;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_mutual_exclusion_between_owners() {
    let (_container, lock, _) = setup_redis_lock().await;
    let key = LockKey::new("lock:unit:1");
    let (a, b) = (LockOwner::new(), LockOwner::new());

    assert!(lock.try_acquire_once(&key, &a, LEASE).await.unwrap());
    assert!(!lock.try_acquire_once(&key, &b, LEASE).await.unwrap());

    lock.release(&key, &a).await.unwrap();
    assert!(lock.try_acquire_once(&key, &b, LEASE).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reentrant_holds_need_matching_releases() {
    let (_container, lock, _) = setup_redis_lock().await;
    let key = LockKey::new("lock:unit:2");
    let (a, b) = (LockOwner::new(), LockOwner::new());

    assert!(lock.try_acquire_once(&key, &a, LEASE).await.unwrap());
    assert!(lock.try_acquire_once(&key, &a, LEASE).await.unwrap());

    lock.release(&key, &a).await.unwrap();
    assert!(!lock.try_acquire_once(&key, &b, LEASE).await.unwrap());

    lock.release(&key, &a).await.unwrap();
    assert!(lock.try_acquire_once(&key, &b, LEASE).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_release_by_non_holder_keeps_lock() {
    let (_container, lock, _) = setup_redis_lock().await;
    let key = LockKey::new("lock:unit:3");
    let (a, b) = (LockOwner::new(), LockOwner::new());

    assert!(lock.try_acquire_once(&key, &a, LEASE).await.unwrap());
    lock.release(&key, &b).await.unwrap();

    assert!(!lock.try_acquire_once(&key, &b, LEASE).await.unwrap());
    assert!(lock.renew(&key, &a, LEASE).await.unwrap());
    assert!(!lock.renew(&key, &b, LEASE).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_lease_expires_without_renewal() {
    let (_container, lock, _) = setup_redis_lock().await;
    let key = LockKey::new("lock:unit:4");
    let (a, b) = (LockOwner::new(), LockOwner::new());

    assert!(lock.try_acquire_once(&key, &a, Duration::from_millis(200)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(lock.try_acquire_once(&key, &b, LEASE).await.unwrap());
    // The expired holder can neither renew nor free b's lock.
    assert!(!lock.renew(&key, &a, LEASE).await.unwrap());
    lock.release(&key, &a).await.unwrap();
    assert!(!lock.try_acquire_once(&key, &a, LEASE).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_blocking_acquire_waits_then_times_out() {
    let (_container, lock, _) = setup_redis_lock().await;
    let key = LockKey::new("lock:unit:5");
    let a = LockOwner::new();
    assert!(lock.try_acquire_once(&key, &a, LEASE).await.unwrap());

    let started = std::time::Instant::now();
    let acquired = lock
        .acquire_blocking(&key, &LockOwner::new(), Duration::from_millis(300), LEASE)
        .await
        .unwrap();
    assert!(!acquired);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let waiter = {
        let lock = lock.clone();
        let key = key.clone();
        tokio::spawn(async move {
            lock.acquire_blocking(&key, &LockOwner::new(), Duration::from_secs(5), LEASE)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    lock.release(&key, &a).await.unwrap();

    assert!(waiter.await.unwrap().unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_lock_serializes_read_modify_write() {
    let (_container, lock, redis_url) = setup_redis_lock().await;
    let lock = Arc::new(lock.with_backoff(BackoffPolicy::new(
        Duration::from_millis(2),
        Duration::from_millis(20),
    )));
    let client = redis::Client::open(redis_url.as_str()).unwrap();
    let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
    let key = LockKey::new("lock:counter");

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let key = key.clone();
            let mut conn = conn.clone();
            tokio::spawn(async move {
                let owner = LockOwner::new();
                assert!(
                    lock.acquire_blocking(&key, &owner, Duration::from_secs(20), LEASE)
                        .await
                        .unwrap()
                );
                // Deliberately non-atomic: GET, pause, SET.
                let current: Option<i64> =
                    redis::cmd("GET").arg("counter").query_async(&mut conn).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _: () = redis::cmd("SET")
                    .arg("counter")
                    .arg(current.unwrap_or(0) + 1)
                    .query_async(&mut conn)
                    .await
                    .unwrap();
                lock.release(&key, &owner).await.unwrap();
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let mut conn = conn.clone();
    let total: i64 = redis::cmd("GET").arg("counter").query_async(&mut conn).await.unwrap();
    assert_eq!(total, 20);
}
