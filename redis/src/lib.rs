//! Redis-backed [`DistributedLock`].
//!
//! Each lock is a Redis hash at the lock key mapping owner token to hold count,
//! with a millisecond TTL as the lease. All state transitions run as Lua scripts
//! so check-and-set is atomic on the server:
//!
//! - **acquire**: if the key is absent or already held by the caller, bump the
//!   caller's hold count and reset the TTL
//! - **release**: decrement the caller's hold count, deleting the key at zero;
//!   a caller that doesn't hold the lock changes nothing
//! - **renew**: reset the TTL if the caller still holds the lock
//!
//! Blocking acquisition polls the acquire script with jittered exponential
//! backoff (see [`BackoffPolicy`]) until `max_wait` runs out.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ticketlock_core::lock::{DistributedLock, LockKey, LockOwner};
//! use ticketlock_redis::RedisLock;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lock = RedisLock::new("redis://127.0.0.1:6379").await?;
//! let key = LockKey::new("lock:unit:1");
//! let owner = LockOwner::new();
//!
//! if lock.acquire_blocking(&key, &owner, Duration::from_secs(10), Duration::from_secs(1)).await? {
//!     // critical section
//!     lock.release(&key, &owner).await?;
//! }
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use ticketlock_core::lock::{DistributedLock, LockError, LockFuture, LockKey, LockOwner};
use tokio::time::Instant;

pub mod backoff;

pub use backoff::BackoffPolicy;

const ACQUIRE_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 or redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
        redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
        redis.call('PEXPIRE', KEYS[1], ARGV[2])
        return 1
    end
    return 0
";

const RELEASE_SCRIPT: &str = r"
    if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
        return 0
    end
    local holds = redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
    if holds > 0 then
        return 1
    end
    redis.call('DEL', KEYS[1])
    return 1
";

const RENEW_SCRIPT: &str = r"
    if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
        redis.call('PEXPIRE', KEYS[1], ARGV[2])
        return 1
    end
    return 0
";

/// Lua scripts, hashed once per lock instance.
struct LockScripts {
    acquire: Script,
    release: Script,
    renew: Script,
}

/// Distributed lock stored in `Redis`.
///
/// Cheap to clone; clones share the connection manager.
#[derive(Clone)]
pub struct RedisLock {
    conn_manager: ConnectionManager,
    scripts: Arc<LockScripts>,
    backoff: BackoffPolicy,
}

impl RedisLock {
    /// Connect to `Redis`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Connection`] if the URL is invalid or the server is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self, LockError> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::Connection(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            LockError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis lock store");
        Ok(Self::from_connection_manager(conn_manager))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn from_connection_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            scripts: Arc::new(LockScripts {
                acquire: Script::new(ACQUIRE_SCRIPT),
                release: Script::new(RELEASE_SCRIPT),
                renew: Script::new(RENEW_SCRIPT),
            }),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Use a custom backoff between blocking acquisition attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check that the lock store answers.
    ///
    /// # Errors
    ///
    /// Returns a [`LockError`] if `PING` fails.
    pub async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.conn_manager.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn run_acquire(
        &self,
        key: &LockKey,
        owner: &LockOwner,
        lease: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.conn_manager.clone();
        let acquired: i64 = self
            .scripts
            .acquire
            .key(key.as_str())
            .arg(owner.as_str())
            .arg(lease_millis(lease))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(acquired == 1)
    }
}

impl std::fmt::Debug for RedisLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLock")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl DistributedLock for RedisLock {
    fn try_acquire_once<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        lease: Duration,
    ) -> LockFuture<'a, bool> {
        Box::pin(async move {
            let acquired = self.run_acquire(key, owner, lease).await?;
            tracing::debug!(key = %key, owner = %owner, acquired, "Single lock attempt");
            Ok(acquired)
        })
    }

    fn acquire_blocking<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        max_wait: Duration,
        lease: Duration,
    ) -> LockFuture<'a, bool> {
        Box::pin(async move {
            let deadline = Instant::now() + max_wait;
            let mut attempt: u32 = 0;

            loop {
                if self.run_acquire(key, owner, lease).await? {
                    if attempt > 0 {
                        tracing::debug!(key = %key, owner = %owner, attempt, "Lock acquired after waiting");
                    }
                    return Ok(true);
                }

                let now = Instant::now();
                if now >= deadline {
                    tracing::debug!(
                        key = %key,
                        owner = %owner,
                        attempts = attempt + 1,
                        "Gave up waiting for lock"
                    );
                    return Ok(false);
                }

                let delay = self.backoff.delay_for_attempt(attempt).min(deadline - now);
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        })
    }

    fn release<'a>(&'a self, key: &'a LockKey, owner: &'a LockOwner) -> LockFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let released: i64 = self
                .scripts
                .release
                .key(key.as_str())
                .arg(owner.as_str())
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            if released == 0 {
                tracing::debug!(key = %key, owner = %owner, "Release of lock not held, ignoring");
            }
            Ok(())
        })
    }

    fn renew<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        lease: Duration,
    ) -> LockFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let renewed: i64 = self
                .scripts
                .renew
                .key(key.as_str())
                .arg(owner.as_str())
                .arg(lease_millis(lease))
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            Ok(renewed == 1)
        })
    }
}

/// Lease as a `PEXPIRE` argument; at least 1ms so the key never expires on write.
fn lease_millis(lease: Duration) -> u64 {
    u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(e: RedisError) -> LockError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        LockError::Connection(e.to_string())
    } else {
        LockError::Command(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_at_least_one_millisecond() {
        assert_eq!(lease_millis(Duration::ZERO), 1);
        assert_eq!(lease_millis(Duration::from_secs(5)), 5_000);
    }

    #[test]
    fn io_errors_map_to_connection_errors() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(map_redis_error(io), LockError::Connection(_)));

        let script = RedisError::from((redis::ErrorKind::ResponseError, "ERR script failed"));
        assert!(matches!(map_redis_error(script), LockError::Command(_)));
    }
}
