//! Distributed lock abstraction.
//!
//! A distributed lock gives mutually exclusive access to a named resource across
//! independent processes that share nothing but the lock store. Locks are held
//! by a [`LockOwner`] token and expire after a lease, so a crashed holder can
//! block a unit for at most one lease.
//!
//! # Acquisition policies
//!
//! - [`DistributedLock::try_acquire_once`]: set-if-absent, succeeds or fails immediately
//! - [`DistributedLock::acquire_blocking`]: keeps trying until `max_wait` elapses
//!
//! Contention is reported as `Ok(false)`. `Err` is reserved for the lock store
//! itself misbehaving (unreachable, script error, interrupted wait).
//!
//! # Scoped release
//!
//! [`LockGuard`] ties a held lock to a scope. Call [`LockGuard::release`] on the
//! normal path; if the guard is dropped without it (panic, cancelled future) the
//! release is spawned onto the current runtime instead.
//!
//! # Implementations
//!
//! - `RedisLock` (in `ticketlock-redis`): production
//! - `InMemoryLock` (in `ticketlock-testing`): deterministic tests

use crate::inventory::UnitId;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default namespace for unit lock keys.
pub const DEFAULT_KEY_PREFIX: &str = "lock:unit:";

/// Shortest interval the lease watchdog will renew at.
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Errors raised by the lock store itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock store could not be reached.
    #[error("Lock store connection error: {0}")]
    Connection(String),

    /// The lock store rejected or failed a command.
    #[error("Lock store command error: {0}")]
    Command(String),

    /// A blocking acquisition was abandoned before it completed.
    #[error("Lock wait interrupted: {0}")]
    Interrupted(String),
}

/// Name of a lockable resource in the lock store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Create a key from a raw string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key guarding a single inventory unit, e.g. `lock:unit:42`.
    #[must_use]
    pub fn for_unit(prefix: &str, unit_id: UnitId) -> Self {
        Self(format!("{prefix}{unit_id}"))
    }

    /// Get the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token identifying the logical caller holding a lock.
///
/// A lock can only be renewed or released with the token that acquired it, so a
/// caller whose lease expired can never delete a lock that now belongs to
/// someone else.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockOwner(String);

impl LockOwner {
    /// Generate a fresh random owner token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a fixed token (tests, reentrant callers).
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boxed future returned by [`DistributedLock`] methods.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LockError>> + Send + 'a>>;

/// Named mutual exclusion backed by a store shared between processes.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the lock can be injected as
/// `Arc<dyn DistributedLock>`.
pub trait DistributedLock: Send + Sync {
    /// Take the lock if nobody holds it, with a lease of `lease`.
    ///
    /// Returns `Ok(true)` if acquired (or already held by `owner`, in which case
    /// the hold count is incremented and the lease refreshed), `Ok(false)` if
    /// another owner holds it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the lock store fails.
    fn try_acquire_once<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        lease: Duration,
    ) -> LockFuture<'a, bool>;

    /// Keep trying to take the lock for up to `max_wait`.
    ///
    /// Returns `Ok(false)` if the window elapses without acquiring. Reentrant
    /// for the same `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the lock store fails or the wait is interrupted.
    fn acquire_blocking<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        max_wait: Duration,
        lease: Duration,
    ) -> LockFuture<'a, bool>;

    /// Drop one hold of `owner` on `key`.
    ///
    /// A no-op if the lock expired or belongs to another owner.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the lock store fails.
    fn release<'a>(&'a self, key: &'a LockKey, owner: &'a LockOwner) -> LockFuture<'a, ()>;

    /// Extend the lease if `owner` still holds the lock.
    ///
    /// Returns `Ok(false)` when the lock was lost (expired or taken over).
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the lock store fails.
    fn renew<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        lease: Duration,
    ) -> LockFuture<'a, bool>;
}

/// A held lock, released when the scope ends.
///
/// Optionally runs a lease watchdog that renews the lease every `lease / 3`
/// until the guard is released, so a critical section that outlives one lease
/// keeps its exclusivity.
pub struct LockGuard {
    lock: Arc<dyn DistributedLock>,
    key: LockKey,
    owner: LockOwner,
    watchdog: Option<JoinHandle<()>>,
    lease_lost: Arc<AtomicBool>,
    released: bool,
}

impl LockGuard {
    /// Wrap a lock that `owner` has just acquired on `key`.
    #[must_use]
    pub fn new(lock: Arc<dyn DistributedLock>, key: LockKey, owner: LockOwner) -> Self {
        Self {
            lock,
            key,
            owner,
            watchdog: None,
            lease_lost: Arc::new(AtomicBool::new(false)),
            released: false,
        }
    }

    /// Start renewing the lease in the background.
    ///
    /// Outside a tokio runtime no watchdog is started and the lease simply
    /// bounds the hold.
    #[must_use]
    pub fn with_watchdog(mut self, lease: Duration) -> Self {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %self.key, "No runtime available, lease watchdog not started");
            return self;
        };

        let lock = Arc::clone(&self.lock);
        let key = self.key.clone();
        let owner = self.owner.clone();
        let lease_lost = Arc::clone(&self.lease_lost);
        let period = (lease / 3).max(MIN_RENEW_INTERVAL);

        self.watchdog = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately; the lease was just set.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match lock.renew(&key, &owner, lease).await {
                    Ok(true) => {
                        tracing::trace!(key = %key, owner = %owner, "Lease renewed");
                    }
                    Ok(false) => {
                        lease_lost.store(true, Ordering::SeqCst);
                        tracing::warn!(key = %key, owner = %owner, "Lease lost before release");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, owner = %owner, error = %e, "Lease renewal failed");
                    }
                }
            }
        }));
        self
    }

    /// Key this guard holds.
    #[must_use]
    pub const fn key(&self) -> &LockKey {
        &self.key
    }

    /// Owner token this guard holds the lock with.
    #[must_use]
    pub const fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Whether the watchdog observed the lease being lost while held.
    #[must_use]
    pub fn lease_lost(&self) -> bool {
        self.lease_lost.load(Ordering::SeqCst)
    }

    /// Release the lock now.
    ///
    /// The store call runs on its own task, so dropping this future part way
    /// through does not leave the unit locked. Release failures are logged,
    /// never returned: the lease bounds how long a failed release can keep the
    /// unit locked.
    pub async fn release(mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }

        let lock = Arc::clone(&self.lock);
        let key = self.key.clone();
        let owner = self.owner.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            release_logged(lock, key, owner).await;
            self.released = true;
            return;
        };

        self.released = true;
        let task = runtime.spawn(release_logged(lock, key, owner));
        if let Err(e) = task.await {
            tracing::warn!(key = %self.key, owner = %self.owner, error = %e, "Lock release task failed");
        }
    }
}

async fn release_logged(lock: Arc<dyn DistributedLock>, key: LockKey, owner: LockOwner) {
    match lock.release(&key, &owner).await {
        Ok(()) => {
            tracing::debug!(key = %key, owner = %owner, "Lock released");
        }
        Err(e) => {
            tracing::warn!(
                key = %key,
                owner = %owner,
                error = %e,
                "Lock release failed, lease will expire it"
            );
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        if self.released {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %self.key, "Lock guard dropped outside runtime, lease will expire it");
            return;
        };

        let lock = Arc::clone(&self.lock);
        let key = self.key.clone();
        let owner = self.owner.clone();
        tracing::debug!(key = %key, owner = %owner, "Lock guard dropped without release, releasing in background");
        runtime.spawn(async move {
            if let Err(e) = lock.release(&key, &owner).await {
                tracing::warn!(key = %key, owner = %owner, error = %e, "Background lock release failed");
            }
        });
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("watchdog", &self.watchdog.is_some())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;

    /// Records calls; every lock is always available.
    #[derive(Default)]
    struct RecordingLock {
        calls: Mutex<Vec<String>>,
        renew_result: Mutex<bool>,
        release_delay: Mutex<Duration>,
    }

    impl RecordingLock {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl DistributedLock for RecordingLock {
        fn try_acquire_once<'a>(
            &'a self,
            key: &'a LockKey,
            _owner: &'a LockOwner,
            _lease: Duration,
        ) -> LockFuture<'a, bool> {
            self.record(format!("acquire {key}"));
            Box::pin(async { Ok(true) })
        }

        fn acquire_blocking<'a>(
            &'a self,
            key: &'a LockKey,
            owner: &'a LockOwner,
            _max_wait: Duration,
            lease: Duration,
        ) -> LockFuture<'a, bool> {
            self.try_acquire_once(key, owner, lease)
        }

        fn release<'a>(&'a self, key: &'a LockKey, _owner: &'a LockOwner) -> LockFuture<'a, ()> {
            let delay = *self.release_delay.lock().unwrap();
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.record(format!("release {key}"));
                Ok(())
            })
        }

        fn renew<'a>(
            &'a self,
            key: &'a LockKey,
            _owner: &'a LockOwner,
            _lease: Duration,
        ) -> LockFuture<'a, bool> {
            self.record(format!("renew {key}"));
            let ok = *self.renew_result.lock().unwrap();
            Box::pin(async move { Ok(ok) })
        }
    }

    #[test]
    fn unit_keys_use_prefix() {
        let key = LockKey::for_unit(DEFAULT_KEY_PREFIX, UnitId::new(101));
        assert_eq!(key.as_str(), "lock:unit:101");
    }

    #[test]
    fn owners_are_unique() {
        assert_ne!(LockOwner::new(), LockOwner::new());
    }

    #[tokio::test]
    async fn explicit_release_releases_once() {
        let lock = Arc::new(RecordingLock::default());
        let guard = LockGuard::new(lock.clone(), LockKey::new("k"), LockOwner::new());

        guard.release().await;
        tokio::task::yield_now().await;

        assert_eq!(lock.calls(), vec!["release k".to_string()]);
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let lock = Arc::new(RecordingLock::default());
        {
            let _guard = LockGuard::new(lock.clone(), LockKey::new("k"), LockOwner::new());
        }
        // Let the spawned release run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(lock.calls(), vec!["release k".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_release_still_reaches_the_store() {
        let lock = Arc::new(RecordingLock::default());
        *lock.release_delay.lock().unwrap() = Duration::from_millis(10);
        let guard = LockGuard::new(lock.clone(), LockKey::new("k"), LockOwner::new());

        let outcome = tokio::time::timeout(Duration::from_millis(1), guard.release()).await;
        assert!(outcome.is_err(), "release should still be in flight");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(lock.calls(), vec!["release k".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_renews_until_released() {
        let lock = Arc::new(RecordingLock::default());
        *lock.renew_result.lock().unwrap() = true;

        let guard = LockGuard::new(lock.clone(), LockKey::new("k"), LockOwner::new())
            .with_watchdog(Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(!guard.lease_lost());
        guard.release().await;

        let renewals = lock.calls().iter().filter(|c| c.starts_with("renew")).count();
        assert!(renewals >= 3, "expected at least 3 renewals, got {renewals}");

        tokio::time::sleep(Duration::from_secs(1)).await;
        let after = lock.calls().iter().filter(|c| c.starts_with("renew")).count();
        assert_eq!(renewals, after, "watchdog kept renewing after release");
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_flags_lost_lease() {
        let lock = Arc::new(RecordingLock::default());

        let guard = LockGuard::new(lock.clone(), LockKey::new("k"), LockOwner::new())
            .with_watchdog(Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(guard.lease_lost());
        guard.release().await;
    }
}
