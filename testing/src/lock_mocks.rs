//! In-memory distributed lock for fast, deterministic testing.
//!
//! [`InMemoryLock`] follows the same contract as the Redis lock: per-owner
//! reentrant holds, lease expiry measured on the tokio clock (so
//! `start_paused` tests can fast-forward through leases), and releases that
//! never touch another owner's lock.
//!
//! Faults can be injected to exercise the `SystemFault` paths:
//! - [`InMemoryLock::set_unavailable`]: every call fails with `LockError::Connection`
//! - [`InMemoryLock::interrupt_next_wait`]: the next blocking acquisition takes
//!   the lock and then reports `LockError::Interrupted`
//!
//! [`InMemoryLock::set_release_delay`] slows releases down, for cancelling a
//! caller while its release is in flight.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned mutexes

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketlock_core::lock::{DistributedLock, LockError, LockFuture, LockKey, LockOwner};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default interval at which blocked waiters re-check an expired lease.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct Entry {
    owner: String,
    holds: u32,
    expires_at: Instant,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    released: Notify,
    unavailable: AtomicBool,
    interrupt_next_wait: AtomicBool,
    acquisitions: AtomicU64,
    poll_interval: Duration,
    release_delay: Mutex<Duration>,
}

/// In-memory lock store shared by every clone.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ticketlock_core::lock::{DistributedLock, LockKey, LockOwner};
/// use ticketlock_testing::InMemoryLock;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lock = InMemoryLock::new();
/// let key = LockKey::new("lock:unit:1");
/// let (a, b) = (LockOwner::new(), LockOwner::new());
///
/// assert!(lock.try_acquire_once(&key, &a, Duration::from_secs(5)).await?);
/// assert!(!lock.try_acquire_once(&key, &b, Duration::from_secs(5)).await?);
///
/// lock.release(&key, &a).await?;
/// assert!(lock.try_acquire_once(&key, &b, Duration::from_secs(5)).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryLock {
    inner: Arc<Inner>,
}

impl InMemoryLock {
    /// Create an empty lock store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Create an empty lock store whose blocked waiters re-check at `poll_interval`.
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                released: Notify::new(),
                unavailable: AtomicBool::new(false),
                interrupt_next_wait: AtomicBool::new(false),
                acquisitions: AtomicU64::new(0),
                poll_interval,
                release_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Make every subsequent call fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Wait `delay` on the tokio clock before applying each release.
    pub fn set_release_delay(&self, delay: Duration) {
        *self.inner.release_delay.lock().unwrap() = delay;
    }

    /// Make the next `acquire_blocking` take the lock and then fail with
    /// `LockError::Interrupted`, leaving a partially held lock behind.
    pub fn interrupt_next_wait(&self) {
        self.inner.interrupt_next_wait.store(true, Ordering::SeqCst);
    }

    /// Current owner token of `key`, if held and not expired.
    #[must_use]
    pub fn holder(&self, key: &LockKey) -> Option<String> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .unwrap()
            .get(key.as_str())
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.owner.clone())
    }

    /// Whether `key` is currently held.
    #[must_use]
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.holder(key).is_some()
    }

    /// Reentrant hold count of `key` (0 if free).
    #[must_use]
    pub fn hold_count(&self, key: &LockKey) -> u32 {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .unwrap()
            .get(key.as_str())
            .filter(|entry| entry.expires_at > now)
            .map_or(0, |entry| entry.holds)
    }

    /// Force the lease on `key` to expire now, as if the holder stalled.
    pub fn expire(&self, key: &LockKey) {
        if let Some(entry) = self.inner.entries.lock().unwrap().get_mut(key.as_str()) {
            entry.expires_at = Instant::now();
        }
        self.inner.released.notify_waiters();
    }

    /// Number of fresh (non-reentrant) acquisitions since creation.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), LockError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Connection("in-memory lock store unavailable".into()));
        }
        Ok(())
    }

    fn try_take(&self, key: &LockKey, owner: &LockOwner, lease: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(key.as_str()) {
            if entry.expires_at > now {
                if entry.owner != owner.as_str() {
                    return false;
                }
                entry.holds += 1;
                entry.expires_at = now + lease;
                tracing::trace!(key = %key, owner = %owner, holds = entry.holds, "Reentrant acquire");
                return true;
            }
        }

        entries.insert(
            key.as_str().to_string(),
            Entry {
                owner: owner.as_str().to_string(),
                holds: 1,
                expires_at: now + lease,
            },
        );
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        true
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributedLock for InMemoryLock {
    fn try_acquire_once<'a>(
        &'a self,
        key: &'a LockKey,
        owner: &'a LockOwner,
        lease: Duration,
    ) -> LockFuture<'a, bool> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.try_take(key, owner, lease))
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
            loop {
                self.check_available()?;
                let released = self.inner.released.notified();

                if self.try_take(key, owner, lease) {
                    if self.inner.interrupt_next_wait.swap(false, Ordering::SeqCst) {
                        return Err(LockError::Interrupted(format!(
                            "wait for {key} abandoned after acquiring"
                        )));
                    }
                    return Ok(true);
                }

                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                let wait = (deadline - now).min(self.inner.poll_interval);
                let _ = tokio::time::timeout(wait, released).await;
            }
        })
    }

    fn release<'a>(&'a self, key: &'a LockKey, owner: &'a LockOwner) -> LockFuture<'a, ()> {
        Box::pin(async move {
            let delay = *self.inner.release_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.check_available()?;
            let now = Instant::now();
            let mut entries = self.inner.entries.lock().unwrap();

            let Some(entry) = entries.get_mut(key.as_str()) else {
                return Ok(());
            };
            if entry.owner != owner.as_str() || entry.expires_at <= now {
                tracing::debug!(key = %key, owner = %owner, "Release of lock not held, ignoring");
                return Ok(());
            }

            entry.holds -= 1;
            if entry.holds == 0 {
                entries.remove(key.as_str());
                drop(entries);
                self.inner.released.notify_waiters();
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
            self.check_available()?;
            let now = Instant::now();
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.get_mut(key.as_str()) {
                Some(entry) if entry.owner == owner.as_str() && entry.expires_at > now => {
                    entry.expires_at = now + lease;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}
