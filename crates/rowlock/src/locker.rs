use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rowlock_detect::DeadlockDetector;
use rowlock_types::{
    EntityKey, EntitySnapshot, LockError, LockerSnapshot, ThreadHandle, WaitSnapshot,
};
use tracing::{debug, trace};

use crate::config::{ConfigError, LockerConfig, Retention};
use crate::mutex::{Acquire, EntityMutex};
use crate::{CancelToken, EntityGuard};

/// Registry of per-entity reentrant mutexes with deadlock detection.
///
/// Mutexes are created on first use of a key. Before a thread waits for an entity
/// it does not already hold, the locker asks its [`DeadlockDetector`] whether the
/// wait could close a cycle and fails with [`LockError::DeadlockThreat`] instead of
/// hanging.
///
/// Every successful `lock`/`try_lock` must be paired with one `unlock` on the same
/// thread. [`guard`](Self::guard) and [`with_lock`](Self::with_lock) do the pairing
/// for you.
pub struct EntityLocker<K: EntityKey> {
    slots: DashMap<K, Arc<EntityMutex>>,
    detector: DeadlockDetector<K>,
    config: LockerConfig,
}

fn validate<K: EntityKey>(key: &K) -> Result<(), LockError<K>> {
    if key.is_blank() {
        return Err(LockError::InvalidKey { key: key.clone() });
    }
    Ok(())
}

impl<K: EntityKey> EntityLocker<K> {
    pub fn new() -> Self {
        Self::with_config(LockerConfig::default())
    }

    pub fn with_config(config: LockerConfig) -> Self {
        Self {
            slots: DashMap::new(),
            detector: DeadlockDetector::new(),
            config,
        }
    }

    /// Builds a locker from [`LockerConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        LockerConfig::from_env().map(Self::with_config)
    }

    pub fn config(&self) -> &LockerConfig {
        &self.config
    }

    /// Blocks until the calling thread holds `key`.
    ///
    /// Reentrant: if the caller already holds `key` the hold count goes up and the
    /// call returns immediately without consulting the detector.
    pub fn lock(&self, key: &K) -> Result<(), LockError<K>> {
        validate(key)?;
        let me = ThreadHandle::current();
        let mutex = self.checkout(key);
        if let Some(holds) = mutex.reenter(&me) {
            trace!(key = ?key, holds, "reentrant lock");
            return Ok(());
        }
        if let Err(err) = self.detector.before_lock(&me, key) {
            self.checkin(key, &mutex);
            return Err(err);
        }
        mutex.lock(&me);
        self.detector.after_lock(&me, key, true);
        debug!(key = ?key, "entity locked");
        Ok(())
    }

    /// Like [`lock`](Self::lock), but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if the bound elapsed first; nothing is held in that case.
    pub fn try_lock(&self, key: &K, timeout: Duration) -> Result<bool, LockError<K>> {
        self.attempt(key, timeout, None)
    }

    /// Like [`try_lock`](Self::try_lock), and additionally fails with
    /// [`LockError::Cancelled`] as soon as `cancel` fires during the wait.
    ///
    /// A reentrant acquisition never waits, so it succeeds even with a cancelled
    /// token.
    pub fn try_lock_cancellable(
        &self,
        key: &K,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<bool, LockError<K>> {
        self.attempt(key, timeout, Some(cancel))
    }

    fn attempt(
        &self,
        key: &K,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<bool, LockError<K>> {
        validate(key)?;
        let me = ThreadHandle::current();
        let mutex = self.checkout(key);
        if let Some(holds) = mutex.reenter(&me) {
            trace!(key = ?key, holds, "reentrant lock");
            return Ok(true);
        }
        if let Err(err) = self.detector.before_lock(&me, key) {
            self.checkin(key, &mutex);
            return Err(err);
        }

        // A timeout too large to represent waits forever.
        let deadline = Instant::now().checked_add(timeout);
        let outcome = mutex.lock_until(&me, deadline, cancel);
        self.detector
            .after_lock(&me, key, outcome == Acquire::Acquired);

        match outcome {
            Acquire::Acquired => {
                debug!(key = ?key, "entity locked");
                Ok(true)
            }
            Acquire::TimedOut => {
                self.checkin(key, &mutex);
                debug!(key = ?key, ?timeout, "timed out waiting for entity");
                Ok(false)
            }
            Acquire::Cancelled => {
                self.checkin(key, &mutex);
                debug!(key = ?key, "wait for entity cancelled");
                Err(LockError::Cancelled { key: key.clone() })
            }
        }
    }

    /// Drops one hold of `key`. The last release clears the detector's ownership
    /// record before the mutex becomes available to other threads.
    pub fn unlock(&self, key: &K) -> Result<(), LockError<K>> {
        validate(key)?;
        let Some(mutex) = self.lookup(key) else {
            return Err(LockError::MissingLock { key: key.clone() });
        };
        let me = ThreadHandle::current();
        match mutex.release(&me, || self.detector.before_unlock(key)) {
            Ok(0) => debug!(key = ?key, "entity unlocked"),
            Ok(holds) => trace!(key = ?key, holds, "reentrant unlock"),
            Err(owner) => {
                return Err(LockError::NotOwner {
                    key: key.clone(),
                    owner,
                });
            }
        }
        self.checkin(key, &mutex);
        Ok(())
    }

    /// `true` iff `key` has a mutex and some thread other than the caller holds it.
    pub fn is_locked_by_another_thread(&self, key: &K) -> Result<bool, LockError<K>> {
        validate(key)?;
        Ok(self
            .lookup(key)
            .and_then(|mutex| mutex.owner())
            .is_some_and(|owner| !owner.is_current()))
    }

    pub fn is_held_by_current_thread(&self, key: &K) -> Result<bool, LockError<K>> {
        Ok(self.hold_count(key)? > 0)
    }

    /// Number of unmatched acquisitions of `key` by the calling thread.
    pub fn hold_count(&self, key: &K) -> Result<usize, LockError<K>> {
        validate(key)?;
        let me = ThreadHandle::current();
        Ok(self.lookup(key).map_or(0, |mutex| mutex.holds_of(&me)))
    }

    /// Locks `key` and returns a guard that unlocks it when dropped.
    pub fn guard(&self, key: &K) -> Result<EntityGuard<'_, K>, LockError<K>> {
        self.lock(key)?;
        Ok(EntityGuard::new(self, key.clone()))
    }

    /// Guard flavour of [`try_lock`](Self::try_lock). `Ok(None)` means the bound
    /// elapsed.
    pub fn try_guard(
        &self,
        key: &K,
        timeout: Duration,
    ) -> Result<Option<EntityGuard<'_, K>>, LockError<K>> {
        Ok(self
            .try_lock(key, timeout)?
            .then(|| EntityGuard::new(self, key.clone())))
    }

    /// Runs `f` while holding `key`. The lock is released on return and on unwind.
    pub fn with_lock<R>(&self, key: &K, f: impl FnOnce() -> R) -> Result<R, LockError<K>> {
        let _guard = self.guard(key)?;
        Ok(f())
    }

    /// Number of entity mutexes currently registered.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn snapshot(&self) -> LockerSnapshot {
        let mut entities: Vec<EntitySnapshot> = self
            .slots
            .iter()
            .map(|slot| {
                let (owner, holds) = slot.value().hold_state();
                EntitySnapshot {
                    key: format!("{:?}", slot.key()),
                    owner: owner.as_ref().map(ThreadHandle::snapshot),
                    holds: holds as u64,
                }
            })
            .collect();
        entities.sort_by(|a, b| a.key.cmp(&b.key));

        let mut waits: Vec<WaitSnapshot> = self
            .detector
            .waits()
            .into_iter()
            .map(|(thread, key)| WaitSnapshot {
                thread: thread.snapshot(),
                key: format!("{key:?}"),
            })
            .collect();
        waits.sort_by(|a, b| a.key.cmp(&b.key));

        LockerSnapshot { entities, waits }
    }

    // ── Registry slots ──────────────────────────────────────

    fn lookup(&self, key: &K) -> Option<Arc<EntityMutex>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Returns the mutex for `key`, creating it if needed. Under idle eviction the
    /// caller becomes a user of the slot and must `checkin` when it stops holding
    /// or waiting.
    fn checkout(&self, key: &K) -> Arc<EntityMutex> {
        match self.config.retention {
            Retention::Retain => {
                if let Some(mutex) = self.lookup(key) {
                    return mutex;
                }
                let slot = self
                    .slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(EntityMutex::new()));
                Arc::clone(slot.value())
            }
            Retention::EvictIdle => {
                // The user count goes up under the shard lock, so `remove_if` in
                // `checkin` can never evict a slot that was just handed out.
                let slot = self
                    .slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(EntityMutex::new()));
                slot.value().add_user();
                Arc::clone(slot.value())
            }
        }
    }

    fn checkin(&self, key: &K, mutex: &Arc<EntityMutex>) {
        if self.config.retention != Retention::EvictIdle || !mutex.remove_user() {
            return;
        }
        let evicted = self
            .slots
            .remove_if(key, |_, slot| Arc::ptr_eq(slot, mutex) && slot.is_unused())
            .is_some();
        if evicted {
            trace!(key = ?key, "evicted idle entity mutex");
        }
    }
}

impl<K: EntityKey> Default for EntityLocker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityKey> fmt::Debug for EntityLocker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLocker")
            .field("entities", &self.slots.len())
            .field("retention", &self.config.retention)
            .finish_non_exhaustive()
    }
}
