//! Per-entity reentrant locking with live deadlock detection.
//!
//! An [`EntityLocker`] hands out exclusive access to entities identified only by
//! their key ("row-level locking"). It never sees the entities themselves. Each key
//! gets its own reentrant mutex, created on first use, and every wait is checked
//! against the current wait-for graph first: a lock request that would complete a
//! cycle fails with [`LockError::DeadlockThreat`] instead of hanging.
//!
//! ```
//! use std::time::Duration;
//! use rowlock::EntityLocker;
//!
//! let locker = EntityLocker::<u64>::new();
//!
//! locker.lock(&42)?;
//! locker.lock(&42)?; // reentrant
//! locker.unlock(&42)?;
//! locker.unlock(&42)?;
//!
//! if let Some(_guard) = locker.try_guard(&7, Duration::from_millis(10))? {
//!     // exclusive access to entity 7 until `_guard` drops
//! }
//!
//! let total = locker.with_lock(&9, || 1 + 1)?;
//! assert_eq!(total, 2);
//! # Ok::<(), rowlock::LockError<u64>>(())
//! ```
//!
//! # Operations
//!
//! | Operation | Fails with |
//! |---|---|
//! | [`EntityLocker::lock`] | `InvalidKey`, `DeadlockThreat` |
//! | [`EntityLocker::try_lock`] | `InvalidKey`, `DeadlockThreat` |
//! | [`EntityLocker::try_lock_cancellable`] | `InvalidKey`, `DeadlockThreat`, `Cancelled` |
//! | [`EntityLocker::unlock`] | `InvalidKey`, `MissingLock`, `NotOwner` |
//! | [`EntityLocker::is_locked_by_another_thread`] | `InvalidKey` |
//!
//! # Configuration
//!
//! By default a key's mutex lives as long as the locker. Set
//! [`Retention::EvictIdle`] (or `ROWLOCK_RETENTION=evict-idle` with
//! [`EntityLocker::from_env`]) to drop mutexes nobody holds or waits for.

mod cancel;
mod config;
mod guard;
mod locker;
mod mutex;

pub use cancel::CancelToken;
pub use config::{ConfigError, LockerConfig, RETENTION_ENV, Retention};
pub use guard::EntityGuard;
pub use locker::EntityLocker;

pub use rowlock_detect::DeadlockDetector;
pub use rowlock_types::{
    DeadlockThreat, EntityKey, EntitySnapshot, LockError, LockErrorKind, LockerSnapshot,
    ThreadHandle, ThreadSnapshot, WaitEdge, WaitSnapshot,
};
