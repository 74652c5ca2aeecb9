use std::fmt;
use std::marker::PhantomData;

use rowlock_types::{EntityKey, LockError};
use tracing::warn;

use crate::EntityLocker;

/// Scoped hold of one entity. Unlocks on drop.
///
/// Not `Send`: the unlock has to happen on the thread that locked.
#[must_use = "dropping the guard immediately releases the entity"]
pub struct EntityGuard<'a, K: EntityKey> {
    locker: &'a EntityLocker<K>,
    key: K,
    armed: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, K: EntityKey> EntityGuard<'a, K> {
    pub(crate) fn new(locker: &'a EntityLocker<K>, key: K) -> Self {
        Self {
            locker,
            key,
            armed: true,
            _not_send: PhantomData,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Unlocks now and reports the outcome instead of logging it.
    pub fn release(mut self) -> Result<(), LockError<K>> {
        self.armed = false;
        self.locker.unlock(&self.key)
    }
}

impl<K: EntityKey> Drop for EntityGuard<'_, K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.locker.unlock(&self.key) {
            warn!(key = ?self.key, error = %err, "failed to release entity guard");
        }
    }
}

impl<K: EntityKey> fmt::Debug for EntityGuard<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
