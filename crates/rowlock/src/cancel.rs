use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::mutex::EntityMutex;

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    /// Entity mutexes that threads are currently parked on with this token.
    parked: Mutex<Vec<Arc<EntityMutex>>>,
}

/// Cancels bounded waits from another thread.
///
/// Pass a clone to [`EntityLocker::try_lock_cancellable`](crate::EntityLocker::try_lock_cancellable)
/// and call [`cancel`](Self::cancel) from anywhere: every wait using the token wakes
/// up and fails with [`LockError::Cancelled`](crate::LockError::Cancelled). Once
/// cancelled, a token stays cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // Waiters park before they check the flag, so anyone missing from this
        // list has not checked yet and will see it.
        let parked = self.inner.parked.lock().clone();
        for mutex in parked {
            mutex.wake_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn park(&self, mutex: &Arc<EntityMutex>) -> Parked<'_> {
        self.inner.parked.lock().push(Arc::clone(mutex));
        Parked {
            token: self,
            mutex: Arc::clone(mutex),
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Registration of one wait on a token. Unregisters on drop.
pub(crate) struct Parked<'a> {
    token: &'a CancelToken,
    mutex: Arc<EntityMutex>,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        let mut parked = self.token.inner.parked.lock();
        if let Some(index) = parked.iter().position(|m| Arc::ptr_eq(m, &self.mutex)) {
            parked.swap_remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn parked_registration_is_removed_on_drop() {
        let token = CancelToken::new();
        let mutex = Arc::new(EntityMutex::new());
        {
            let _first = token.park(&mutex);
            let _second = token.park(&mutex);
            assert_eq!(token.inner.parked.lock().len(), 2);
        }
        assert!(token.inner.parked.lock().is_empty());
    }
}
