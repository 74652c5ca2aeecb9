use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use rowlock_types::ThreadHandle;

use crate::CancelToken;

/// Outcome of a bounded acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    Acquired,
    TimedOut,
    Cancelled,
}

struct HoldState {
    owner: Option<ThreadHandle>,
    holds: usize,
}

impl HoldState {
    fn take(&mut self, thread: &ThreadHandle) {
        self.owner = Some(thread.clone());
        self.holds = 1;
    }

    fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

/// Reentrant, ownable mutual-exclusion unit for one entity key.
///
/// `holds > 0` iff `owner` is set, and only the owner changes `holds`.
pub(crate) struct EntityMutex {
    state: Mutex<HoldState>,
    released: Condvar,
    /// Holds plus in-flight attempts. Only maintained when idle eviction is on.
    users: AtomicUsize,
}

impl EntityMutex {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(HoldState {
                owner: None,
                holds: 0,
            }),
            released: Condvar::new(),
            users: AtomicUsize::new(0),
        }
    }

    pub(crate) fn owner(&self) -> Option<ThreadHandle> {
        self.state.lock().owner.clone()
    }

    /// Owner and hold count, read together.
    pub(crate) fn hold_state(&self) -> (Option<ThreadHandle>, usize) {
        let state = self.state.lock();
        (state.owner.clone(), state.holds)
    }

    /// Hold count of `thread`: zero unless it is the owner.
    pub(crate) fn holds_of(&self, thread: &ThreadHandle) -> usize {
        let state = self.state.lock();
        if state.owner.as_ref() == Some(thread) {
            state.holds
        } else {
            0
        }
    }

    /// Reentrant fast path. If `thread` already owns the mutex, bumps the hold
    /// count and returns the new count.
    pub(crate) fn reenter(&self, thread: &ThreadHandle) -> Option<usize> {
        let mut state = self.state.lock();
        if state.owner.as_ref() != Some(thread) {
            return None;
        }
        state.holds += 1;
        Some(state.holds)
    }

    /// Blocks until `thread` owns the mutex.
    pub(crate) fn lock(&self, thread: &ThreadHandle) {
        let mut state = self.state.lock();
        if state.owner.as_ref() == Some(thread) {
            state.holds += 1;
            return;
        }
        while !state.is_free() {
            self.released.wait(&mut state);
        }
        state.take(thread);
    }

    /// Waits for ownership until `deadline` (forever if `None`), or until `cancel`
    /// fires.
    ///
    /// Cancellation is checked before ownership on every wakeup, so a cancelled
    /// token wins over a lock that just became free.
    pub(crate) fn lock_until(
        self: &Arc<Self>,
        thread: &ThreadHandle,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Acquire {
        let parked = cancel.map(|token| token.park(self));
        let outcome = self.wait_for_ownership(thread, deadline, cancel);
        drop(parked);
        outcome
    }

    fn wait_for_ownership(
        &self,
        thread: &ThreadHandle,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Acquire {
        let mut state = self.state.lock();
        if state.owner.as_ref() == Some(thread) {
            state.holds += 1;
            return Acquire::Acquired;
        }
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                if state.is_free() {
                    // We may have swallowed the release notification.
                    self.released.notify_one();
                }
                return Acquire::Cancelled;
            }
            if state.is_free() {
                state.take(thread);
                return Acquire::Acquired;
            }
            match deadline {
                Some(deadline) => {
                    let timed_out = self.released.wait_until(&mut state, deadline).timed_out();
                    if timed_out && !state.is_free() {
                        return Acquire::TimedOut;
                    }
                }
                None => self.released.wait(&mut state),
            }
        }
    }

    /// Drops one hold of `thread`. When the count reaches zero, `on_free` runs while
    /// the mutex still looks owned to everyone else, then the mutex is released.
    ///
    /// Returns the remaining hold count, or the actual owner if `thread` is not it.
    pub(crate) fn release(
        &self,
        thread: &ThreadHandle,
        on_free: impl FnOnce(),
    ) -> Result<usize, Option<ThreadHandle>> {
        let mut state = self.state.lock();
        if state.owner.as_ref() != Some(thread) {
            return Err(state.owner.clone());
        }
        state.holds -= 1;
        if state.holds > 0 {
            return Ok(state.holds);
        }
        on_free();
        state.owner = None;
        drop(state);
        self.released.notify_one();
        Ok(0)
    }

    /// Wakes every waiter so it re-checks its cancellation token.
    pub(crate) fn wake_all(&self) {
        let _state = self.state.lock();
        self.released.notify_all();
    }

    pub(crate) fn add_user(&self) {
        self.users.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `true` if this was the last user.
    pub(crate) fn remove_user(&self) -> bool {
        self.users.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn is_unused(&self) -> bool {
        self.users.load(Ordering::Acquire) == 0
    }
}
