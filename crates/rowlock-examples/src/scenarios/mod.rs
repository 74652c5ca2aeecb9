pub mod cancellation;
pub mod contention;
pub mod deadlock;
pub mod reentrancy;
pub mod snapshot;
pub mod timeout;

use std::thread::{self, Scope, ScopedJoinHandle};

/// Spawns a named scoped thread; the name shows up in lock error messages.
pub(crate) fn spawn_named<'scope, 'env, T, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: impl Into<String>,
    f: F,
) -> Result<ScopedJoinHandle<'scope, T>, String>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    let name = name.into();
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(scope, f)
        .map_err(|e| format!("failed to spawn {name}: {e}"))
}

pub(crate) fn join<T>(handle: ScopedJoinHandle<'_, T>) -> Result<T, String> {
    handle
        .join()
        .map_err(|_| "scenario thread panicked".to_owned())
}
