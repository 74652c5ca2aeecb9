use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rowlock::{CancelToken, LockError};

use super::{join, spawn_named};
use crate::ScenarioConfig;

/// A waiter parks on a held entity with a long bound; the main thread cancels it
/// after `--timeout-ms`.
pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let token = CancelToken::new();
    let (locked_tx, locked_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let locker = &locker;
        let holder = spawn_named(scope, "cancellation.holder", move || {
            locker.lock(&1).map_err(|e| e.to_string())?;
            let _ = locked_tx.send(());
            let _ = release_rx.recv();
            locker.unlock(&1).map_err(|e| e.to_string())
        })?;
        locked_rx
            .recv()
            .map_err(|_| "holder exited before locking".to_owned())?;

        let waiter = spawn_named(scope, "cancellation.waiter", || {
            let started = Instant::now();
            let outcome = locker.try_lock_cancellable(&1, Duration::from_secs(60), &token);
            (outcome, started.elapsed())
        })?;

        thread::sleep(cfg.timeout);
        println!("cancelling waiter after {:?}", cfg.timeout);
        token.cancel();

        let (outcome, waited) = join(waiter)?;
        let _ = release_tx.send(());
        join(holder)??;

        match outcome {
            Err(LockError::Cancelled { key }) => {
                println!("waiter gave up on entity {key} after {waited:?}");
                Ok(())
            }
            Err(other) => Err(other.to_string()),
            Ok(acquired) => Err(format!(
                "waiter was not cancelled (try_lock_cancellable -> {acquired})"
            )),
        }
    })
}
