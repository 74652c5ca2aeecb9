use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rowlock::EntityLocker;

use super::{join, spawn_named};
use crate::ScenarioConfig;

/// Builds some contention, prints the locker snapshot as JSON, then lets it drain.
pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let (locked_tx, locked_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let locker = &locker;
        let holder = spawn_named(scope, "snapshot.holder", move || {
            let held: Vec<u64> = (0..cfg.keys).collect();
            for key in &held {
                locker.lock(key).map_err(|e| e.to_string())?;
            }
            // One reentrant hold so the snapshot shows a count above one.
            locker.lock(&0).map_err(|e| e.to_string())?;
            let _ = locked_tx.send(());
            let _ = release_rx.recv();
            locker.unlock(&0).map_err(|e| e.to_string())?;
            for key in held.iter().rev() {
                locker.unlock(key).map_err(|e| e.to_string())?;
            }
            Ok::<_, String>(())
        })?;
        locked_rx
            .recv()
            .map_err(|_| "holder exited before locking".to_owned())?;

        let waiters = cfg.threads.saturating_sub(1).max(1);
        let mut handles = Vec::with_capacity(waiters);
        for waiter in 0..waiters {
            let key = waiter as u64 % cfg.keys;
            handles.push(spawn_named(scope, format!("snapshot.waiter.{waiter}"), move || {
                let acquired = locker
                    .try_lock(&key, Duration::from_secs(30))
                    .map_err(|e| e.to_string())?;
                if acquired {
                    locker.unlock(&key).map_err(|e| e.to_string())?;
                }
                Ok::<_, String>(acquired)
            })?);
        }

        wait_for_waiters(&locker, waiters)?;
        let snapshot = locker.snapshot();
        let json = facet_json::to_string(&snapshot).map_err(|e| e.to_string())?;
        println!("{json}");

        let _ = release_tx.send(());
        join(holder)??;
        for handle in handles {
            if !join(handle)?? {
                return Err("waiter timed out after the holder released".to_owned());
            }
        }
        println!("drained: {} entity mutexes registered", locker.len());
        Ok(())
    })
}

fn wait_for_waiters(locker: &EntityLocker<u64>, expected: usize) -> Result<(), String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while locker.snapshot().waits.len() < expected {
        if Instant::now() >= deadline {
            return Err(format!("waiters never parked (expected {expected})"));
        }
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}
