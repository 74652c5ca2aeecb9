use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use super::{join, spawn_named};
use crate::ScenarioConfig;

/// A holder keeps entity 1 locked while the main thread tries it with a bound.
pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let (locked_tx, locked_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let locker = &locker;
        let holder = spawn_named(scope, "timeout.holder", move || {
            locker.lock(&1).map_err(|e| e.to_string())?;
            let _ = locked_tx.send(());
            let _ = release_rx.recv();
            locker.unlock(&1).map_err(|e| e.to_string())
        })?;

        locked_rx
            .recv()
            .map_err(|_| "holder exited before locking".to_owned())?;

        let started = Instant::now();
        let acquired = locker.try_lock(&1, cfg.timeout).map_err(|e| e.to_string())?;
        let waited = started.elapsed();
        println!("try_lock(1, {:?}) -> {acquired} after {waited:?}", cfg.timeout);

        let _ = release_tx.send(());
        join(holder)??;

        if acquired {
            return Err("try_lock succeeded while another thread held the entity".to_owned());
        }
        if waited < cfg.timeout {
            return Err(format!("try_lock gave up early, after {waited:?}"));
        }

        let acquired = locker.try_lock(&1, cfg.timeout).map_err(|e| e.to_string())?;
        println!("after release: try_lock(1) -> {acquired}");
        if acquired {
            locker.unlock(&1).map_err(|e| e.to_string())?;
            Ok(())
        } else {
            Err("entity still unavailable after the holder released it".to_owned())
        }
    })
}
