use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use super::{join, spawn_named};
use crate::ScenarioConfig;

const ROUNDS: u64 = 200;

/// Every thread bumps per-key counters with a deliberately racy
/// load/yield/store. The entity lock is the only thing keeping the totals right.
pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let counters: Vec<AtomicU64> = (0..cfg.keys).map(|_| AtomicU64::new(0)).collect();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(cfg.threads);
        for worker in 0..cfg.threads {
            let locker = &locker;
            let counters = &counters;
            handles.push(spawn_named(scope, format!("contention.worker.{worker}"), move || {
                for round in 0..ROUNDS {
                    let key = (round * 7 + worker as u64) % cfg.keys;
                    locker
                        .with_lock(&key, || {
                            let slot = &counters[key as usize];
                            let seen = slot.load(Ordering::Relaxed);
                            thread::yield_now();
                            slot.store(seen + 1, Ordering::Relaxed);
                        })
                        .map_err(|e| e.to_string())?;
                }
                Ok::<_, String>(())
            })?);
        }
        for handle in handles {
            join(handle)??;
        }
        Ok::<_, String>(())
    })?;

    let total: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
    let expected = ROUNDS * cfg.threads as u64;
    println!(
        "{} threads x {ROUNDS} rounds over {} keys: {total} increments (expected {expected}), {} entity mutexes registered",
        cfg.threads,
        cfg.keys,
        locker.len()
    );
    if total != expected {
        return Err(format!("lost updates: {total} != {expected}"));
    }
    Ok(())
}
