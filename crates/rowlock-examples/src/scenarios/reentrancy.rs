use std::thread;

use super::{join, spawn_named};
use crate::ScenarioConfig;

pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let depth = cfg.threads.max(2);

    for _ in 0..depth {
        locker.lock(&1).map_err(|e| e.to_string())?;
    }
    let holds = locker.hold_count(&1).map_err(|e| e.to_string())?;
    println!("main holds entity 1 {holds} times");

    let seen_locked = observe(&locker)?;
    println!("other thread sees entity 1 locked: {seen_locked}");

    for remaining in (0..depth).rev() {
        locker.unlock(&1).map_err(|e| e.to_string())?;
        let seen = observe(&locker)?;
        println!("unlocked once, {remaining} holds left, other thread sees locked: {seen}");
        if seen != (remaining > 0) {
            return Err(format!(
                "entity visibility out of step with {remaining} remaining holds"
            ));
        }
    }

    match locker.unlock(&1) {
        Err(err) => println!("extra unlock rejected: {err}"),
        Ok(()) => return Err("unbalanced unlock was accepted".to_owned()),
    }
    Ok(())
}

fn observe(locker: &rowlock::EntityLocker<u64>) -> Result<bool, String> {
    thread::scope(|scope| {
        let handle = spawn_named(scope, "reentrancy.observer", || {
            locker
                .is_locked_by_another_thread(&1)
                .map_err(|e| e.to_string())
        })?;
        join(handle)?
    })
}
