use std::sync::Barrier;
use std::thread;

use rowlock::{EntityLocker, LockError};

use super::{join, spawn_named};
use crate::ScenarioConfig;

/// Two workers lock their first entity, meet at a barrier, then ask for each
/// other's. The second request would close the cycle and is refused; the refused
/// worker backs off and the other one finishes.
pub fn run(cfg: &ScenarioConfig) -> Result<(), String> {
    let locker = cfg.locker();
    let ready = Barrier::new(2);

    let refusals = thread::scope(|scope| {
        let alpha = spawn_named(scope, "deadlock.worker.alpha", || {
            lock_in_order(&locker, &ready, 1, 2)
        })?;
        let beta = spawn_named(scope, "deadlock.worker.beta", || {
            lock_in_order(&locker, &ready, 2, 1)
        })?;
        let refused = [join(alpha)??, join(beta)??];
        Ok::<_, String>(refused.iter().filter(|r| **r).count())
    })?;

    println!("{refusals} acquisition(s) refused as deadlock threats");
    if refusals != 1 {
        return Err(format!("expected exactly one refusal, saw {refusals}"));
    }
    Ok(())
}

/// Returns whether the second acquisition was refused.
fn lock_in_order(
    locker: &EntityLocker<u64>,
    ready: &Barrier,
    first: u64,
    second: u64,
) -> Result<bool, String> {
    let name = thread::current().name().unwrap_or("worker").to_owned();
    locker.lock(&first).map_err(|e| e.to_string())?;
    println!("{name} locked {first}; waiting for peer");
    ready.wait();

    println!("{name} attempting {second}");
    let refused = match locker.lock(&second) {
        Ok(()) => {
            println!("{name} acquired {second}");
            locker.unlock(&second).map_err(|e| e.to_string())?;
            false
        }
        Err(LockError::DeadlockThreat(threat)) => {
            println!("{name} refused: {threat}");
            true
        }
        Err(other) => return Err(other.to_string()),
    };
    locker.unlock(&first).map_err(|e| e.to_string())?;
    Ok(refused)
}
