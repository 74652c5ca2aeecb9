//! Deadlock detection over a live wait-for graph.
//!
//! The detector knows nothing about mutexes. It keeps two maps:
//!
//! - **owners**: entity key → thread holding that entity
//! - **pending**: thread → entity key that thread is currently trying to acquire
//!
//! Together they form a directed graph with edges `thread → entity` (pending) and
//! `entity → thread` (owned). Each thread has at most one pending edge and each
//! entity at most one owner, so the graph is a forest of simple chains and a cycle
//! check is a walk along one chain, not a graph search.
//!
//! The locker calls [`DeadlockDetector::before_lock`] before a thread blocks on an
//! entity it does not hold, [`DeadlockDetector::after_lock`] once the attempt is
//! over, and [`DeadlockDetector::before_unlock`] when the last hold is released.

use std::collections::HashMap;

use parking_lot::Mutex;
use rowlock_types::{DeadlockThreat, EntityKey, LockError, ThreadHandle, WaitEdge};
use tracing::{trace, warn};

// ── Graph state ─────────────────────────────────────────────

struct WaitForGraph<K> {
    owners: HashMap<K, ThreadHandle>,
    pending: HashMap<ThreadHandle, K>,
}

impl<K: EntityKey> WaitForGraph<K> {
    fn new() -> Self {
        Self {
            owners: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Follows owned → pending edges starting at `key`. Returns the hops walked if
    /// the chain leads back to `thread`.
    ///
    /// Every hop past the first consumes a distinct pending edge unless the chain
    /// loops, so the walk is capped at `pending.len() + 1` hops. A chain that loops
    /// without reaching `thread` is a cycle among other threads; it cannot be closed
    /// by this request and is left alone.
    fn find_cycle(&self, thread: &ThreadHandle, key: &K) -> Option<Vec<WaitEdge<K>>> {
        let mut hops = Vec::new();
        let mut cursor = key;
        for _ in 0..=self.pending.len() {
            let owner = self.owners.get(cursor)?;
            hops.push(WaitEdge {
                key: cursor.clone(),
                owner: owner.clone(),
            });
            if owner == thread {
                return Some(hops);
            }
            cursor = self.pending.get(owner)?;
        }
        None
    }
}

// ── Detector ────────────────────────────────────────────────

/// Wait-for graph bookkeeping for one locker.
///
/// All operations take one short-held internal lock. None of them ever blocks on
/// an entity, so contention is bounded by map bookkeeping.
pub struct DeadlockDetector<K> {
    graph: Mutex<WaitForGraph<K>>,
}

impl<K: EntityKey> DeadlockDetector<K> {
    pub fn new() -> Self {
        Self {
            graph: Mutex::new(WaitForGraph::new()),
        }
    }

    /// Checks that `thread` waiting for `key` cannot close a cycle, then records the
    /// pending wait.
    ///
    /// On rejection nothing is recorded. The pending record is only inserted if the
    /// thread has none, so a repeated call never overwrites an in-flight attempt.
    pub fn before_lock(&self, thread: &ThreadHandle, key: &K) -> Result<(), LockError<K>> {
        let mut graph = self.graph.lock();
        if let Some(cycle) = graph.find_cycle(thread, key) {
            let holder = graph.owners.get(key).cloned();
            warn!(
                requester = %thread,
                key = ?key,
                holder = holder.as_ref().map(tracing::field::display),
                hops = cycle.len(),
                "refusing acquisition that would deadlock"
            );
            return Err(LockError::DeadlockThreat(DeadlockThreat {
                requester: thread.clone(),
                key: key.clone(),
                holder,
                cycle,
            }));
        }
        graph
            .pending
            .entry(thread.clone())
            .or_insert_with(|| key.clone());
        trace!(thread = %thread, key = ?key, "pending wait recorded");
        Ok(())
    }

    /// Concludes an acquisition attempt by `thread`, successful or not.
    ///
    /// The pending record is always cleared. Ownership is recorded only when
    /// `acquired` and only if `key` has no recorded owner yet.
    pub fn after_lock(&self, thread: &ThreadHandle, key: &K, acquired: bool) {
        let mut graph = self.graph.lock();
        graph.pending.remove(thread);
        if acquired {
            graph
                .owners
                .entry(key.clone())
                .or_insert_with(|| thread.clone());
        }
    }

    /// Clears the ownership record for `key`. Called when the hold count has just
    /// reached zero, before the entity mutex is released.
    pub fn before_unlock(&self, key: &K) {
        self.graph.lock().owners.remove(key);
    }

    pub fn owner_of(&self, key: &K) -> Option<ThreadHandle> {
        self.graph.lock().owners.get(key).cloned()
    }

    pub fn pending_of(&self, thread: &ThreadHandle) -> Option<K> {
        self.graph.lock().pending.get(thread).cloned()
    }

    /// Copy of the ownership edges.
    pub fn owners(&self) -> Vec<(K, ThreadHandle)> {
        let graph = self.graph.lock();
        graph
            .owners
            .iter()
            .map(|(key, owner)| (key.clone(), owner.clone()))
            .collect()
    }

    /// Copy of the pending-wait edges.
    pub fn waits(&self) -> Vec<(ThreadHandle, K)> {
        let graph = self.graph.lock();
        graph
            .pending
            .iter()
            .map(|(thread, key)| (thread.clone(), key.clone()))
            .collect()
    }
}

impl<K: EntityKey> Default for DeadlockDetector<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> ThreadHandle {
        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(ThreadHandle::current)
            .expect("spawn test thread")
            .join()
            .expect("test thread panicked")
    }

    fn hold(detector: &DeadlockDetector<&'static str>, thread: &ThreadHandle, key: &'static str) {
        detector
            .before_lock(thread, &key)
            .expect("acquisition should be safe");
        detector.after_lock(thread, &key, true);
    }

    #[test]
    fn uncontended_lock_records_pending_then_owner() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");

        detector.before_lock(&t1, &"a").expect("no cycle");
        assert_eq!(detector.pending_of(&t1), Some("a"));
        assert_eq!(detector.owner_of(&"a"), None);

        detector.after_lock(&t1, &"a", true);
        assert_eq!(detector.pending_of(&t1), None);
        assert_eq!(detector.owner_of(&"a"), Some(t1.clone()));

        detector.before_unlock(&"a");
        assert_eq!(detector.owner_of(&"a"), None);
    }

    #[test]
    fn failed_attempt_clears_pending_without_ownership() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");

        detector.before_lock(&t1, &"a").expect("no cycle");
        detector.after_lock(&t1, &"a", false);

        assert_eq!(detector.pending_of(&t1), None);
        assert_eq!(detector.owner_of(&"a"), None);
    }

    #[test]
    fn pending_record_is_not_overwritten() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");

        detector.before_lock(&t1, &"a").expect("no cycle");
        detector.before_lock(&t1, &"b").expect("no cycle");
        assert_eq!(detector.pending_of(&t1), Some("a"));
    }

    #[test]
    fn ownership_is_not_overwritten() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");

        hold(&detector, &t1, "a");
        detector.after_lock(&t2, &"a", true);
        assert_eq!(detector.owner_of(&"a"), Some(t1));
    }

    #[test]
    fn two_thread_cycle_is_rejected() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");

        hold(&detector, &t1, "a");
        hold(&detector, &t2, "b");
        detector.before_lock(&t1, &"b").expect("t1 may wait for b");

        let err = detector
            .before_lock(&t2, &"a")
            .expect_err("t2 waiting for a closes the cycle");
        let threat = match err {
            LockError::DeadlockThreat(threat) => threat,
            other => panic!("expected a deadlock threat, got {other:?}"),
        };
        assert_eq!(threat.requester, t2);
        assert_eq!(threat.key, "a");
        assert_eq!(threat.holder, Some(t1.clone()));
        assert_eq!(
            threat.cycle,
            vec![
                WaitEdge {
                    key: "a",
                    owner: t1.clone(),
                },
                WaitEdge {
                    key: "b",
                    owner: t2.clone(),
                },
            ]
        );

        // The rejected attempt left no trace; t1's wait is untouched.
        assert_eq!(detector.pending_of(&t2), None);
        assert_eq!(detector.pending_of(&t1), Some("b"));
    }

    #[test]
    fn three_thread_cycle_is_rejected() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");
        let t3 = handle("t3");

        hold(&detector, &t1, "a");
        hold(&detector, &t2, "b");
        hold(&detector, &t3, "c");
        detector.before_lock(&t1, &"b").expect("t1 → b → t2");
        detector.before_lock(&t2, &"c").expect("t2 → c → t3");

        let err = detector
            .before_lock(&t3, &"a")
            .expect_err("t3 waiting for a closes a three-way cycle");
        let threat = match err {
            LockError::DeadlockThreat(threat) => threat,
            other => panic!("expected a deadlock threat, got {other:?}"),
        };
        assert_eq!(threat.cycle.len(), 3);
        assert_eq!(
            threat.closing_edge(),
            Some(&WaitEdge {
                key: "c",
                owner: t3.clone(),
            })
        );
    }

    #[test]
    fn chain_without_cycle_is_allowed() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");
        let t3 = handle("t3");

        hold(&detector, &t1, "a");
        hold(&detector, &t2, "b");
        detector.before_lock(&t1, &"b").expect("t1 → b → t2");

        // t3 holds nothing, so waiting behind the chain is fine.
        detector.before_lock(&t3, &"a").expect("no cycle through t3");
        assert_eq!(detector.pending_of(&t3), Some("a"));
    }

    #[test]
    fn released_entity_breaks_the_chain() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");

        hold(&detector, &t1, "a");
        hold(&detector, &t2, "b");
        detector.before_lock(&t1, &"b").expect("t1 may wait for b");
        detector.before_unlock(&"a");

        detector
            .before_lock(&t2, &"a")
            .expect("a is no longer owned, so there is no cycle");
    }

    #[test]
    fn foreign_cycle_does_not_hang_the_walk() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");
        let t3 = handle("t3");

        {
            let mut graph = detector.graph.lock();
            graph.owners.insert("a", t1.clone());
            graph.owners.insert("b", t2.clone());
            graph.pending.insert(t1.clone(), "b");
            graph.pending.insert(t2.clone(), "a");
        }

        detector
            .before_lock(&t3, &"a")
            .expect("t3 is not part of the t1/t2 cycle");
    }

    #[test]
    fn snapshots_list_every_edge() {
        let detector = DeadlockDetector::new();
        let t1 = handle("t1");
        let t2 = handle("t2");

        hold(&detector, &t1, "a");
        detector.before_lock(&t2, &"a").expect("no cycle");

        assert_eq!(detector.owners(), vec![("a", t1)]);
        assert_eq!(detector.waits(), vec![(t2, "a")]);
    }
}
