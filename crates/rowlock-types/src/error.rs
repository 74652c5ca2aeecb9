use std::error::Error;
use std::fmt;

use crate::ThreadHandle;

/// One hop of a wait-for cycle: `key` is currently owned by `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEdge<K> {
    pub key: K,
    pub owner: ThreadHandle,
}

/// Details of an acquisition refused because it would close a wait-for cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockThreat<K> {
    /// Thread whose acquisition was refused.
    pub requester: ThreadHandle,
    /// Entity the requester asked for.
    pub key: K,
    /// Current owner of `key`, if any.
    pub holder: Option<ThreadHandle>,
    /// The cycle in walk order, starting at `key`. The last hop is the one owned
    /// by `requester`, which is the edge that closes the cycle.
    pub cycle: Vec<WaitEdge<K>>,
}

impl<K> DeadlockThreat<K> {
    /// The entity owned by the requester that closes the cycle.
    pub fn closing_edge(&self) -> Option<&WaitEdge<K>> {
        self.cycle.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError<K> {
    /// The key failed [`EntityKey::is_blank`](crate::EntityKey::is_blank).
    InvalidKey { key: K },
    /// Waiting for the key would deadlock. Nothing was acquired or recorded.
    DeadlockThreat(DeadlockThreat<K>),
    /// `unlock` for a key that never had a mutex.
    MissingLock { key: K },
    /// `unlock` from a thread that does not own the key. `owner` is the actual
    /// owner at the time of the call, if there was one.
    NotOwner {
        key: K,
        owner: Option<ThreadHandle>,
    },
    /// A bounded wait was cancelled before the lock was acquired.
    Cancelled { key: K },
}

/// Fieldless mirror of [`LockError`], for matching and structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockErrorKind {
    InvalidKey,
    DeadlockThreat,
    MissingLock,
    NotOwner,
    Cancelled,
}

impl LockErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid_key",
            Self::DeadlockThreat => "deadlock_threat",
            Self::MissingLock => "missing_lock",
            Self::NotOwner => "not_owner",
            Self::Cancelled => "cancelled",
        }
    }
}

impl<K> LockError<K> {
    pub fn kind(&self) -> LockErrorKind {
        match self {
            Self::InvalidKey { .. } => LockErrorKind::InvalidKey,
            Self::DeadlockThreat(_) => LockErrorKind::DeadlockThreat,
            Self::MissingLock { .. } => LockErrorKind::MissingLock,
            Self::NotOwner { .. } => LockErrorKind::NotOwner,
            Self::Cancelled { .. } => LockErrorKind::Cancelled,
        }
    }

    /// The entity the failed operation was about.
    pub fn key(&self) -> &K {
        match self {
            Self::InvalidKey { key }
            | Self::MissingLock { key }
            | Self::NotOwner { key, .. }
            | Self::Cancelled { key } => key,
            Self::DeadlockThreat(threat) => &threat.key,
        }
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::DeadlockThreat(_))
    }

    /// Whether backing off and trying again can succeed. Ownership violations and
    /// invalid keys are caller bugs and never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeadlockThreat(_) | Self::Cancelled { .. })
    }
}

impl<K: fmt::Debug> fmt::Display for DeadlockThreat<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread [{}] cannot lock entity {:?} because this would cause a deadlock",
            self.requester, self.key
        )?;
        match &self.holder {
            Some(holder) => write!(f, "; the entity is held by thread [{holder}]")?,
            None => f.write_str("; the entity is not currently held")?,
        }
        if !self.cycle.is_empty() {
            f.write_str("; cycle:")?;
            for edge in &self.cycle {
                write!(f, " {:?} held by [{}] ->", edge.key, edge.owner)?;
            }
            write!(f, " [{}] waits", self.requester)?;
        }
        Ok(())
    }
}

impl<K: fmt::Debug> fmt::Display for LockError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey { key } => write!(f, "entity key {key:?} is blank"),
            Self::DeadlockThreat(threat) => fmt::Display::fmt(threat, f),
            Self::MissingLock { key } => {
                write!(f, "there is no associated lock for entity with id {key:?}")
            }
            Self::NotOwner { key, owner: Some(owner) } => write!(
                f,
                "the lock of entity with id {key:?} is held by another thread [{owner}]"
            ),
            Self::NotOwner { key, owner: None } => write!(
                f,
                "the lock of entity with id {key:?} is not held by the current thread"
            ),
            Self::Cancelled { key } => {
                write!(f, "waiting for the lock of entity with id {key:?} was cancelled")
            }
        }
    }
}

impl<K: fmt::Debug> Error for LockError<K> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_handle(name: &str) -> ThreadHandle {
        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(ThreadHandle::current)
            .expect("spawn test thread")
            .join()
            .expect("test thread panicked")
    }

    #[test]
    fn missing_lock_message_names_the_key() {
        let err = LockError::MissingLock { key: 123u32 };
        assert_eq!(
            err.to_string(),
            "there is no associated lock for entity with id 123"
        );
        assert_eq!(err.kind(), LockErrorKind::MissingLock);
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_owner_message_names_the_owner() {
        let owner = named_handle("worker-1");
        let err = LockError::NotOwner {
            key: 123u32,
            owner: Some(owner),
        };
        assert_eq!(
            err.to_string(),
            "the lock of entity with id 123 is held by another thread [worker-1]"
        );
    }

    #[test]
    fn deadlock_message_reports_cycle() {
        let t1 = named_handle("t1");
        let t2 = named_handle("t2");
        let threat = DeadlockThreat {
            requester: t2.clone(),
            key: "a",
            holder: Some(t1.clone()),
            cycle: vec![
                WaitEdge {
                    key: "a",
                    owner: t1,
                },
                WaitEdge {
                    key: "b",
                    owner: t2.clone(),
                },
            ],
        };
        assert_eq!(threat.closing_edge().map(|e| e.key), Some("b"));

        let err = LockError::DeadlockThreat(threat);
        assert!(err.is_deadlock());
        assert!(err.is_retryable());
        assert_eq!(*err.key(), "a");
        assert_eq!(
            err.to_string(),
            "thread [t2] cannot lock entity \"a\" because this would cause a deadlock; \
             the entity is held by thread [t1]; \
             cycle: \"a\" held by [t1] -> \"b\" held by [t2] -> [t2] waits"
        );
    }

    #[test]
    fn deadlock_message_tolerates_unowned_key() {
        let t1 = named_handle("t1");
        let err = LockError::DeadlockThreat(DeadlockThreat {
            requester: t1,
            key: 7u8,
            holder: None,
            cycle: Vec::new(),
        });
        assert_eq!(
            err.to_string(),
            "thread [t1] cannot lock entity 7 because this would cause a deadlock; \
             the entity is not currently held"
        );
    }
}
