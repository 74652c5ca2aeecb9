use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{Thread, ThreadId};

use crate::ThreadSnapshot;

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::from_thread(&std::thread::current());
}

/// Opaque identity of an execution context (an OS thread).
///
/// Equality and hashing only look at the [`ThreadId`]; the name is carried along
/// for error messages and snapshots.
#[derive(Clone)]
pub struct ThreadHandle {
    id: ThreadId,
    name: Option<Arc<str>>,
}

impl ThreadHandle {
    /// Handle for the calling thread. Cached per thread, so this is an `Arc` clone.
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    pub fn from_thread(thread: &Thread) -> Self {
        Self {
            id: thread.id(),
            name: thread.name().map(Arc::from),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_current(&self) -> bool {
        CURRENT.with(|current| current.id == self.id)
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            id: format!("{:?}", self.id),
            name: self.name.as_deref().map(str::to_owned),
        }
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ThreadHandle {}

impl Hash for ThreadHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{:?}", self.id),
        }
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.id)
            .field("name", &self.name.as_deref())
            .finish()
    }
}
