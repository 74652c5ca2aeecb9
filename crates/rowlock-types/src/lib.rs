//! Shared contract types for rowlock.
//!
//! Everything here is plain data: the [`ThreadHandle`] used as execution-context
//! identity in the wait-for graph, the [`EntityKey`] bound on lock keys, the
//! [`LockError`] taxonomy every locking operation reports through, and the
//! facet-derived snapshot types used for diagnostics.

mod error;
mod key;
mod snapshots;
mod thread;

pub use error::{DeadlockThreat, LockError, LockErrorKind, WaitEdge};
pub use key::EntityKey;
pub use snapshots::{EntitySnapshot, LockerSnapshot, ThreadSnapshot, WaitSnapshot};
pub use thread::ThreadHandle;
