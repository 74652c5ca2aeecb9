use facet::Facet;

/// A thread as it appears in a snapshot.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    /// `Debug` rendering of the thread id, e.g. `ThreadId(7)`.
    pub id: String,
    /// Thread name, if the thread was named.
    pub name: Option<String>,
}

/// One registered entity mutex.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct EntitySnapshot {
    /// `Debug` rendering of the entity key.
    pub key: String,
    /// Thread currently holding the entity, if any.
    pub owner: Option<ThreadSnapshot>,
    /// Reentrant hold count of the owner. Zero when unowned.
    pub holds: u64,
}

/// An in-flight acquisition attempt.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct WaitSnapshot {
    /// Thread that is waiting.
    pub thread: ThreadSnapshot,
    /// `Debug` rendering of the key it is waiting for.
    pub key: String,
}

/// Point-in-time view of a locker: entity mutexes and the pending waits of the
/// wait-for graph. The two halves are read one after the other, not atomically.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct LockerSnapshot {
    /// Registered entities, sorted by key.
    pub entities: Vec<EntitySnapshot>,
    /// Pending waits, sorted by key.
    pub waits: Vec<WaitSnapshot>,
}

impl LockerSnapshot {
    pub fn entity(&self, key: &str) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|entity| entity.key == key)
    }

    /// Entities that currently have an owner.
    pub fn held(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.iter().filter(|entity| entity.owner.is_some())
    }
}
