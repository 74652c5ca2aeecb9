use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Identifier of a lockable entity.
///
/// The locker never inspects a key beyond equality and hashing. `is_blank` is the
/// one validity hook: blank keys (e.g. empty strings) are rejected with
/// [`LockError::InvalidKey`](crate::LockError::InvalidKey).
pub trait EntityKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {
    fn is_blank(&self) -> bool {
        false
    }
}

macro_rules! opaque_keys {
    ($($ty:ty),* $(,)?) => {
        $(impl EntityKey for $ty {})*
    };
}

opaque_keys!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char, bool,
);

impl EntityKey for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl EntityKey for &'static str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl EntityKey for Box<str> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl EntityKey for Arc<str> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl EntityKey for Vec<u8> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<A: EntityKey, B: EntityKey> EntityKey for (A, B) {
    fn is_blank(&self) -> bool {
        self.0.is_blank() || self.1.is_blank()
    }
}
