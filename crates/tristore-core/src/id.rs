//! Strongly-typed identifiers used across the engine.
//!
//! Downstream crates should *not* pass raw `u64`s around for values or ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(ValueId);
new_id!(SpillId);

impl ValueId {
    /// The undefined sentinel. All-zero bits, so it sorts before every
    /// defined value.
    pub const UNDEFINED: ValueId = ValueId(0);

    pub const fn is_undefined(self) -> bool {
        self.0 == 0
    }

    /// Merge two values of the same join column. At most one of them may be
    /// undefined, so OR-ing the bits picks the defined one.
    pub const fn merge_join_value(self, other: ValueId) -> ValueId {
        ValueId(self.0 | other.0)
    }
}

impl From<u64> for ValueId {
    fn from(v: u64) -> Self {
        ValueId(v)
    }
}

/// The leading column of a tuple in some permutation.
pub type RelationKey = ValueId;

impl SpillId {
    /// Process-unique spill id. The pid keeps concurrent processes sharing
    /// one spill directory from colliding.
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let local = NEXT.fetch_add(1, Ordering::Relaxed) & 0xFFFF_FFFF;
        SpillId((u64::from(std::process::id()) << 32) | local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_sorts_first() {
        let mut ids = vec![ValueId::new(7), ValueId::UNDEFINED, ValueId::new(1)];
        ids.sort();
        assert_eq!(ids[0], ValueId::UNDEFINED);
        assert!(ids[0].is_undefined());
        assert!(!ids[1].is_undefined());
    }

    #[test]
    fn merge_join_value_prefers_defined() {
        let a = ValueId::new(42);
        assert_eq!(a.merge_join_value(ValueId::UNDEFINED), a);
        assert_eq!(ValueId::UNDEFINED.merge_join_value(a), a);
        assert_eq!(a.merge_join_value(a), a);
    }

    #[test]
    fn spill_ids_are_unique() {
        let a = SpillId::next();
        let b = SpillId::next();
        assert_ne!(a, b);
        assert_eq!(a.get() >> 32, u64::from(std::process::id()));
    }
}
