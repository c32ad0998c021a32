//! The six key orders of a triple and their twins.

use serde::{Deserialize, Serialize};

use crate::id::ValueId;

/// Column 0 is the subject, 1 the predicate, 2 the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permutation {
    Spo,
    Sop,
    Pso,
    Pos,
    Osp,
    Ops,
}

impl Permutation {
    pub const ALL: [Permutation; 6] = [
        Permutation::Spo,
        Permutation::Sop,
        Permutation::Pso,
        Permutation::Pos,
        Permutation::Osp,
        Permutation::Ops,
    ];

    /// Original column index at each sort position.
    pub const fn key_order(self) -> [usize; 3] {
        match self {
            Permutation::Spo => [0, 1, 2],
            Permutation::Sop => [0, 2, 1],
            Permutation::Pso => [1, 0, 2],
            Permutation::Pos => [1, 2, 0],
            Permutation::Osp => [2, 0, 1],
            Permutation::Ops => [2, 1, 0],
        }
    }

    /// Same relation key, trailing columns swapped.
    pub const fn twin(self) -> Permutation {
        match self {
            Permutation::Spo => Permutation::Sop,
            Permutation::Sop => Permutation::Spo,
            Permutation::Pso => Permutation::Pos,
            Permutation::Pos => Permutation::Pso,
            Permutation::Osp => Permutation::Ops,
            Permutation::Ops => Permutation::Osp,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Permutation::Spo => "spo",
            Permutation::Sop => "sop",
            Permutation::Pso => "pso",
            Permutation::Pos => "pos",
            Permutation::Osp => "osp",
            Permutation::Ops => "ops",
        }
    }

    /// Reorder a triple given in `(s, p, o)` into this permutation's order.
    pub fn apply(self, triple: [ValueId; 3]) -> [ValueId; 3] {
        let k = self.key_order();
        [triple[k[0]], triple[k[1]], triple[k[2]]]
    }

    /// Inverse of [`Permutation::apply`].
    pub fn restore(self, permuted: [ValueId; 3]) -> [ValueId; 3] {
        let k = self.key_order();
        let mut out = [ValueId::UNDEFINED; 3];
        for (pos, &col) in k.iter().enumerate() {
            out[col] = permuted[pos];
        }
        out
    }
}

impl std::fmt::Display for Permutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twins_share_the_key_and_swap_the_tail() {
        for p in Permutation::ALL {
            let t = p.twin();
            assert_eq!(t.twin(), p);
            let (a, b) = (p.key_order(), t.key_order());
            assert_eq!(a[0], b[0]);
            assert_eq!([a[1], a[2]], [b[2], b[1]]);
        }
    }

    #[test]
    fn apply_and_restore() {
        let spo = [ValueId::new(1), ValueId::new(2), ValueId::new(3)];
        let pos = Permutation::Pos.apply(spo);
        assert_eq!(pos, [ValueId::new(2), ValueId::new(3), ValueId::new(1)]);
        for p in Permutation::ALL {
            assert_eq!(p.restore(p.apply(spo)), spo);
        }
    }
}
