//! Growable byte reservations against the hard budget.
//!
//! Components whose buffers grow row by row (join results, segmenter
//! accumulators) keep one `Reservation` and call [`Reservation::ensure`]
//! with their current footprint. Growth is geometric so the budget is not
//! touched on every row.

use tristore_core::budget::{BudgetGuard, MemoryBudget};

use crate::error::{Error, Result};
use crate::guard::{BudgetGuardImpl, MemoryBudgetImpl};

pub struct Reservation {
    guard: BudgetGuardImpl,
}

impl Reservation {
    /// Reserve `bytes` up front.
    pub fn new(budget: &MemoryBudgetImpl, bytes: usize, tag: &'static str) -> Result<Self> {
        let guard = budget
            .try_acquire(bytes, tag)
            .ok_or_else(|| Error::BudgetExceeded {
                tag,
                requested: bytes,
                capacity: budget.capacity_bytes(),
                used: budget.used_bytes(),
            })?;
        Ok(Self { guard })
    }

    pub fn empty(budget: &MemoryBudgetImpl, tag: &'static str) -> Self {
        Self {
            guard: budget.empty_guard(tag),
        }
    }

    pub fn bytes(&self) -> usize {
        self.guard.bytes()
    }

    pub fn tag(&self) -> &'static str {
        self.guard.tag()
    }

    /// Make sure at least `bytes` are reserved. Tries to double the current
    /// reservation first and falls back to the exact amount.
    pub fn ensure(&mut self, bytes: usize) -> Result<()> {
        let current = self.guard.bytes();
        if bytes <= current {
            return Ok(());
        }
        let doubled = current.saturating_mul(2).max(bytes);
        if self.guard.try_resize(doubled) || self.guard.try_resize(bytes) {
            return Ok(());
        }
        Err(Error::BudgetExceeded {
            tag: self.guard.tag(),
            requested: bytes - current,
            capacity: self.guard.capacity_bytes(),
            used: self.guard.used_bytes(),
        })
    }

    /// Give back everything above `bytes`.
    pub fn shrink_to(&mut self, bytes: usize) {
        if bytes < self.guard.bytes() {
            self.guard.try_resize(bytes);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("tag", &self.guard.tag())
            .field("bytes", &self.guard.bytes())
            .finish()
    }
}
