//! MemoryBudget + RAII guard implementations.
//!
//! A guard holds bytes until it is dropped or resized. Guards may move
//! across threads together with the buffers they account for.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tristore_core::budget::{BudgetGuard, MemoryBudget};

struct Ledger {
    capacity: usize,
    used: AtomicUsize,
}

impl Ledger {
    fn reserve(&self, bytes: usize) -> bool {
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            match self
                .used
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Shared byte budget. Clones account against the same ledger.
#[derive(Clone)]
pub struct MemoryBudgetImpl {
    ledger: Arc<Ledger>,
}

impl MemoryBudgetImpl {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// Budget that never refuses; handy for tests and tools.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// A guard holding nothing, to be grown later with `try_resize`.
    pub fn empty_guard(&self, tag: &'static str) -> BudgetGuardImpl {
        BudgetGuardImpl {
            ledger: Arc::clone(&self.ledger),
            bytes: 0,
            tag,
        }
    }

    pub fn available_bytes(&self) -> usize {
        self.ledger
            .capacity
            .saturating_sub(self.ledger.used.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for MemoryBudgetImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBudgetImpl")
            .field("capacity", &self.ledger.capacity)
            .field("used", &self.ledger.used.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryBudget for MemoryBudgetImpl {
    type Guard = BudgetGuardImpl;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        if bytes > 0 && !self.ledger.reserve(bytes) {
            return None;
        }
        Some(BudgetGuardImpl {
            ledger: Arc::clone(&self.ledger),
            bytes,
            tag,
        })
    }

    fn capacity_bytes(&self) -> usize {
        self.ledger.capacity
    }

    fn used_bytes(&self) -> usize {
        self.ledger.used.load(Ordering::Relaxed)
    }
}

/// RAII guard; dropping it returns its bytes to the budget.
pub struct BudgetGuardImpl {
    ledger: Arc<Ledger>,
    bytes: usize,
    tag: &'static str,
}

impl BudgetGuardImpl {
    /// Grow or shrink the accounted size. Shrinking always succeeds; growing
    /// fails (leaving the guard unchanged) if the budget cannot cover it.
    pub fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes <= self.bytes {
            self.ledger.release(self.bytes - new_bytes);
            self.bytes = new_bytes;
            return true;
        }
        if self.ledger.reserve(new_bytes - self.bytes) {
            self.bytes = new_bytes;
            true
        } else {
            false
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.ledger.capacity
    }

    pub fn used_bytes(&self) -> usize {
        self.ledger.used.load(Ordering::Relaxed)
    }
}

impl BudgetGuard for BudgetGuardImpl {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Drop for BudgetGuardImpl {
    fn drop(&mut self) {
        if self.bytes > 0 {
            // NOTE: no logging on the drop path.
            self.ledger.release(self.bytes);
            self.bytes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_and_resize() {
        let budget = MemoryBudgetImpl::new(1000);
        let mut g = budget.try_acquire(400, "test").expect("fits");
        assert_eq!(budget.used_bytes(), 400);

        assert!(g.try_resize(900));
        assert_eq!(budget.used_bytes(), 900);
        assert!(!g.try_resize(1001));
        assert_eq!(g.bytes(), 900);

        assert!(g.try_resize(100));
        assert_eq!(budget.available_bytes(), 900);
        drop(g);
        assert_eq!(budget.used_bytes(), 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let budget = MemoryBudgetImpl::new(10);
        let _g = budget.try_acquire(8, "a").expect("fits");
        assert!(budget.try_acquire(3, "b").is_none());
        assert!(budget.try_acquire(0, "zero").is_some());
    }

    #[test]
    fn acquire_maps_to_fatal_error() {
        let budget = MemoryBudgetImpl::new(10);
        let err = budget.acquire(11, "sorter").err().expect("over budget");
        assert!(err.is_fatal_config());
        assert!(err.to_string().contains("sorter"));
    }

    #[test]
    fn concurrent_guards_never_overshoot() {
        let budget = MemoryBudgetImpl::new(64);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = budget.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(g) = b.try_acquire(16, "t") {
                            assert!(b.used_bytes() <= 64);
                            drop(g);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }
        assert_eq!(budget.used_bytes(), 0);
    }
}
