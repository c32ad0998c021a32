//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `tristore-mem`. Only the traits live
//! here so the index and exec crates can name the API without pulling in the
//! spill machinery.

/// A guard returned by a memory budget when bytes are acquired.
///
/// Must be RAII (releases on Drop) and `Send`: sorter buffers move to the
/// background worker together with their guard.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Debug tag for error messages and tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle representing a memory-cap enforcer.
///
/// Every component that can grow without bound (block buffers, sorter runs,
/// join accumulators) calls `try_acquire` before allocating. `None` means the
/// configured budget is exhausted, which callers report as a fatal
/// `BudgetExceeded` error.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;

    /// Like `try_acquire`, but turns exhaustion into the fatal error.
    fn acquire(&self, bytes: usize, tag: &'static str) -> crate::Result<Self::Guard> {
        self.try_acquire(bytes, tag)
            .ok_or_else(|| crate::Error::BudgetExceeded {
                tag,
                requested: bytes,
                capacity: self.capacity_bytes(),
                used: self.used_bytes(),
            })
    }
}

// NOTE: no default impls that would silently allow allocations.
