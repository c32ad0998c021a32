#![forbid(unsafe_code)]
//! tristore-mem: hard memory budgeting, reservations and spill pages.
//!
//! Concrete implementations of the budget traits in `tristore-core::budget`.
//! Sorter run buffers, block accumulators and join results all reserve their
//! bytes here, so exceeding the configured cap surfaces as one well-defined
//! `BudgetExceeded` error instead of an OOM.
//!
//! A generic `Storage` trait is exposed (in `spill::`) and implemented by
//! `tristore-io`.

pub mod error;
pub mod guard;
pub mod reservation;
pub mod spill;
pub mod tracking;

pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use reservation::Reservation;
pub use spill::{Codec, SpillManager, Storage};
