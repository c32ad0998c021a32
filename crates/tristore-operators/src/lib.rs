#![forbid(unsafe_code)]
//! tristore-operators: the out-of-core sorter and the merge-join core.
//!
//! - `sort`: [`BackgroundExternalSorter`], which sorts runs and merges them
//!   on worker threads while the caller keeps pushing or pulling.
//! - `join`: column bookkeeping for the "join columns first" layout and the
//!   zipper, galloping and block-wise joins that work on it.
//!
//! Every buffer that can grow with the input reserves its bytes from a
//! `MemoryBudgetImpl` first.

pub mod error;
pub mod join;
pub mod sort;

pub use error::{OpError, Result};
pub use join::{
    block_join, galloping_join, zipper_join, CombinedRowAdder, JoinBlock, JoinColumnMapping,
    UndefPolicy,
};
pub use sort::{BackgroundExternalSorter, NaturalOrder, SortComparator, SortedStream, SorterOptions};
